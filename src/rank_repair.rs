// src/rank_repair.rs

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::error::{ProfileError, Result};
use crate::taxonomy_builder::{resolve_ancestor, TaxonTree};
use crate::types::{Rank, TaxonNode};

/// Ranks from the most specific upward. A synthesized ancestor is given
/// the rank one step above its descendant's.
pub const RANK_LADDER: [Rank; 8] = [
    Rank::Strain,
    Rank::Species,
    Rank::Genus,
    Rank::Family,
    Rank::Order,
    Rank::Class,
    Rank::Phylum,
    Rank::Superkingdom,
];

/// The rank above `rank` on the ladder, if any.
pub fn rank_above(rank: &Rank) -> Option<Rank> {
    let pos = RANK_LADDER.iter().position(|r| r == rank)?;
    RANK_LADDER.get(pos + 1).cloned()
}

/// Synthesizes a node for every id that was only ever seen as an ancestor.
///
/// Each missing node is cloned from its first descendant with the path
/// cut just before that descendant, so it assumes exactly one missing
/// level per step. A synthesized node whose own ancestor is also unknown
/// queues that ancestor, so every referenced id ends up with data.
/// Synthesized abundance is the sum of the node's descendants.
pub(crate) fn repair_missing_ranks(
    tree: &mut TaxonTree,
    mut pending: AHashMap<String, Vec<String>>,
) -> Result<()> {
    let mut queue: VecDeque<String> = tree
        .ids()
        .iter()
        .filter(|id| pending.contains_key(id.as_str()))
        .cloned()
        .collect();
    let mut synthesized = Vec::with_capacity(queue.len());

    while let Some(tax_id) = queue.pop_front() {
        let children = pending.remove(&tax_id).unwrap_or_default();
        let first = match children.first() {
            Some(first) => first,
            None => return Err(ProfileError::MalformedTaxon(tax_id)),
        };
        let template = tree
            .get(first)
            .ok_or_else(|| ProfileError::MalformedTaxon(first.clone()))?;

        let mut tax_path = template.tax_path.clone();
        let cut = tax_path
            .iter()
            .position(|p| p == first)
            .unwrap_or(tax_path.len().saturating_sub(1));
        tax_path.truncate(cut);
        let tax_path_sn = template.tax_path_sn.clone().map(|mut sn| {
            sn.truncate(cut);
            sn
        });
        let rank = template
            .rank
            .clone()
            .map(|r| rank_above(&r).unwrap_or(r));
        let (ancestor, _) = resolve_ancestor(&tax_id, &tax_path);

        log::debug!(
            "Synthesized missing taxon {} (rank {}) above {}",
            tax_id,
            rank.as_ref().map(Rank::as_str).unwrap_or("unknown"),
            first
        );

        tree.nodes.insert(
            tax_id.clone(),
            TaxonNode {
                rank,
                tax_path,
                tax_path_sn,
                abundance: 0.0,
                ancestor: ancestor.clone(),
                descendants: children,
                branch_length: 1,
            },
        );

        if let Some(parent) = tree.get_mut(&ancestor) {
            parent.add_descendant(&tax_id);
        } else {
            if !pending.contains_key(&ancestor) {
                queue.push_back(ancestor.clone());
                tree.order.push(ancestor.clone());
            }
            let waiting = pending.entry(ancestor).or_default();
            if !waiting.contains(&tax_id) {
                waiting.push(tax_id.clone());
            }
        }
        synthesized.push(tax_id);
    }

    if synthesized.is_empty() {
        return Ok(());
    }

    // Deepest first, so a synthesized child is summed before its parent.
    let depths = tree.depths()?;
    synthesized.sort_by_key(|id| std::cmp::Reverse(depths.get(id).copied().unwrap_or(0)));
    for tax_id in &synthesized {
        let total: f64 = tree
            .get(tax_id)
            .map(|node| {
                node.descendants
                    .iter()
                    .filter_map(|d| tree.get(d))
                    .map(|d| d.abundance)
                    .sum()
            })
            .unwrap_or(0.0);
        if let Some(node) = tree.get_mut(tax_id) {
            node.abundance = total;
        }
    }
    log::info!("Synthesized {} missing intermediate taxa", synthesized.len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy_builder::TaxonomyBuilder;
    use crate::types::ProfileRow;

    fn row(tax_id: &str, rank: Rank, path: &[&str], names: &[&str], abundance: f64) -> ProfileRow {
        ProfileRow {
            tax_id: tax_id.to_string(),
            rank: Some(rank),
            rank_declared: true,
            tax_path: path.iter().map(|s| s.to_string()).collect(),
            tax_path_sn: Some(names.iter().map(|s| s.to_string()).collect()),
            abundance,
        }
    }

    #[test]
    fn test_rank_above_follows_ladder() {
        assert_eq!(rank_above(&Rank::Strain), Some(Rank::Species));
        assert_eq!(rank_above(&Rank::Class), Some(Rank::Phylum));
        assert_eq!(rank_above(&Rank::Superkingdom), None);
        assert_eq!(rank_above(&Rank::Other("no rank".into())), None);
    }

    #[test]
    fn test_single_missing_rank_is_synthesized() {
        let mut builder = TaxonomyBuilder::new();
        builder.push_row(row("2", Rank::Superkingdom, &["2"], &["Bacteria"], 100.0));
        builder.push_row(row(
            "1236",
            Rank::Class,
            &["2", "1224", "1236"],
            &["Bacteria", "Proteobacteria", "Gammaproteobacteria"],
            70.0,
        ));
        builder.push_row(row(
            "28211",
            Rank::Class,
            &["2", "1224", "28211"],
            &["Bacteria", "Proteobacteria", "Alphaproteobacteria"],
            30.0,
        ));
        let tree = builder.finish().unwrap();

        let phylum = tree.get("1224").unwrap();
        assert_eq!(phylum.rank, Some(Rank::Phylum));
        assert_eq!(phylum.tax_path, vec!["2", "1224"]);
        assert_eq!(
            phylum.tax_path_sn,
            Some(vec!["Bacteria".to_string(), "Proteobacteria".to_string()])
        );
        assert_eq!(phylum.ancestor, "2");
        assert_eq!(phylum.branch_length, 1);
        assert_eq!(phylum.abundance, 100.0);
        assert_eq!(phylum.descendants, vec!["1236".to_string(), "28211".to_string()]);
        assert_eq!(tree.get("2").unwrap().descendants, vec!["1224".to_string()]);
    }

    #[test]
    fn test_chained_gap_reaches_every_path_element() {
        let mut builder = TaxonomyBuilder::new();
        builder.push_row(row(
            "562",
            Rank::Species,
            &["2", "1224", "1236", "91347", "543", "561", "562"],
            &["B", "P", "G", "E", "En", "Es", "Ec"],
            12.0,
        ));
        let tree = builder.finish().unwrap();

        for id in ["2", "1224", "1236", "91347", "543", "561", "562"] {
            let node = tree.get(id).unwrap_or_else(|| panic!("{id} missing"));
            assert_eq!(node.abundance, 12.0, "abundance of {id}");
        }
        assert_eq!(tree.get("561").unwrap().rank, Some(Rank::Genus));
        assert_eq!(tree.get("543").unwrap().rank, Some(Rank::Family));
        assert_eq!(tree.get("2").unwrap().ancestor, "-1");
        assert_eq!(tree.get("2").unwrap().tax_path, vec!["2"]);
        assert_eq!(tree.get("-1").unwrap().descendants, vec!["2".to_string()]);
    }

    #[test]
    fn test_unknown_rank_is_copied_unchanged() {
        let mut builder = TaxonomyBuilder::new();
        builder.push_row(row(
            "10",
            Rank::Other("no rank".into()),
            &["1", "10"],
            &["root", "x"],
            4.0,
        ));
        let tree = builder.finish().unwrap();
        assert_eq!(tree.get("1").unwrap().rank, Some(Rank::Other("no rank".into())));
    }
}
