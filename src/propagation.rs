// src/propagation.rs
//
// Depth-ordered sweeps converting between cumulative abundance (what profiles
// store) and exclusive abundance (mass attributed to a node alone).

use ahash::{AHashMap, AHashSet};

use crate::error::{ProfileError, Result};
use crate::taxonomy_builder::TaxonTree;
use crate::types::ROOT_ID;

impl TaxonTree {
    /// Depth of every node, computed by walking ancestor links to the
    /// sentinel (depth 0). Nodes whose ancestor is unknown count as roots.
    pub(crate) fn depths(&self) -> Result<AHashMap<String, usize>> {
        let mut depths: AHashMap<String, usize> = AHashMap::with_capacity(self.len());
        depths.insert(ROOT_ID.to_string(), 0);

        for id in self.ids() {
            if depths.contains_key(id) || !self.contains(id) {
                continue;
            }
            let mut chain: Vec<&str> = Vec::new();
            let mut seen: AHashSet<&str> = AHashSet::new();
            let mut current: &str = id;
            let base = loop {
                if let Some(&d) = depths.get(current) {
                    break d;
                }
                let node = match self.get(current) {
                    Some(node) => node,
                    None => break 0,
                };
                if !seen.insert(current) {
                    return Err(ProfileError::AncestorCycle(current.to_string()));
                }
                chain.push(current);
                current = &node.ancestor;
            };
            for (offset, tax_id) in chain.iter().rev().enumerate() {
                depths.insert(tax_id.to_string(), base + offset + 1);
            }
        }
        Ok(depths)
    }

    /// Node ids grouped by depth; index 0 holds only the sentinel.
    pub fn depth_levels(&self) -> Result<Vec<Vec<String>>> {
        let depths = self.depths()?;
        let max_depth = depths.values().copied().max().unwrap_or(0);
        let mut levels = vec![Vec::new(); max_depth + 1];
        for id in self.ids() {
            if let Some(&d) = depths.get(id) {
                levels[d].push(id.clone());
            }
        }
        Ok(levels)
    }

    /// Converts cumulative abundance into exclusive abundance, shallowest
    /// level first so each subtraction still sees cumulative children.
    ///
    /// A shortfall against the children's sum is rounding and clamps to
    /// zero. A node below its largest single child cannot be cumulative,
    /// so its value is taken as exclusive mass and left unchanged.
    pub fn subtract_down(&mut self) -> Result<()> {
        let levels = self.depth_levels()?;
        let deepest = levels.len().saturating_sub(1);
        for level in levels.iter().take(deepest).skip(1) {
            for id in level {
                let (children, largest) = match self.get(id) {
                    Some(node) => node
                        .descendants
                        .iter()
                        .filter_map(|d| self.get(d))
                        .fold((0.0_f64, 0.0_f64), |(sum, max), d| {
                            (sum + d.abundance, max.max(d.abundance))
                        }),
                    None => continue,
                };
                if let Some(node) = self.get_mut(id) {
                    if node.abundance < largest {
                        log::debug!(
                            "Taxon {} holds {} below its descendant's {}; treating it as exclusive",
                            id,
                            node.abundance,
                            largest
                        );
                        continue;
                    }
                    node.abundance = (node.abundance - children).max(0.0);
                }
            }
        }
        Ok(())
    }

    /// Restores cumulative abundance, deepest level first. Roots are not
    /// added into the sentinel.
    pub fn add_up(&mut self) -> Result<()> {
        let levels = self.depth_levels()?;
        for level in levels.iter().skip(2).rev() {
            for id in level {
                let (ancestor, abundance) = match self.get(id) {
                    Some(node) => (node.ancestor.clone(), node.abundance),
                    None => continue,
                };
                if let Some(parent) = self.get_mut(&ancestor) {
                    parent.abundance += abundance;
                }
            }
        }
        Ok(())
    }

    /// Rescales exclusive masses to percentages of their total, keeping
    /// each node's share, then rolls them back up.
    pub fn normalize(&mut self) -> Result<()> {
        self.subtract_down()?;
        let total: f64 = self.nodes.values().map(|n| n.abundance).sum();
        if total > 0.0 {
            for node in self.nodes.values_mut() {
                node.abundance /= total;
                node.abundance *= 100.0;
            }
        }
        self.add_up()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy_builder::TaxonomyBuilder;
    use crate::types::{ProfileRow, TaxonNode};

    const TOL: f64 = 1e-9;

    fn build(rows: &[(&str, &[&str], f64)]) -> TaxonTree {
        let mut builder = TaxonomyBuilder::new();
        for (tax_id, path, abundance) in rows {
            builder.push_row(ProfileRow {
                tax_id: tax_id.to_string(),
                rank: None,
                rank_declared: false,
                tax_path: path.iter().map(|s| s.to_string()).collect(),
                tax_path_sn: None,
                abundance: *abundance,
            });
        }
        builder.finish().unwrap()
    }

    fn abundance(tree: &TaxonTree, id: &str) -> f64 {
        tree.get(id).unwrap().abundance
    }

    fn consistent_tree() -> TaxonTree {
        build(&[
            ("2", &["2"], 80.0),
            ("1224", &["2", "1224"], 50.0),
            ("1239", &["2", "1239"], 30.0),
            ("1236", &["2", "1224", "1236"], 50.0),
            ("2157", &["2157"], 20.0),
        ])
    }

    #[test]
    fn test_depths_follow_ancestors_not_path_length() {
        let tree = build(&[
            ("A", &["A"], 10.0),
            ("B", &["A", "", "A", "B"], 10.0),
        ]);
        let depths = tree.depths().unwrap();
        assert_eq!(depths["-1"], 0);
        assert_eq!(depths["A"], 1);
        assert_eq!(depths["B"], 2);
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut tree = TaxonTree::new();
        for (id, ancestor) in [("A", "B"), ("B", "A")] {
            let mut node = TaxonNode::root_sentinel();
            node.tax_path = vec![ancestor.to_string(), id.to_string()];
            node.ancestor = ancestor.to_string();
            tree.insert_new(id.to_string(), node);
        }
        assert!(matches!(tree.depths(), Err(ProfileError::AncestorCycle(_))));
    }

    #[test]
    fn test_subtract_down_then_add_up_round_trips() {
        let mut tree = consistent_tree();
        tree.subtract_down().unwrap();
        assert!((abundance(&tree, "2") - 0.0).abs() < TOL);
        assert!((abundance(&tree, "1224") - 0.0).abs() < TOL);
        assert!((abundance(&tree, "1236") - 50.0).abs() < TOL);
        tree.add_up().unwrap();
        assert!((abundance(&tree, "2") - 80.0).abs() < TOL);
        assert!((abundance(&tree, "1224") - 50.0).abs() < TOL);
        assert!((abundance(&tree, "-1") - 0.0).abs() < TOL);
    }

    #[test]
    fn test_normalize_sums_roots_to_hundred() {
        let mut tree = consistent_tree();
        tree.normalize().unwrap();
        let roots: f64 = tree
            .iter()
            .filter(|(_, n)| n.is_root())
            .map(|(_, n)| n.abundance)
            .sum();
        assert!((roots - 100.0).abs() < 1e-9);
        assert!((abundance(&tree, "2157") - 20.0).abs() < TOL);
    }

    #[test]
    fn test_normalize_keeps_sum_consistency() {
        let mut tree = build(&[
            ("2", &["2"], 30.0),
            ("1224", &["2", "1224"], 20.0),
            ("1239", &["2", "1239"], 10.0),
            ("1236", &["2", "1224", "1236"], 12.0),
            ("28211", &["2", "1224", "28211"], 8.0),
        ]);
        tree.normalize().unwrap();
        for (id, node) in tree.iter() {
            if node.descendants.is_empty() || id == "-1" {
                continue;
            }
            let children: f64 = node
                .descendants
                .iter()
                .map(|d| abundance(&tree, d))
                .sum();
            assert!((node.abundance - children).abs() < 1e-9, "node {id}");
        }
        assert!((abundance(&tree, "2") - 100.0).abs() < 1e-9);
        assert!((abundance(&tree, "1236") - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_parent_below_children() {
        let mut tree = build(&[("2", &["2"], 40.0), ("1224", &["2", "1224"], 60.0)]);
        assert_eq!(tree.get("2").unwrap().ancestor, "-1");
        assert_eq!(tree.get("1224").unwrap().ancestor, "2");
        tree.normalize().unwrap();
        assert!((abundance(&tree, "2") - 100.0).abs() < 1e-9);
        assert!((abundance(&tree, "1224") - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_rounding_overshoot_clamps_to_zero() {
        let mut tree = build(&[
            ("2", &["2"], 50.0),
            ("10", &["2", "10"], 25.01),
            ("11", &["2", "11"], 25.01),
        ]);
        tree.subtract_down().unwrap();
        assert_eq!(abundance(&tree, "2"), 0.0);
        assert!((abundance(&tree, "10") - 25.01).abs() < TOL);
    }

    #[test]
    fn test_small_input_differences_give_close_output() {
        let normalized = |child: f64| {
            let mut tree = build(&[
                ("2", &["2"], 50.0),
                ("10", &["2", "10"], child),
                ("11", &["2", "11"], child),
            ]);
            tree.normalize().unwrap();
            (abundance(&tree, "2"), abundance(&tree, "10"))
        };
        let (over_root, over_child) = normalized(25.01);
        let (under_root, under_child) = normalized(24.99);
        assert!((over_root - 100.0).abs() < 1e-9);
        assert!((under_root - 100.0).abs() < 1e-9);
        assert!((over_child - 50.0).abs() < 1e-9);
        assert!((under_child - 49.98).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_all_zero_stays_zero() {
        let mut tree = build(&[("2", &["2"], 0.0), ("1224", &["2", "1224"], 0.0)]);
        tree.normalize().unwrap();
        assert_eq!(abundance(&tree, "2"), 0.0);
        assert_eq!(abundance(&tree, "1224"), 0.0);
    }
}
