// src/taxonomy_builder.rs

use ahash::AHashMap;

use crate::error::Result;
use crate::rank_repair::repair_missing_ranks;
use crate::types::{ProfileRow, TaxonNode, ROOT_ID};

/// Taxon-keyed tree: one node per taxon id plus the `ROOT_ID` sentinel.
///
/// `order` remembers when each id was first seen so that iteration, and
/// therefore the written output, is deterministic.
#[derive(Debug, Clone)]
pub struct TaxonTree {
    pub(crate) nodes: AHashMap<String, TaxonNode>,
    pub(crate) order: Vec<String>,
}

impl TaxonTree {
    /// A tree holding only the root sentinel.
    pub fn new() -> Self {
        let mut nodes = AHashMap::new();
        nodes.insert(ROOT_ID.to_string(), TaxonNode::root_sentinel());
        Self {
            nodes,
            order: vec![ROOT_ID.to_string()],
        }
    }

    pub fn get(&self, tax_id: &str) -> Option<&TaxonNode> {
        self.nodes.get(tax_id)
    }

    pub fn get_mut(&mut self, tax_id: &str) -> Option<&mut TaxonNode> {
        self.nodes.get_mut(tax_id)
    }

    pub fn contains(&self, tax_id: &str) -> bool {
        self.nodes.contains_key(tax_id)
    }

    /// Number of nodes, sentinel included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes in first-seen order, sentinel first.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaxonNode)> {
        self.order
            .iter()
            .filter_map(move |id| self.nodes.get(id).map(|node| (id.as_str(), node)))
    }

    pub(crate) fn ids(&self) -> &[String] {
        &self.order
    }

    /// Inserts a node that is not yet in the tree.
    pub(crate) fn insert_new(&mut self, tax_id: String, node: TaxonNode) {
        if !self.nodes.contains_key(&tax_id) {
            self.order.push(tax_id.clone());
        }
        self.nodes.insert(tax_id, node);
    }

    /// Longest `tax_path` in the tree.
    pub fn max_path_len(&self) -> usize {
        self.nodes
            .values()
            .map(|n| n.tax_path.len())
            .max()
            .unwrap_or(0)
    }
}

impl Default for TaxonTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the parent of `tax_id` from its path.
///
/// Starts at the element before the last one and walks toward the root
/// past blank or self-referencing entries. A repeated ancestor separated
/// only by blanks is collapsed into the same edge. Returns the ancestor
/// id (`ROOT_ID` when the path is exhausted) and the branch length.
pub fn resolve_ancestor(tax_id: &str, tax_path: &[String]) -> (String, u32) {
    if tax_path.len() <= 1 {
        return (ROOT_ID.to_string(), 1);
    }

    let mut idx = tax_path.len() - 2;
    let mut branch_length = 1;
    while tax_path[idx].is_empty() || tax_path[idx] == tax_id {
        if idx == 0 {
            return (ROOT_ID.to_string(), branch_length);
        }
        idx -= 1;
        branch_length += 1;
    }

    let ancestor = &tax_path[idx];
    let mut first = idx;
    for k in (0..idx).rev() {
        if tax_path[k].is_empty() {
            continue;
        }
        if tax_path[k] != *ancestor {
            break;
        }
        first = k;
    }
    branch_length += (idx - first) as u32;

    (ancestor.clone(), branch_length)
}

/// Phase one of tree construction: consumes parsed rows, then hands the
/// ancestors that never appeared as rows to the repair pass.
#[derive(Debug, Default)]
pub struct TaxonomyBuilder {
    tree: TaxonTree,
    /// Ids referenced only as an ancestor so far, with their children.
    pending: AHashMap<String, Vec<String>>,
}

impl TaxonomyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one data row.
    ///
    /// Duplicate ids sum their abundance while path, rank and display path
    /// take the latest row's values.
    pub fn push_row(&mut self, row: ProfileRow) {
        let (ancestor, branch_length) = resolve_ancestor(&row.tax_id, &row.tax_path);
        let tax_id = row.tax_id;

        let previous_ancestor = match self.tree.get_mut(&tax_id) {
            Some(node) => {
                node.abundance += row.abundance;
                node.tax_path = row.tax_path;
                if row.rank_declared {
                    node.rank = row.rank;
                }
                if row.tax_path_sn.is_some() {
                    node.tax_path_sn = row.tax_path_sn;
                }
                let previous = std::mem::replace(&mut node.ancestor, ancestor.clone());
                node.branch_length = branch_length;
                Some(previous)
            }
            None => {
                let placeholder = self.pending.remove(&tax_id);
                let already_listed = placeholder.is_some();
                let descendants = placeholder.unwrap_or_default();
                let node = TaxonNode {
                    rank: row.rank,
                    tax_path: row.tax_path,
                    tax_path_sn: row.tax_path_sn,
                    abundance: row.abundance,
                    ancestor: ancestor.clone(),
                    descendants,
                    branch_length,
                };
                if !already_listed {
                    self.tree.order.push(tax_id.clone());
                }
                self.tree.nodes.insert(tax_id.clone(), node);
                None
            }
        };

        if let Some(previous) = previous_ancestor {
            if previous != ancestor {
                self.detach(&tax_id, &previous);
            }
        }
        self.register(&tax_id, &ancestor);
    }

    /// Finishes the build: synthesizes every ancestor that never got a row.
    pub fn finish(self) -> Result<TaxonTree> {
        let TaxonomyBuilder { mut tree, pending } = self;
        repair_missing_ranks(&mut tree, pending)?;
        Ok(tree)
    }

    fn register(&mut self, tax_id: &str, ancestor: &str) {
        if let Some(parent) = self.tree.get_mut(ancestor) {
            parent.add_descendant(tax_id);
            return;
        }
        if !self.pending.contains_key(ancestor) {
            self.tree.order.push(ancestor.to_string());
        }
        let children = self.pending.entry(ancestor.to_string()).or_default();
        if !children.iter().any(|c| c == tax_id) {
            children.push(tax_id.to_string());
        }
    }

    fn detach(&mut self, tax_id: &str, ancestor: &str) {
        if let Some(parent) = self.tree.get_mut(ancestor) {
            parent.descendants.retain(|d| d != tax_id);
        } else if let Some(children) = self.pending.get_mut(ancestor) {
            children.retain(|d| d != tax_id);
        }
    }
}
