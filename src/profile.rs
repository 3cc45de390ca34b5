// src/profile.rs

use std::io::BufRead;
use std::path::Path;

use crate::error::{ProfileError, Result};
use crate::profile_parser::{open_profile, ColumnLayout, ProfileLine, ProfileParser};
use crate::taxonomy_builder::{TaxonTree, TaxonomyBuilder};
use crate::types::TaxonNode;

/// Header line prepended to a profile that received a merge.
pub const MERGE_NOTE: &str = "# This is a merged file, ignore files in headers below";

/// An in-memory taxonomic profile: the reconstructed tree, the passthrough
/// header lines and the column layout the input declared.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    tree: TaxonTree,
    headers: Vec<String>,
    columns: ColumnLayout,
}

impl Profile {
    /// An empty profile holding only the root sentinel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a profile file (optionally gzip-compressed).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_profile(path)?;
        let profile = Self::from_reader(reader)?;
        log::info!(
            "Loaded {} with {} taxa and {} header lines",
            path.display(),
            profile.len(),
            profile.headers.len()
        );
        Ok(profile)
    }

    /// Parses a profile from any line source, then repairs missing ranks.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut parser = ProfileParser::new();
        let mut builder = TaxonomyBuilder::new();
        let mut headers = Vec::new();

        for line in reader.lines() {
            let line = line?;
            match parser.parse_line(&line)? {
                Some(ProfileLine::Header(header)) => headers.push(header),
                Some(ProfileLine::Row(row)) => builder.push_row(row),
                None => {}
            }
        }

        Ok(Self {
            tree: builder.finish()?,
            headers,
            columns: parser.layout(),
        })
    }

    pub fn tree(&self) -> &TaxonTree {
        &self.tree
    }

    pub fn get(&self, tax_id: &str) -> Option<&TaxonNode> {
        self.tree.get(tax_id)
    }

    /// All nodes in first-seen order, sentinel first.
    pub fn taxa(&self) -> impl Iterator<Item = (&str, &TaxonNode)> {
        self.tree.iter()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn columns(&self) -> ColumnLayout {
        self.columns
    }

    /// Number of taxa, not counting the sentinel.
    pub fn len(&self) -> usize {
        self.tree.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of abundance over the root-adjacent taxa.
    pub fn total_root_abundance(&self) -> f64 {
        self.taxa()
            .filter(|(_, node)| node.is_root())
            .map(|(_, node)| node.abundance)
            .sum()
    }

    /// Rescales the profile so root-adjacent taxa sum to 100 while keeping
    /// every node's share of exclusive mass.
    pub fn normalize(&mut self) -> Result<()> {
        self.tree.normalize()
    }

    /// Zeroes every abundance below `cutoff`. Ancestors are not adjusted;
    /// call [`Profile::normalize`] afterwards for a consistent tree.
    pub fn threshold(&mut self, cutoff: f64) {
        let mut zeroed = 0usize;
        for node in self.tree.nodes.values_mut() {
            if node.abundance < cutoff {
                if node.abundance != 0.0 {
                    zeroed += 1;
                }
                node.abundance = 0.0;
            }
        }
        log::debug!("Threshold {} zeroed {} taxa", cutoff, zeroed);
    }

    /// Adds `other` into this profile.
    ///
    /// Shared taxa sum their abundance and keep this profile's structure;
    /// taxa only in `other` are copied over and hooked under their ancestor.
    /// No check is made that the two taxonomies agree.
    ///
    /// A receiver without a column header (e.g. [`Profile::new`]) adopts
    /// `other`'s header lines and columns so the result stays writable.
    pub fn merge(&mut self, other: &Profile) {
        if !self.headers.iter().any(|h| h.starts_with("@@")) {
            self.headers.extend(other.headers.iter().cloned());
        }
        if !self.columns.is_complete() {
            self.columns = other.columns;
        }
        self.headers.insert(0, MERGE_NOTE.to_string());

        let mut copied = Vec::new();
        for (tax_id, node) in other.taxa() {
            match self.tree.get_mut(tax_id) {
                Some(existing) => existing.abundance += node.abundance,
                None => {
                    self.tree.insert_new(tax_id.to_string(), node.clone());
                    copied.push(tax_id.to_string());
                }
            }
        }

        for tax_id in &copied {
            let (ancestor, descendants) = match self.tree.get(tax_id) {
                Some(node) => (node.ancestor.clone(), node.descendants.clone()),
                None => continue,
            };
            let kept: Vec<String> = descendants
                .into_iter()
                .filter(|d| {
                    self.tree
                        .get(d)
                        .map(|child| child.ancestor == *tax_id)
                        .unwrap_or(false)
                })
                .collect();
            if let Some(node) = self.tree.get_mut(tax_id) {
                node.descendants = kept;
            }
            if let Some(parent) = self.tree.get_mut(&ancestor) {
                parent.add_descendant(tax_id);
            }
        }

        log::info!(
            "Merged profile with {} taxa ({} new)",
            other.len(),
            copied.len()
        );
    }

    /// Branch-length weighted distance between two profiles.
    ///
    /// Not available: always returns [`ProfileError::DistanceUnsupported`].
    pub fn distance(&self, _other: &Profile, _epsilon: f64) -> Result<f64> {
        log::warn!("Profile distance was requested but is not supported");
        Err(ProfileError::DistanceUnsupported)
    }
}
