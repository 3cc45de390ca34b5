//src/types.rs

use std::fmt;
use std::str::FromStr;

/// Id of the synthetic root sentinel present in every profile.
pub const ROOT_ID: &str = "-1";

/// Taxonomic rank label of a profile row.
///
/// Ranks on the repair ladder get their own variant; anything else
/// (e.g. `no rank`, `subspecies`) is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rank {
    Superkingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    Strain,
    Other(String),
}

impl Rank {
    pub fn as_str(&self) -> &str {
        match self {
            Rank::Superkingdom => "superkingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
            Rank::Strain => "strain",
            Rank::Other(label) => label,
        }
    }
}

impl FromStr for Rank {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "superkingdom" => Rank::Superkingdom,
            "phylum" => Rank::Phylum,
            "class" => Rank::Class,
            "order" => Rank::Order,
            "family" => Rank::Family,
            "genus" => Rank::Genus,
            "species" => Rank::Species,
            "strain" => Rank::Strain,
            other => Rank::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed data line of a profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub tax_id: String,
    pub rank: Option<Rank>,
    /// Whether the input declared a RANK column. An empty value in a
    /// declared column clears the rank of a duplicate taxon.
    pub rank_declared: bool,
    pub tax_path: Vec<String>,
    pub tax_path_sn: Option<Vec<String>>,
    pub abundance: f64,
}

/// A node of the reconstructed taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonNode {
    pub rank: Option<Rank>,
    /// Ancestor ids from the root down to (and usually including) this taxon.
    pub tax_path: Vec<String>,
    /// Display names parallel to `tax_path`, when the input had that column.
    pub tax_path_sn: Option<Vec<String>>,
    /// Percentage of the community; cumulative over descendants on disk.
    pub abundance: f64,
    /// Resolved parent id, `ROOT_ID` for roots.
    pub ancestor: String,
    /// Ids whose resolved ancestor is this node, in insertion order, no duplicates.
    pub descendants: Vec<String>,
    /// Number of path elements spanned to reach `ancestor`.
    pub branch_length: u32,
}

impl TaxonNode {
    /// The sentinel every profile starts with.
    pub fn root_sentinel() -> Self {
        Self {
            rank: None,
            tax_path: Vec::new(),
            tax_path_sn: Some(Vec::new()),
            abundance: 0.0,
            ancestor: String::new(),
            descendants: Vec::new(),
            branch_length: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.ancestor == ROOT_ID
    }

    pub(crate) fn add_descendant(&mut self, tax_id: &str) {
        if !self.descendants.iter().any(|d| d == tax_id) {
            self.descendants.push(tax_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_round_trips_labels() {
        let species: Rank = "species".parse().unwrap();
        assert_eq!(species, Rank::Species);
        assert_eq!(species.to_string(), "species");

        let odd: Rank = "no rank".parse().unwrap();
        assert_eq!(odd, Rank::Other("no rank".to_string()));
        assert_eq!(odd.as_str(), "no rank");
    }

    #[test]
    fn test_add_descendant_ignores_duplicates() {
        let mut node = TaxonNode::root_sentinel();
        node.add_descendant("2");
        node.add_descendant("2157");
        node.add_descendant("2");
        assert_eq!(node.descendants, vec!["2".to_string(), "2157".to_string()]);
    }
}
