// src/profile_parser.rs

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{ProfileError, Result};
use crate::types::{ProfileRow, Rank};

/// Column positions discovered from the `@@` header line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    pub tax_id: Option<usize>,
    pub rank: Option<usize>,
    pub tax_path: Option<usize>,
    pub tax_path_sn: Option<usize>,
    pub abundance: Option<usize>,
}

impl ColumnLayout {
    /// Records the position of every recognised token of an `@@` line.
    /// Tokens are matched ignoring `@` and case; unknown tokens are skipped.
    pub fn update_from_header(&mut self, line: &str) {
        for (pos, token) in line.split_whitespace().enumerate() {
            let token = token.replace('@', "").to_ascii_uppercase();
            match token.as_str() {
                "TAXID" => self.tax_id = Some(pos),
                "RANK" => self.rank = Some(pos),
                "TAXPATH" => self.tax_path = Some(pos),
                "TAXPATHSN" | "TAXPATH_SN" => self.tax_path_sn = Some(pos),
                "PERCENTAGE" => self.abundance = Some(pos),
                _ => {}
            }
        }
    }

    /// True once the three mandatory columns are known.
    pub fn is_complete(&self) -> bool {
        self.tax_id.is_some() && self.tax_path.is_some() && self.abundance.is_some()
    }

    pub fn has_rank(&self) -> bool {
        self.rank.is_some()
    }

    pub fn has_tax_path_sn(&self) -> bool {
        self.tax_path_sn.is_some()
    }
}

/// A classified input line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileLine {
    /// Metadata line (`@`, `@@` or `#`), kept verbatim.
    Header(String),
    Row(ProfileRow),
}

/// Stateful line parser: the `@@` line configures how later rows are split.
#[derive(Debug, Default)]
pub struct ProfileParser {
    layout: ColumnLayout,
    line_no: usize,
}

impl ProfileParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout(&self) -> ColumnLayout {
        self.layout
    }

    /// Parses one raw line. Blank lines yield `None`.
    pub fn parse_line(&mut self, raw: &str) -> Result<Option<ProfileLine>> {
        self.line_no += 1;
        let line = raw.trim_end();
        if line.is_empty() {
            return Ok(None);
        }
        if line.starts_with("@@") {
            self.layout.update_from_header(line);
        }
        if line.starts_with('@') || line.starts_with('#') {
            return Ok(Some(ProfileLine::Header(line.to_string())));
        }
        self.parse_row(line).map(|row| Some(ProfileLine::Row(row)))
    }

    fn parse_row(&self, line: &str) -> Result<ProfileRow> {
        let line_no = self.line_no;
        let (tax_id_pos, tax_path_pos, abundance_pos) =
            match (self.layout.tax_id, self.layout.tax_path, self.layout.abundance) {
                (Some(t), Some(p), Some(a)) => (t, p, a),
                _ => return Err(ProfileError::MissingColumns { line: line_no }),
            };

        let fields: Vec<&str> = line.split('\t').collect();
        let field = |pos: usize, column: &'static str| {
            fields
                .get(pos)
                .map(|f| f.trim())
                .ok_or(ProfileError::MissingField { line: line_no, column })
        };

        let tax_id = field(tax_id_pos, "TAXID")?.to_string();
        let tax_path = split_path(field(tax_path_pos, "TAXPATH")?);

        let raw_abundance = field(abundance_pos, "PERCENTAGE")?;
        let abundance = raw_abundance
            .parse::<f64>()
            .map_err(|source| ProfileError::InvalidAbundance {
                line: line_no,
                value: raw_abundance.to_string(),
                source,
            })?;
        if !abundance.is_finite() || abundance < 0.0 {
            return Err(ProfileError::AbundanceOutOfRange {
                line: line_no,
                value: raw_abundance.to_string(),
            });
        }

        let rank = match self.layout.rank {
            Some(pos) => {
                let label = field(pos, "RANK")?;
                if label.is_empty() {
                    None
                } else {
                    label.parse::<Rank>().ok()
                }
            }
            None => None,
        };
        let tax_path_sn = match self.layout.tax_path_sn {
            Some(pos) => Some(split_path(field(pos, "TAXPATHSN")?)),
            None => None,
        };

        Ok(ProfileRow {
            tax_id,
            rank,
            rank_declared: self.layout.rank.is_some(),
            tax_path,
            tax_path_sn,
            abundance,
        })
    }
}

fn split_path(joined: &str) -> Vec<String> {
    joined.split('|').map(str::to_string).collect()
}

/// Opens a profile for line reading, decompressing `.gz` inputs on the fly.
pub fn open_profile<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ProfileError::InputNotFound(path.to_path_buf()));
    }
    let f = File::open(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let reader: Box<dyn BufRead> = if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}
