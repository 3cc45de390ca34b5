// src/error.rs

use std::io;
use std::num::ParseFloatError;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while loading or transforming a profile.
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("input file {} does not exist", .0.display())]
    InputNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A data row appeared before an `@@` line declared TAXID, TAXPATH and PERCENTAGE.
    #[error("line {line}: the headers TAXID, TAXPATH, and PERCENTAGE are missing (should be declared on a line starting with @@)")]
    MissingColumns { line: usize },

    #[error("line {line}: no value for column {column}")]
    MissingField { line: usize, column: &'static str },

    #[error("line {line}: cannot parse abundance {value:?}")]
    InvalidAbundance {
        line: usize,
        value: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("line {line}: abundance {value:?} must be a finite, non-negative number")]
    AbundanceOutOfRange { line: usize, value: String },

    /// A taxon known only as an ancestor that ended up with no descendants.
    #[error("malformed profile: taxon {0} has neither abundance data nor descendants")]
    MalformedTaxon(String),

    #[error("ancestor cycle detected at taxon {0}")]
    AncestorCycle(String),

    #[error("distance between profiles is not supported")]
    DistanceUnsupported,
}

pub type Result<T> = std::result::Result<T, ProfileError>;
