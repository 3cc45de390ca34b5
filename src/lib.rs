// src/lib.rs
pub mod error;
pub mod types;
pub mod profile_parser;
pub mod taxonomy_builder;
pub mod rank_repair;
pub mod propagation;
pub mod profile;
pub mod profile_writer;

use std::path::PathBuf;

use rayon::prelude::*;

pub use crate::error::{ProfileError, Result};
pub use crate::profile::Profile;
pub use crate::types::{Rank, TaxonNode, ROOT_ID};

/// Loads several independent profiles in parallel, keeping input order.
pub fn load_profiles(paths: &[PathBuf]) -> Result<Vec<Profile>> {
    paths.par_iter().map(Profile::from_path).collect()
}

/// Merges every input into a fresh profile, optionally normalizing the result.
pub fn merge_profile_files(paths: &[PathBuf], normalize: bool) -> Result<Profile> {
    let profiles = load_profiles(paths)?;
    let mut merged = Profile::new();
    for profile in &profiles {
        merged.merge(profile);
    }
    if normalize {
        merged.normalize()?;
    }
    Ok(merged)
}
