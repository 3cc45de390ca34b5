// src/profile_writer.rs

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::profile::Profile;
use crate::types::Rank;

/// Abundances at or below this are treated as zero and not written.
pub const EPSILON: f64 = 1e-16;

/// Writes `profile` as a profiling file.
///
/// Header lines come first, verbatim. Rows follow ordered by path length,
/// always as taxid, rank, path, display path, percentage; the optional
/// columns are written only when the profile declared them.
pub fn write_profile<W: Write>(profile: &Profile, mut out: W) -> Result<()> {
    for head in profile.headers() {
        writeln!(out, "{}", head)?;
    }

    let columns = profile.columns();
    let max_path_len = profile.tree().max_path_len();
    for path_length in 1..=max_path_len {
        for (tax_id, node) in profile.taxa() {
            if node.tax_path.len() != path_length || node.abundance <= EPSILON {
                continue;
            }
            write!(out, "{}\t", tax_id)?;
            if columns.has_rank() {
                let rank = node.rank.as_ref().map(Rank::as_str).unwrap_or("");
                write!(out, "{}\t", rank)?;
            }
            write!(out, "{}\t", node.tax_path.join("|"))?;
            if columns.has_tax_path_sn() {
                let names = node
                    .tax_path_sn
                    .as_ref()
                    .map(|sn| sn.join("|"))
                    .unwrap_or_default();
                write!(out, "{}\t", names)?;
            }
            writeln!(out, "{:.6}", node.abundance)?;
        }
    }
    out.flush()?;
    Ok(())
}

impl Profile {
    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        write_profile(self, out)
    }

    /// Writes to `path`, gzip-compressing when it ends in `.gz`.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        let is_gz = path
            .extension()
            .map(|ext| ext == "gz")
            .unwrap_or(false);

        if is_gz {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            write_profile(self, &mut encoder)?;
            encoder.finish()?.flush()?;
        } else {
            write_profile(self, BufWriter::new(file))?;
        }
        log::info!("Wrote {} taxa to {}", self.len(), path.display());
        Ok(())
    }

    /// Renders the profile as it would be written to disk.
    pub fn to_profile_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        write_profile(self, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
