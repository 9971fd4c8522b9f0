use crate::{Error, Result};
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use std::io;
use tracing::{debug, warn};

/// Why a single index lookup produced no chunks.
#[derive(Debug)]
pub enum LookupError {
    /// The index has no reference sequence by that name.
    UnknownReference,
    /// The index rejected the query as structurally invalid.
    Invalid(io::Error),
    /// Anything else; surfaced to the caller.
    Io(io::Error),
}

impl From<io::Error> for LookupError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::InvalidInput => LookupError::Invalid(e),
            _ => LookupError::Io(e),
        }
    }
}

/// `chr1` -> `1`, `1` -> `chr1`.
pub fn toggle_chr_prefix(chrom: &str) -> String {
    match chrom.strip_prefix("chr") {
        Some(stripped) => stripped.to_string(),
        None => format!("chr{}", chrom),
    }
}

/// Resolve `chrom` to a chunk list with `lookup`, retrying once with the
/// `chr` prefix toggled.
///
/// Naming drift between a query and the index must not abort the query, so
/// an unknown chromosome or an index-side validation failure yields an empty
/// list. Only hard I/O failures are returned as errors.
pub fn resolve<F>(chrom: &str, mut lookup: F) -> Result<Vec<Chunk>>
where
    F: FnMut(&str) -> std::result::Result<Vec<Chunk>, LookupError>,
{
    let result = match lookup(chrom) {
        Err(LookupError::UnknownReference) => {
            let alternate = toggle_chr_prefix(chrom);
            debug!(chrom, alternate = %alternate, "retrying lookup with toggled chr prefix");
            lookup(&alternate)
        }
        other => other,
    };

    match result {
        Ok(chunks) => Ok(chunks),
        Err(LookupError::UnknownReference) => {
            warn!("chromosome {} not found in index", chrom);
            Ok(Vec::new())
        }
        Err(LookupError::Invalid(e)) => {
            debug!(chrom, error = %e, "index rejected query, returning no chunks");
            Ok(Vec::new())
        }
        Err(LookupError::Io(e)) => Err(Error::Io(e)),
    }
}
