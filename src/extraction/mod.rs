//! Bundle extraction
//!
//! Turns fetched bundle bytes into files under an [`ExtractionTarget`]. Entry paths
//! that would resolve outside the target directory (`../` components, absolute
//! paths, symlinked parents) fail with [`Error::ExtractionFailed`]; nothing is ever
//! written outside the target.

mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use zip::ZipExtractor;

use crate::error::{Error, Result};
use crate::types::{ArchiveFormat, ExtractionTarget};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::task::spawn_blocking;

/// Detect the archive format from its leading bytes
pub fn detect_archive_format(bytes: &[u8]) -> Option<ArchiveFormat> {
    // Local file header, or the end-of-central-directory record of an empty archive
    if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Unified archive extraction dispatcher
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Unpack `bytes` into the target, returning every file written
    ///
    /// Existing files are replaced when `target.overwrite` is set. A malformed
    /// archive fails with [`Error::ExtractionFailed`] and leaves files from earlier
    /// entries in place.
    ///
    /// # Example
    /// ```no_run
    /// use tms_provision::extraction::ArchiveExtractor;
    /// use tms_provision::types::ExtractionTarget;
    ///
    /// # fn example(bundle: &[u8]) -> tms_provision::Result<()> {
    /// let files = ArchiveExtractor::extract(bundle, &ExtractionTarget::new("locales"))?;
    /// println!("Extracted {} files", files.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn extract(bytes: &[u8], target: &ExtractionTarget) -> Result<BTreeSet<PathBuf>> {
        match detect_archive_format(bytes) {
            Some(ArchiveFormat::Zip) => ZipExtractor::extract(bytes, target),
            None => Err(Error::ExtractionFailed {
                path: target.directory.clone(),
                reason: "bundle is not a ZIP archive".to_string(),
            }),
        }
    }

    /// [`ArchiveExtractor::extract`] on the blocking thread pool
    pub async fn extract_async(
        bytes: Vec<u8>,
        target: ExtractionTarget,
    ) -> Result<BTreeSet<PathBuf>> {
        let directory = target.directory.clone();
        spawn_blocking(move || Self::extract(&bytes, &target))
            .await
            .map_err(|e| Error::ExtractionFailed {
                path: directory,
                reason: format!("extraction task panicked: {}", e),
            })?
    }
}
