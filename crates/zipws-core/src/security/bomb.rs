//! Zip bomb pre-scan over the central directory.
//!
//! Reads entry metadata only; no stream is decompressed. The observed
//! totals are returned on success so the extractor can seed its runtime
//! guards with the same numbers the scan approved.

use std::fs::File;
use std::path::Path;

use crate::error::Error;

/// Limits consulted by the pre-scan and the extractor's runtime guards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecurityLimits {
    /// Upper bound on total declared and written uncompressed bytes.
    pub max_extracted_size_bytes: u64,
    /// Upper bound on archive entry count.
    pub max_file_count: usize,
    /// Upper bound on any single entry's uncompressed/compressed ratio.
    pub max_compression_ratio: f64,
}

impl Default for SecurityLimits {
    fn default() -> Self {
        Self {
            max_extracted_size_bytes: 1024 * 1024 * 1024,
            max_file_count: 100_000,
            max_compression_ratio: 100.0,
        }
    }
}

/// Outcome of a central-directory pre-scan.
#[derive(Debug, Clone, PartialEq)]
pub struct BombScan {
    /// Whether every limit held.
    pub is_safe: bool,
    /// Human-readable reason when a limit tripped.
    pub reason: Option<String>,
    /// Sum of declared uncompressed sizes, directories excluded.
    pub total_uncompressed_bytes: u64,
    /// Number of entries in the central directory.
    pub entry_count: usize,
    /// Largest observed uncompressed/compressed ratio.
    pub max_compression_ratio: f64,
}

/// Pre-scans an archive's central directory against the given limits.
///
/// # Errors
///
/// Returns [`Error::ZipNotFound`] when the file cannot be opened and
/// [`Error::ZipInvalid`] when it cannot be parsed as a zip archive. An
/// exceeded limit is not an error here; it is reported through
/// [`BombScan::is_safe`] so callers can attach the typed code themselves.
pub fn scan_for_bomb(path: &Path, limits: &SecurityLimits) -> Result<BombScan, Error> {
    let file = File::open(path).map_err(|_| Error::ZipNotFound {
        path: path.to_path_buf(),
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|source| Error::ZipInvalid {
        path: path.to_path_buf(),
        source,
    })?;

    let entry_count = archive.len();
    let mut total_uncompressed_bytes: u64 = 0;
    let mut max_compression_ratio: f64 = 0.0;

    for index in 0..entry_count {
        let entry = archive
            .by_index_raw(index)
            .map_err(|source| Error::ZipInvalid {
                path: path.to_path_buf(),
                source,
            })?;
        if entry.is_dir() {
            continue;
        }

        total_uncompressed_bytes = total_uncompressed_bytes.saturating_add(entry.size());

        let compressed = entry.compressed_size();
        if compressed > 0 {
            // Ratios only make sense for entries with a compressed stream.
            #[allow(clippy::cast_precision_loss)]
            let ratio = entry.size() as f64 / compressed as f64;
            if ratio > max_compression_ratio {
                max_compression_ratio = ratio;
            }
        }
    }

    let mut scan = BombScan {
        is_safe: true,
        reason: None,
        total_uncompressed_bytes,
        entry_count,
        max_compression_ratio,
    };

    if total_uncompressed_bytes > limits.max_extracted_size_bytes {
        scan.is_safe = false;
        scan.reason = Some(format!(
            "total uncompressed size ({total_uncompressed_bytes} bytes) exceeds limit ({} bytes)",
            limits.max_extracted_size_bytes
        ));
    } else if entry_count > limits.max_file_count {
        scan.is_safe = false;
        scan.reason = Some(format!(
            "file count ({entry_count}) exceeds limit ({})",
            limits.max_file_count
        ));
    } else if max_compression_ratio > limits.max_compression_ratio {
        scan.is_safe = false;
        scan.reason = Some(format!(
            "compression ratio ({max_compression_ratio:.2}:1) exceeds limit ({:.2}:1)",
            limits.max_compression_ratio
        ));
    }

    Ok(scan)
}

impl BombScan {
    /// Converts an unsafe scan into the typed error, passing a safe scan
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ZipBombDetected`] carrying the scan's reason.
    pub fn into_result(self) -> Result<Self, Error> {
        if self.is_safe {
            Ok(self)
        } else {
            Err(Error::ZipBombDetected {
                reason: self
                    .reason
                    .unwrap_or_else(|| "archive exceeds extraction limits".to_string()),
            })
        }
    }
}
