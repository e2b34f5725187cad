//! Streaming content digests.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Error;

/// Streams the file through SHA-256 and returns the lowercase hex digest.
///
/// Used at open time to anchor conflict detection and at sync time to
/// verify the source archive is unchanged.
///
/// # Errors
///
/// Returns an I/O error with context when the file cannot be read.
pub fn hash_file(path: &Path) -> Result<String, Error> {
    let file =
        File::open(path).map_err(|err| Error::io(format!("opening {}", path.display()), err))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|err| Error::io(format!("hashing {}", path.display()), err))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
