use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 of a file's contents, hex encoded.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether two files hold exactly the same bytes.
///
/// Sizes are compared first so that most non-duplicates are settled
/// without reading either file.
pub fn files_identical(a: &Path, b: &Path) -> io::Result<bool> {
    let meta_a = fs::metadata(a)?;
    let meta_b = fs::metadata(b)?;
    if meta_a.len() != meta_b.len() {
        return Ok(false);
    }
    if fs::canonicalize(a)? == fs::canonicalize(b)? {
        return Ok(true);
    }
    Ok(file_digest(a)? == file_digest(b)?)
}
