//! SHA-256 content hashing.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Read buffer used when hashing files.
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Computes the hex SHA-256 of a byte slice.
pub fn hash_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Computes the hex SHA-256 of a file, streaming it through a fixed buffer.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
