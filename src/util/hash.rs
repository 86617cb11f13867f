use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a string
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// First 12 hex characters of the SHA-256 of a string.
///
/// Used for the combined head digest and for author email hashes.
pub fn short_digest(input: &str) -> String {
    let mut digest = sha256_hex(input);
    digest.truncate(12);
    digest
}
