use sha2::{Digest, Sha256};

/// Prefix of the content hash given to sessions that arrived through the wire
/// format instead of from a transcript file.
pub const WIRE_HASH_PREFIX: &str = "wire:";

/// Compute SHA-256 hash of bytes, returning lowercase hex string.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Content hash recorded for an imported session. Never collides with a
/// transcript hash because those are bare hex.
pub fn wire_session_hash(session_id: &str) -> String {
    format!("{WIRE_HASH_PREFIX}{session_id}")
}
