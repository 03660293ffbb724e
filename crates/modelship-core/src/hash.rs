use sha2::{Digest, Sha256};

use crate::id::ObjectHash;
use crate::types::FileBundle;

/// SHA-256 digest of framed object bytes, as used by the sha256 object format.
pub fn content_hash(framed: &[u8]) -> ObjectHash {
    let digest = Sha256::digest(framed);
    ObjectHash::from_digest(&digest)
}

/// Stable fingerprint of who deploys what: BLAKE3 over
/// "modelship\0" || requester || 0 || (len(path) || path || len(content) || content)*.
///
/// Paths are visited in bundle order (sorted), so the fingerprint does not
/// depend on archive entry order.
pub fn fingerprint_bundle(requester: &str, bundle: &FileBundle) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"modelship\0");
    hasher.update(requester.as_bytes());
    hasher.update(&[0u8]);
    for (path, content) in bundle.iter() {
        hasher.update(&(path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update(&(content.len() as u64).to_le_bytes());
        hasher.update(content);
    }
    hasher.finalize().to_hex().to_string()
}
