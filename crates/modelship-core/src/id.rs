use serde::{Deserialize, Serialize};
use std::fmt;

use crate::CoreError;

/// Length in hex chars of a SHA-1 object id (what the public git host hands out).
const SHA1_HEX_LEN: usize = 40;
/// Length in hex chars of a SHA-256 object id.
const SHA256_HEX_LEN: usize = 64;

/// Identity of a blob, tree or commit on the repository host.
///
/// Hosts name objects by the hex digest of their git framing. Both the
/// SHA-1 and SHA-256 object formats are accepted; the digest is kept in
/// lowercase so equal objects compare equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectHash(String);

impl ObjectHash {
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let trimmed = s.trim();
        if trimmed.len() != SHA1_HEX_LEN && trimmed.len() != SHA256_HEX_LEN {
            return Err(CoreError::InvalidObjectHash(format!(
                "expected {SHA1_HEX_LEN} or {SHA256_HEX_LEN} hex chars, got {}",
                trimmed.len()
            )));
        }
        if !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidObjectHash(format!(
                "not a hex digest: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn from_digest(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw digest bytes. The hex form is validated on construction.
    pub fn to_bytes(&self) -> Vec<u8> {
        hex::decode(&self.0).unwrap_or_default()
    }

    /// Abbreviated form used in log lines.
    pub fn short(&self) -> &str {
        &self.0[..7]
    }
}

impl TryFrom<String> for ObjectHash {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ObjectHash> for String {
    fn from(value: ObjectHash) -> Self {
        value.0
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_sha1_and_sha256_lengths() {
        let sha1 = "b6fc4c620b67d95f953a5c1c1230aaab5db5a1b0";
        assert_eq!(ObjectHash::from_hex(sha1).unwrap().as_str(), sha1);

        let sha256 = "a".repeat(64);
        assert!(ObjectHash::from_hex(&sha256).is_ok());
    }

    #[test]
    fn normalizes_case() {
        let upper = "B6FC4C620B67D95F953A5C1C1230AAAB5DB5A1B0";
        let id = ObjectHash::from_hex(upper).unwrap();
        assert_eq!(id.as_str(), upper.to_ascii_lowercase());
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ObjectHash::from_hex("").is_err());
        assert!(ObjectHash::from_hex("abc").is_err());
        assert!(ObjectHash::from_hex(&"z".repeat(40)).is_err());
    }

    #[test]
    fn serde_goes_through_validation() {
        let json = format!("\"{}\"", "c".repeat(40));
        let id: ObjectHash = serde_json::from_str(&json).unwrap();
        assert_eq!(id.short(), "ccccccc");

        let bad: Result<ObjectHash, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
