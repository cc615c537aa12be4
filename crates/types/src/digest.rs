//! Canonical request digest.

use crate::RequestMsg;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Serialization failure while computing a digest.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("canonical serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Compute the canonical digest of a request.
///
/// The request is serialized to canonical JSON (sorted object keys, no
/// insignificant whitespace) and hashed with SHA-256.
/// The digest is rendered as lowercase hex. Every digest in the system goes
/// through this function, so independently computed digests for the same
/// request compare equal bit for bit.
pub fn digest(request: &RequestMsg) -> Result<String, DigestError> {
    // Going through serde_json::Value pins the key order: its object map is
    // sorted, independent of field declaration order.
    let canonical = serde_json::to_value(request)?;
    let bytes = serde_json::to_vec(&canonical)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestMsg {
        RequestMsg {
            timestamp: 100,
            client_id: "c1".into(),
            operation: "SET x=1".into(),
            sequence_id: 7,
        }
    }

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(digest(&request()).unwrap(), digest(&request()).unwrap());
    }

    #[test]
    fn test_digest_is_lowercase_hex_sha256() {
        let d = digest(&request()).unwrap();
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_digest_changes_with_any_field() {
        let base = digest(&request()).unwrap();

        let mut changed = request();
        changed.operation = "SET x=2".into();
        assert_ne!(digest(&changed).unwrap(), base);

        let mut changed = request();
        changed.sequence_id += 1;
        assert_ne!(digest(&changed).unwrap(), base);
    }

    #[test]
    fn test_digest_survives_the_wire() {
        // digest(decode(encode(r))) == digest(r)
        let wire = serde_json::to_string(&request()).unwrap();
        let decoded: RequestMsg = serde_json::from_str(&wire).unwrap();
        assert_eq!(digest(&decoded).unwrap(), digest(&request()).unwrap());
    }
}
