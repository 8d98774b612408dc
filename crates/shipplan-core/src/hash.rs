//! Plan fingerprints.
//!
//! A fingerprint is the blake3 digest of a value's JSON encoding, streamed
//! straight into the hasher. Only fingerprint values whose encoding is
//! ordered: a `HashMap` field makes the digest vary between runs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl From<blake3::Hash> for Hash256 {
    fn from(h: blake3::Hash) -> Self {
        Self(*h.as_bytes())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    blake3::hash(bytes).into()
}

pub fn hash_serde<T: Serialize + ?Sized>(value: &T) -> Result<Hash256> {
    let mut hasher = blake3::Hasher::new();
    serde_json::to_writer(&mut hasher, value)?;
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streamed_digest_matches_encoded_bytes() {
        let value = vec![(1u32, "a"), (2, "b")];
        let bytes = serde_json::to_vec(&value).unwrap();
        assert_eq!(hash_serde(&value).unwrap(), hash_bytes(&bytes));
    }

    #[test]
    fn order_changes_the_fingerprint() {
        let a = hash_serde(&[1u32, 2, 3]).unwrap();
        let b = hash_serde(&[3u32, 2, 1]).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.to_hex().len(), 64);
        assert_eq!(a.to_string(), a.to_hex());
    }
}
