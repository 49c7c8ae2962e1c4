//! Plan fingerprints.
//!
//! Two pipelines with the same stages and register layouts describe to the
//! same JSON and so share a `plan_hash` in their reports.

use blake3::Hasher;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        use std::fmt::Write as _;
        self.0.iter().fold(String::with_capacity(64), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut h = Hasher::new();
    h.update(bytes);
    Hash256(h.finalize().into())
}

/// Fingerprint of a stage description list. Fails only if a description
/// cannot be rendered as JSON.
pub fn hash_serde<T: Serialize>(plan: &T) -> Result<Hash256, crate::error::Error> {
    let bytes = serde_json::to_vec(plan)?;
    Ok(hash_bytes(&bytes))
}
