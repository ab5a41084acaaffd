//! Canonical serialization and content hashing.
//!
//! Every id in the system (transaction id, block id) and every signed
//! payload is built over the same substrate: UTF-8 JSON with object keys
//! sorted lexicographically at every depth and no insignificant
//! whitespace. `serde_json::Value`'s `Map` is backed by a `BTreeMap` by
//! default (the `preserve_order` feature is not enabled here), so simply
//! round-tripping a value through `Value` and re-serializing it compactly
//! already yields the canonical form.

use {multihash::MultihashDigest, serde::Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CanonicalizeError {
  #[error("value is not JSON-serializable: {0}")]
  Serde(#[from] serde_json::Error),
}

/// Serializes `value` to its canonical byte form.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalizeError> {
  let v = serde_json::to_value(value)?;
  Ok(serde_json::to_vec(&v)?)
}

/// SHA3-256 digest of `bytes`, hex-encoded. Used for every content id in
/// the system.
pub fn hash_hex(bytes: &[u8]) -> String {
  let digest = multihash::Code::Sha3_256.digest(bytes);
  hex::encode(digest.digest())
}

/// Convenience: canonicalize then hash in one step.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> Result<String, CanonicalizeError> {
  Ok(hash_hex(&canonical_bytes(value)?))
}
