mod canonical;
mod keys;

pub use {
  canonical::{canonical_bytes, canonical_hash_hex, hash_hex, CanonicalizeError},
  keys::{KeyError, Keypair, Pubkey, Signature},
};
