use {
  super::{BlockId, Transaction},
  crate::crypto::{canonical_hash_hex, CanonicalizeError, Pubkey, Signature},
  serde::{Deserialize, Serialize},
};

/// Everything about a block except its id and signature: this is what
/// gets canonically serialized, hashed (B1) and signed (B4).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockBody {
  /// Milliseconds since the epoch, as read from a monotonic clock at
  /// creation time.
  pub timestamp: i64,
  pub transactions: Vec<Transaction>,
  pub node_pubkey: Pubkey,
  pub voters: Vec<Pubkey>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
  pub id: BlockId,
  pub signature: Signature,
  pub block: BlockBody,
}

impl Block {
  pub fn compute_id(&self) -> Result<BlockId, CanonicalizeError> {
    Ok(BlockId::new(canonical_hash_hex(&self.block)?))
  }

  pub fn is_majority_valid(&self, valid_voters: usize) -> bool {
    valid_voters * 2 > self.block.voters.len()
  }
}
