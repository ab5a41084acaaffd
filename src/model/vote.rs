use {
  super::BlockId,
  crate::crypto::{canonical_bytes, CanonicalizeError, Keypair, Pubkey, Signature},
  serde::{Deserialize, Serialize},
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteBody {
  pub voting_for_block: BlockId,
  pub previous_block: BlockId,
  pub is_block_valid: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub invalid_reason: Option<String>,
  /// Seconds since the epoch.
  pub timestamp: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
  pub node_pubkey: Pubkey,
  pub signature: Signature,
  pub vote: VoteBody,
}

impl Vote {
  /// Builds and signs a vote. `previous_block` must be the voter's
  /// current head as tracked by the aggregator (S4).
  pub fn sign(
    keypair: &Keypair,
    voting_for_block: BlockId,
    previous_block: BlockId,
    is_block_valid: bool,
    invalid_reason: Option<String>,
    timestamp: i64,
  ) -> Result<Self, CanonicalizeError> {
    let body = VoteBody {
      voting_for_block,
      previous_block,
      is_block_valid,
      invalid_reason,
      timestamp,
    };
    let signature = keypair.sign(&canonical_bytes(&body)?);
    Ok(Self {
      node_pubkey: keypair.public(),
      signature,
      vote: body,
    })
  }

  pub fn verify_signature(&self) -> bool {
    match canonical_bytes(&self.vote) {
      Ok(bytes) => self.node_pubkey.verify(&bytes, &self.signature),
      Err(_) => false,
    }
  }
}
