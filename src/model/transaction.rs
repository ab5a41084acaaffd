use {
  super::TxId,
  crate::crypto::{canonical_hash_hex, CanonicalizeError, Pubkey, Signature},
  serde::{Deserialize, Serialize},
};

/// The six-variant tagged operation a transaction performs. Dispatch on
/// this tag is a plain `match`, not subclass polymorphism (see
/// SPEC_FULL.md §9).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
  Create,
  Genesis,
  Transfer,
  Contract,
  Interim,
  Metadata,
}

impl Operation {
  /// Fulfillments and conditions are required for these operations (I2).
  pub fn requires_fulfillments(self) -> bool {
    matches!(self, Operation::Transfer)
  }

  pub fn requires_conditions(self) -> bool {
    matches!(
      self,
      Operation::Create | Operation::Genesis | Operation::Transfer
    )
  }
}

/// Names an input as `(txid, cid)` plus the cryptographic fulfillment
/// that satisfies the referenced condition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Input {
  pub txid: TxId,
  pub cid: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fulfillment {
  pub input: Input,
  /// Base64-encoded Ed25519 signature over the spending transaction's
  /// body with every fulfillment's signature blanked
  /// (see [`TransactionBody::transfer_signing_bytes`]), verified against
  /// the referenced condition's `owners_after` (any one of them
  /// satisfies the fulfillment).
  pub fulfillment: Signature,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Condition {
  pub cid: u32,
  pub amount: u64,
  pub owners_after: Vec<Pubkey>,
  pub condition: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Asset {
  pub data_id: String,
  #[serde(default)]
  pub data: serde_json::Value,
  #[serde(default)]
  pub divisible: bool,
  #[serde(default)]
  pub updatable: bool,
  #[serde(default)]
  pub refillable: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metadata {
  pub id: String,
  #[serde(default)]
  pub data: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractSignature {
  pub signature: Signature,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContractBody {
  pub contract_owners: Vec<Pubkey>,
  pub contract_signatures: Vec<ContractSignature>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationVote {
  pub signature: Signature,
}

/// Present when `version == 2`: a federated, vote-in-transaction
/// endorsement by a subset of `voters`, each signing `transaction.id`
/// directly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relation {
  pub voters: Vec<Pubkey>,
  pub votes: Vec<RelationVote>,
  pub task_id: String,
}

/// Everything about a transaction except its id: this is exactly what
/// gets canonically serialized and hashed to produce that id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionBody {
  pub version: u8,
  pub operation: Operation,
  #[serde(default)]
  pub fulfillments: Vec<Fulfillment>,
  #[serde(default)]
  pub conditions: Vec<Condition>,
  pub asset: Asset,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub metadata: Option<Metadata>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contract: Option<ContractBody>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub relation: Option<Relation>,
}

/// The contract sub-object a CONTRACT signature is verified over: just
/// the owners plus signatures nulled out, not the enclosing transaction
/// body.
#[derive(Serialize)]
struct ContractSigningView {
  contract_owners: Vec<Pubkey>,
  contract_signatures: Option<Vec<ContractSignature>>,
}

impl TransactionBody {
  /// The bytes a CONTRACT's signatures sign: the `ContractBody`
  /// sub-object alone, with `contract_signatures` nulled, matching the
  /// donor's "serialize with ContractSignatures nulled" rule.
  pub fn contract_signing_bytes(&self) -> Result<Vec<u8>, CanonicalizeError> {
    let contract_owners = self
      .contract
      .as_ref()
      .map(|c| c.contract_owners.clone())
      .unwrap_or_default();
    crate::crypto::canonical_bytes(&ContractSigningView {
      contract_owners,
      contract_signatures: None,
    })
  }

  /// The bytes a TRANSFER's fulfillments sign: the body with every
  /// fulfillment's own signature blanked out. Signing `self.id` directly
  /// would be circular, since `id` is the hash of a body that contains
  /// the fulfillments being produced.
  fn body_for_transfer_signing(&self) -> TransactionBody {
    let mut body = self.clone();
    for fulfillment in body.fulfillments.iter_mut() {
      fulfillment.fulfillment = crate::crypto::Signature::placeholder();
    }
    body
  }

  pub fn transfer_signing_bytes(&self) -> Result<Vec<u8>, CanonicalizeError> {
    crate::crypto::canonical_bytes(&self.body_for_transfer_signing())
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
  pub id: TxId,
  #[serde(flatten)]
  pub body: TransactionBody,
}

impl Transaction {
  /// Computes the id this transaction *should* have (I1). Does not
  /// mutate `self`; callers compare against `self.id`.
  pub fn compute_id(&self) -> Result<TxId, CanonicalizeError> {
    Ok(TxId::new(canonical_hash_hex(&self.body)?))
  }

  pub fn operation(&self) -> Operation {
    self.body.operation
  }
}
