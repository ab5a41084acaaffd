use {
  crate::model::{BlockId, TxId},
  thiserror::Error,
};

/// Validation failures, surfaced structurally rather than collapsed into
/// a single opaque error. Within the vote pipeline these are never
/// propagated across workers — they're turned into `invalid` outcomes
/// (see [`crate::pipeline`]) — but user-facing submission/query paths
/// surface them as-is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
  #[error("declared id does not match the hash of the canonical body")]
  InvalidHash,

  #[error("signature verification failed")]
  InvalidSignature,

  #[error("transaction `{0}` does not exist")]
  TransactionDoesNotExist(TxId),

  #[error("input `{0}` is not in a majority-valid block")]
  FulfillmentNotInValidBlock(TxId),

  #[error("input `{0}:{1}` has already been spent")]
  DoubleSpend(TxId, u32),

  #[error("transaction inputs reference more than one asset")]
  AssetIdMismatch,

  #[error("operation error: {0}")]
  OperationError(String),

  #[error("contract signature count exceeds owner count")]
  MultiContractOwner,

  #[error("relation vote count exceeds voter count")]
  MultiContractNode,

  #[error("cyclic vote graph detected while resolving chain head for a voter")]
  CyclicBlockchainError,
}

/// Record-store failures. `Transient` errors are the ones the core retries
/// with bounded backoff; everything else is treated as permanent for the
/// current operation (the caller drops the current item and continues,
/// per §4.5's failure semantics).
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("transient store error: {0}")]
  Transient(String),

  #[error("block `{0}` not found")]
  BlockNotFound(BlockId),

  #[error("serialization error: {0}")]
  Serialization(#[from] bincode::Error),

  #[error("storage engine error: {0}")]
  Engine(#[from] sled::Error),

  #[error("system io error: {0}")]
  Io(#[from] std::io::Error),
}

impl StoreError {
  pub fn is_transient(&self) -> bool {
    matches!(self, StoreError::Transient(_))
  }
}
