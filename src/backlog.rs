//! Assignment & backlog manager (C6), per SPEC_FULL.md §4.6.

use {
  crate::{
    crypto::{Keypair, Pubkey},
    errors::{StoreError, ValidationError},
    model::{Block, BlockBody, Transaction},
    store::{Durability, RecordStore},
    validate,
  },
  rand::seq::SliceRandom,
};

/// Assigns submitted transactions to a live validator and scans for
/// stale assignments that need reassignment.
pub struct BacklogManager<S: RecordStore> {
  store: std::sync::Arc<S>,
  validators: Vec<Pubkey>,
}

impl<S: RecordStore> BacklogManager<S> {
  pub fn new(store: std::sync::Arc<S>, validators: Vec<Pubkey>) -> Self {
    Self { store, validators }
  }

  /// Picks an assignee uniformly at random among currently-live nodes
  /// and inserts the transaction into *backlog*.
  pub async fn submit(
    &self,
    tx: Transaction,
    liveness_threshold_s: i64,
    now: i64,
  ) -> Result<(), StoreError> {
    let live = self
      .store
      .live_nodes(&self.validators, liveness_threshold_s, now)
      .await?;
    let assignee = pick_assignee(&live, &self.validators)?;
    self.store.write_backlog(tx, assignee, now).await
  }

  /// Scans stale backlog entries (older than `delay_s`) and patches the
  /// ones whose current assignee is no longer live. The patch is a
  /// per-row conditional update, never a fleet-wide one -- see
  /// SPEC_FULL.md §9's resolution of the `update_assign_node` open
  /// question.
  pub async fn reassign_stale(&self, delay_s: i64, liveness_threshold_s: i64, now: i64) -> Result<usize, StoreError> {
    let live = self
      .store
      .live_nodes(&self.validators, liveness_threshold_s, now)
      .await?;
    let stale = self.store.get_stale_backlog(delay_s).await?;

    let mut reassigned = 0;
    for entry in stale {
      if live.contains(&entry.assignee) {
        continue;
      }
      let new_assignee = pick_assignee(&live, &self.validators)?;
      self
        .store
        .update_backlog(&entry.tx.id, new_assignee, now)
        .await?;
      reassigned += 1;
    }
    Ok(reassigned)
  }
}

fn pick_assignee(live: &[Pubkey], fallback: &[Pubkey]) -> Result<Pubkey, StoreError> {
  let pool = if live.is_empty() { fallback } else { live };
  pool
    .choose(&mut rand::thread_rng())
    .copied()
    .ok_or_else(|| StoreError::Transient("no known validators to assign to".into()))
}

/// The assigned validator's view: drains its backlog, builds a block,
/// signs it, writes it, and clears the consumed backlog rows.
pub struct BlockBuilder<S: RecordStore> {
  store: std::sync::Arc<S>,
  keypair: Keypair,
  validators: Vec<Pubkey>,
}

impl<S: RecordStore> BlockBuilder<S> {
  pub fn new(store: std::sync::Arc<S>, keypair: Keypair, validators: Vec<Pubkey>) -> Self {
    Self {
      store,
      keypair,
      validators,
    }
  }

  /// Builds and persists a block from up to `max_txs` backlog entries
  /// assigned to this validator. Returns `None` if there was nothing to
  /// batch (B2: empty blocks are never created).
  pub async fn build_block(&self, max_txs: usize, now_ms: i64) -> Result<Option<Block>, ValidationError> {
    let entries = self
      .store
      .drain_backlog_for(&self.keypair.public(), max_txs)
      .await
      .map_err(|e| ValidationError::OperationError(e.to_string()))?;

    if entries.is_empty() {
      return Ok(None);
    }

    let transactions: Vec<Transaction> = entries.iter().map(|e| e.tx.clone()).collect();
    let body = BlockBody {
      timestamp: now_ms,
      transactions,
      node_pubkey: self.keypair.public(),
      voters: self.validators.clone(),
    };

    let id = crate::crypto::canonical_hash_hex(&body)
      .map_err(|_| ValidationError::InvalidHash)?;
    let signature_bytes =
      crate::crypto::canonical_bytes(&body).map_err(|_| ValidationError::InvalidHash)?;
    let signature = self.keypair.sign(&signature_bytes);

    let block = Block {
      id: id.into(),
      signature,
      block: body,
    };

    validate::validate_block(&block, &self.validators)?;

    self
      .store
      .write_block(block.clone(), Durability::Soft)
      .await
      .map_err(|e| ValidationError::OperationError(e.to_string()))?;

    let ids: Vec<_> = entries.iter().map(|e| e.tx.id.clone()).collect();
    self
      .store
      .delete_backlog(&ids)
      .await
      .map_err(|e| ValidationError::OperationError(e.to_string()))?;

    Ok(Some(block))
  }
}
