//! The record-store adapter (C2): a narrow trait over four logical
//! tables (*backlog*, *chain*, *votes*, *membership*) plus a change feed
//! on *chain*. Any backend satisfying these semantics is acceptable; two
//! are shipped (`MemoryStore` for tests, `SledStore` for single-box
//! on-disk operation).

mod memory;
mod sled_store;

pub use {memory::MemoryStore, sled_store::SledStore};

use {
  crate::{
    errors::StoreError,
    model::{Block, BlockId, Transaction, TxId, Vote},
  },
  async_trait::async_trait,
  futures::stream::BoxStream,
  serde::{Deserialize, Serialize},
};

/// Derived status of a transaction, per §4.2.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TxStatus {
  Valid,
  Undecided,
  Invalid,
  Backlog,
  NotFound,
}

/// Durability hint for `write_block`; see SPEC_FULL.md §9 for the
/// resolved soft/hard window discussion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Durability {
  Soft,
  Hard,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BacklogEntry {
  pub tx: Transaction,
  pub assignee: crate::crypto::Pubkey,
  pub assignment_timestamp: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Table {
  Backlog,
  Chain,
  Votes,
  Membership,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

#[derive(Clone, Debug)]
pub struct ChangeEvent {
  pub table: Table,
  pub kind: ChangeKind,
  pub payload: serde_json::Value,
}

pub type ChangeStream = BoxStream<'static, ChangeEvent>;

#[async_trait]
pub trait RecordStore: Send + Sync {
  // -- backlog --
  async fn write_backlog(
    &self,
    tx: Transaction,
    assignee: crate::crypto::Pubkey,
    assignment_timestamp: i64,
  ) -> Result<(), StoreError>;
  async fn update_backlog(
    &self,
    txid: &TxId,
    assignee: crate::crypto::Pubkey,
    assignment_timestamp: i64,
  ) -> Result<(), StoreError>;
  async fn delete_backlog(&self, txids: &[TxId]) -> Result<(), StoreError>;
  async fn get_stale_backlog(&self, delay_s: i64) -> Result<Vec<BacklogEntry>, StoreError>;
  async fn drain_backlog_for(
    &self,
    assignee: &crate::crypto::Pubkey,
    max: usize,
  ) -> Result<Vec<BacklogEntry>, StoreError>;

  // -- chain --
  async fn write_block(&self, block: Block, durability: Durability) -> Result<(), StoreError>;
  async fn has_tx(&self, txid: &TxId) -> Result<bool, StoreError>;
  async fn count_blocks(&self) -> Result<u64, StoreError>;
  async fn get_block(&self, id: &BlockId) -> Result<Option<Block>, StoreError>;
  async fn get_block_by_tx(&self, txid: &TxId) -> Result<Option<Block>, StoreError>;
  async fn get_genesis(&self) -> Result<Block, StoreError>;

  // -- transaction status / double-spend --
  async fn get_tx(&self, txid: &TxId) -> Result<(Option<Transaction>, TxStatus), StoreError>;
  async fn get_spent(&self, txid: &TxId, cid: u32) -> Result<Option<Transaction>, StoreError>;

  // -- votes --
  async fn write_vote(&self, vote: Vote) -> Result<(), StoreError>;
  async fn get_votes_for_block(&self, block_id: &BlockId) -> Result<Vec<Vote>, StoreError>;
  async fn get_votes_for_block_and_voter(
    &self,
    block_id: &BlockId,
    voter: &crate::crypto::Pubkey,
  ) -> Result<Vec<Vote>, StoreError>;
  async fn get_votes_by_voter(
    &self,
    voter: &crate::crypto::Pubkey,
  ) -> Result<Vec<Vote>, StoreError>;
  async fn get_unvoted_blocks(
    &self,
    voter: &crate::crypto::Pubkey,
  ) -> Result<Vec<Block>, StoreError>;

  // -- membership --
  async fn heartbeat(&self, node: crate::crypto::Pubkey, now: i64) -> Result<(), StoreError>;
  async fn live_nodes(
    &self,
    known: &[crate::crypto::Pubkey],
    liveness_threshold_s: i64,
    now: i64,
  ) -> Result<Vec<crate::crypto::Pubkey>, StoreError>;

  // -- change feed --
  /// Subscribes to `table`/`kind` change events, primed with `prefeed`
  /// (typically `get_unvoted_blocks(voter)` encoded as insert events).
  fn change_feed(&self, table: Table, kind: ChangeKind, prefeed: Vec<ChangeEvent>)
    -> ChangeStream;
}
