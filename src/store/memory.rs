use {
  super::{BacklogEntry, ChangeEvent, ChangeKind, ChangeStream, Durability, RecordStore, Table,
    TxStatus},
  crate::{
    crypto::Pubkey,
    errors::StoreError,
    model::{Block, BlockId, Transaction, TxId, Vote},
  },
  async_trait::async_trait,
  futures::StreamExt,
  std::collections::HashMap,
  tokio::sync::{broadcast, RwLock},
};

struct Inner {
  backlog: HashMap<TxId, BacklogEntry>,
  chain: HashMap<BlockId, Block>,
  tx_block: HashMap<TxId, BlockId>,
  votes: HashMap<BlockId, Vec<Vote>>,
  membership: HashMap<Pubkey, i64>,
}

/// A plain in-process store with no durability. Used by unit and
/// scenario tests, and as the default when no `--data-dir` is given.
pub struct MemoryStore {
  inner: RwLock<Inner>,
  changes: broadcast::Sender<ChangeEvent>,
  genesis_id: BlockId,
}

impl MemoryStore {
  pub fn new(genesis: Block) -> Self {
    let (changes, _) = broadcast::channel(4096);
    let mut inner = Inner {
      backlog: HashMap::new(),
      chain: HashMap::new(),
      tx_block: HashMap::new(),
      votes: HashMap::new(),
      membership: HashMap::new(),
    };
    for tx in &genesis.block.transactions {
      inner.tx_block.insert(tx.id.clone(), genesis.id.clone());
    }
    let genesis_id = genesis.id.clone();
    inner.chain.insert(genesis.id.clone(), genesis);
    Self {
      inner: RwLock::new(inner),
      changes,
      genesis_id,
    }
  }

  fn block_vote_status(block: &Block, votes: &[Vote]) -> TxStatus {
    let total = block.block.voters.len().max(1);
    let valid = votes.iter().filter(|v| v.vote.is_block_valid).count();
    let invalid = votes.len() - valid;
    if valid * 2 > total {
      TxStatus::Valid
    } else if invalid * 2 > total {
      TxStatus::Invalid
    } else {
      TxStatus::Undecided
    }
  }
}

#[async_trait]
impl RecordStore for MemoryStore {
  async fn write_backlog(
    &self,
    tx: Transaction,
    assignee: Pubkey,
    assignment_timestamp: i64,
  ) -> Result<(), StoreError> {
    let mut inner = self.inner.write().await;
    inner.backlog.insert(tx.id.clone(), BacklogEntry {
      tx,
      assignee,
      assignment_timestamp,
    });
    Ok(())
  }

  async fn update_backlog(
    &self,
    txid: &TxId,
    assignee: Pubkey,
    assignment_timestamp: i64,
  ) -> Result<(), StoreError> {
    let mut inner = self.inner.write().await;
    if let Some(entry) = inner.backlog.get_mut(txid) {
      entry.assignee = assignee;
      entry.assignment_timestamp = assignment_timestamp;
    }
    Ok(())
  }

  async fn delete_backlog(&self, txids: &[TxId]) -> Result<(), StoreError> {
    let mut inner = self.inner.write().await;
    for id in txids {
      inner.backlog.remove(id);
    }
    Ok(())
  }

  async fn get_stale_backlog(&self, delay_s: i64) -> Result<Vec<BacklogEntry>, StoreError> {
    let inner = self.inner.read().await;
    let now = chrono::Utc::now().timestamp();
    Ok(
      inner
        .backlog
        .values()
        .filter(|e| now - e.assignment_timestamp > delay_s)
        .cloned()
        .collect(),
    )
  }

  async fn drain_backlog_for(
    &self,
    assignee: &Pubkey,
    max: usize,
  ) -> Result<Vec<BacklogEntry>, StoreError> {
    let inner = self.inner.read().await;
    Ok(
      inner
        .backlog
        .values()
        .filter(|e| &e.assignee == assignee)
        .take(max)
        .cloned()
        .collect(),
    )
  }

  async fn write_block(&self, block: Block, _durability: Durability) -> Result<(), StoreError> {
    let payload = serde_json::to_value(&block)
      .map_err(|e| StoreError::Transient(e.to_string()))?;
    let mut inner = self.inner.write().await;
    for tx in &block.block.transactions {
      inner.tx_block.insert(tx.id.clone(), block.id.clone());
    }
    inner.chain.insert(block.id.clone(), block);
    drop(inner);
    let _ = self.changes.send(ChangeEvent {
      table: Table::Chain,
      kind: ChangeKind::Insert,
      payload,
    });
    Ok(())
  }

  async fn has_tx(&self, txid: &TxId) -> Result<bool, StoreError> {
    let inner = self.inner.read().await;
    Ok(inner.tx_block.contains_key(txid))
  }

  async fn count_blocks(&self) -> Result<u64, StoreError> {
    let inner = self.inner.read().await;
    Ok(inner.chain.len() as u64)
  }

  async fn get_block(&self, id: &BlockId) -> Result<Option<Block>, StoreError> {
    let inner = self.inner.read().await;
    Ok(inner.chain.get(id).cloned())
  }

  async fn get_block_by_tx(&self, txid: &TxId) -> Result<Option<Block>, StoreError> {
    let inner = self.inner.read().await;
    match inner.tx_block.get(txid) {
      Some(block_id) => Ok(inner.chain.get(block_id).cloned()),
      None => Ok(None),
    }
  }

  async fn get_genesis(&self) -> Result<Block, StoreError> {
    let inner = self.inner.read().await;
    inner
      .chain
      .get(&self.genesis_id)
      .cloned()
      .ok_or_else(|| StoreError::BlockNotFound(self.genesis_id.clone()))
  }

  async fn get_tx(&self, txid: &TxId) -> Result<(Option<Transaction>, TxStatus), StoreError> {
    let inner = self.inner.read().await;
    if let Some(entry) = inner.backlog.get(txid) {
      return Ok((Some(entry.tx.clone()), TxStatus::Backlog));
    }
    if let Some(block_id) = inner.tx_block.get(txid) {
      let block = inner.chain.get(block_id).expect("index consistency");
      let tx = block
        .block
        .transactions
        .iter()
        .find(|t| &t.id == txid)
        .cloned();
      let votes = inner.votes.get(block_id).cloned().unwrap_or_default();
      let status = Self::block_vote_status(block, &votes);
      return Ok((tx, status));
    }
    Ok((None, TxStatus::NotFound))
  }

  async fn get_spent(&self, txid: &TxId, cid: u32) -> Result<Option<Transaction>, StoreError> {
    let inner = self.inner.read().await;
    for block in inner.chain.values() {
      for tx in &block.block.transactions {
        for f in &tx.body.fulfillments {
          if &f.input.txid == txid && f.input.cid == cid {
            return Ok(Some(tx.clone()));
          }
        }
      }
    }
    Ok(None)
  }

  async fn write_vote(&self, vote: Vote) -> Result<(), StoreError> {
    let payload =
      serde_json::to_value(&vote).map_err(|e| StoreError::Transient(e.to_string()))?;
    let mut inner = self.inner.write().await;
    let votes = inner.votes.entry(vote.vote.voting_for_block.clone()).or_default();
    match votes.iter_mut().find(|v| v.node_pubkey == vote.node_pubkey) {
      Some(existing) => *existing = vote,
      None => votes.push(vote),
    }
    drop(inner);
    let _ = self.changes.send(ChangeEvent {
      table: Table::Votes,
      kind: ChangeKind::Insert,
      payload,
    });
    Ok(())
  }

  async fn get_votes_for_block(&self, block_id: &BlockId) -> Result<Vec<Vote>, StoreError> {
    let inner = self.inner.read().await;
    Ok(inner.votes.get(block_id).cloned().unwrap_or_default())
  }

  async fn get_votes_for_block_and_voter(
    &self,
    block_id: &BlockId,
    voter: &Pubkey,
  ) -> Result<Vec<Vote>, StoreError> {
    let inner = self.inner.read().await;
    Ok(
      inner
        .votes
        .get(block_id)
        .map(|votes| {
          votes
            .iter()
            .filter(|v| &v.node_pubkey == voter)
            .cloned()
            .collect()
        })
        .unwrap_or_default(),
    )
  }

  async fn get_votes_by_voter(&self, voter: &Pubkey) -> Result<Vec<Vote>, StoreError> {
    let inner = self.inner.read().await;
    Ok(
      inner
        .votes
        .values()
        .flatten()
        .filter(|v| &v.node_pubkey == voter)
        .cloned()
        .collect(),
    )
  }

  async fn get_unvoted_blocks(&self, voter: &Pubkey) -> Result<Vec<Block>, StoreError> {
    let inner = self.inner.read().await;
    let mut blocks: Vec<Block> = inner
      .chain
      .values()
      .filter(|b| b.id != self.genesis_id)
      .filter(|b| {
        !inner
          .votes
          .get(&b.id)
          .map(|votes| votes.iter().any(|v| &v.node_pubkey == voter))
          .unwrap_or(false)
      })
      .cloned()
      .collect();
    blocks.sort_by_key(|b| b.block.timestamp);
    Ok(blocks)
  }

  async fn heartbeat(&self, node: Pubkey, now: i64) -> Result<(), StoreError> {
    let mut inner = self.inner.write().await;
    inner.membership.insert(node, now);
    Ok(())
  }

  async fn live_nodes(
    &self,
    known: &[Pubkey],
    liveness_threshold_s: i64,
    now: i64,
  ) -> Result<Vec<Pubkey>, StoreError> {
    let inner = self.inner.read().await;
    Ok(
      known
        .iter()
        .filter(|pk| {
          inner
            .membership
            .get(pk)
            .map(|last| now - last <= liveness_threshold_s)
            .unwrap_or(false)
        })
        .cloned()
        .collect(),
    )
  }

  fn change_feed(
    &self,
    table: Table,
    kind: ChangeKind,
    prefeed: Vec<ChangeEvent>,
  ) -> ChangeStream {
    let rx = self.changes.subscribe();
    let live = tokio_stream::wrappers::BroadcastStream::new(rx)
      .filter_map(|r| async move { r.ok() })
      .filter(move |e| futures::future::ready(e.table == table && e.kind == kind));
    futures::stream::iter(prefeed).chain(live).boxed()
  }
}
