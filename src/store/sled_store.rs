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
  std::path::Path,
  tokio::sync::broadcast,
};

/// Embedded ordered-key-value-engine-backed store, for single-box
/// operation and on-disk integration tests. One tree per logical table,
/// mirroring the donor's column-family-per-concern layout in
/// `src/storage/blocks.rs`, plus a `hashes` auxiliary tree the same way
/// that module keeps a hash-to-height index alongside block data.
pub struct SledStore {
  backlog: sled::Tree,
  chain: sled::Tree,
  hashes: sled::Tree,
  votes: sled::Tree,
  membership: sled::Tree,
  changes: broadcast::Sender<ChangeEvent>,
  genesis_id: BlockId,
}

impl SledStore {
  pub fn open(directory: impl AsRef<Path>, genesis: Block) -> Result<Self, StoreError> {
    std::fs::create_dir_all(directory.as_ref())?;
    let db = sled::open(directory.as_ref())?;
    let store = Self {
      backlog: db.open_tree("backlog")?,
      chain: db.open_tree("chain")?,
      hashes: db.open_tree("hashes")?,
      votes: db.open_tree("votes")?,
      membership: db.open_tree("membership")?,
      changes: broadcast::channel(4096).0,
      genesis_id: genesis.id.clone(),
    };
    if !store.chain.contains_key(genesis.id.as_str())? {
      store.insert_block(&genesis)?;
    }
    Ok(store)
  }

  fn insert_block(&self, block: &Block) -> Result<(), StoreError> {
    let encoded = bincode::serialize(block)?;
    self.chain.insert(block.id.as_str(), encoded)?;
    for tx in &block.block.transactions {
      self
        .hashes
        .insert(tx.id.as_str(), block.id.as_str().as_bytes())?;
    }
    Ok(())
  }

  fn vote_key(block_id: &BlockId, voter: &Pubkey) -> String {
    format!("{block_id}:{voter}")
  }

  fn votes_for_block(&self, block_id: &BlockId) -> Result<Vec<Vote>, StoreError> {
    let prefix = format!("{block_id}:");
    let mut out = Vec::new();
    for item in self.votes.scan_prefix(prefix.as_bytes()) {
      let (_, value) = item?;
      out.push(bincode::deserialize(&value)?);
    }
    Ok(out)
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
impl RecordStore for SledStore {
  async fn write_backlog(
    &self,
    tx: Transaction,
    assignee: Pubkey,
    assignment_timestamp: i64,
  ) -> Result<(), StoreError> {
    let entry = BacklogEntry {
      tx,
      assignee,
      assignment_timestamp,
    };
    let key = entry.tx.id.as_str().to_owned();
    self.backlog.insert(key, bincode::serialize(&entry)?)?;
    Ok(())
  }

  async fn update_backlog(
    &self,
    txid: &TxId,
    assignee: Pubkey,
    assignment_timestamp: i64,
  ) -> Result<(), StoreError> {
    if let Some(bytes) = self.backlog.get(txid.as_str())? {
      let mut entry: BacklogEntry = bincode::deserialize(&bytes)?;
      entry.assignee = assignee;
      entry.assignment_timestamp = assignment_timestamp;
      self
        .backlog
        .insert(txid.as_str(), bincode::serialize(&entry)?)?;
    }
    Ok(())
  }

  async fn delete_backlog(&self, txids: &[TxId]) -> Result<(), StoreError> {
    for id in txids {
      self.backlog.remove(id.as_str())?;
    }
    Ok(())
  }

  async fn get_stale_backlog(&self, delay_s: i64) -> Result<Vec<BacklogEntry>, StoreError> {
    let now = chrono::Utc::now().timestamp();
    let mut out = Vec::new();
    for item in self.backlog.iter() {
      let (_, value) = item?;
      let entry: BacklogEntry = bincode::deserialize(&value)?;
      if now - entry.assignment_timestamp > delay_s {
        out.push(entry);
      }
    }
    Ok(out)
  }

  async fn drain_backlog_for(
    &self,
    assignee: &Pubkey,
    max: usize,
  ) -> Result<Vec<BacklogEntry>, StoreError> {
    let mut out = Vec::new();
    for item in self.backlog.iter() {
      if out.len() >= max {
        break;
      }
      let (_, value) = item?;
      let entry: BacklogEntry = bincode::deserialize(&value)?;
      if &entry.assignee == assignee {
        out.push(entry);
      }
    }
    Ok(out)
  }

  async fn write_block(&self, block: Block, _durability: Durability) -> Result<(), StoreError> {
    let payload = serde_json::to_value(&block).map_err(|e| StoreError::Transient(e.to_string()))?;
    self.insert_block(&block)?;
    let _ = self.changes.send(ChangeEvent {
      table: Table::Chain,
      kind: ChangeKind::Insert,
      payload,
    });
    Ok(())
  }

  async fn has_tx(&self, txid: &TxId) -> Result<bool, StoreError> {
    Ok(self.hashes.contains_key(txid.as_str())?)
  }

  async fn count_blocks(&self) -> Result<u64, StoreError> {
    Ok(self.chain.len() as u64)
  }

  async fn get_block(&self, id: &BlockId) -> Result<Option<Block>, StoreError> {
    match self.chain.get(id.as_str())? {
      Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
      None => Ok(None),
    }
  }

  async fn get_block_by_tx(&self, txid: &TxId) -> Result<Option<Block>, StoreError> {
    match self.hashes.get(txid.as_str())? {
      Some(block_id_bytes) => {
        let block_id = String::from_utf8_lossy(&block_id_bytes).into_owned();
        self.get_block(&BlockId::new(block_id)).await
      }
      None => Ok(None),
    }
  }

  async fn get_genesis(&self) -> Result<Block, StoreError> {
    self
      .get_block(&self.genesis_id)
      .await?
      .ok_or_else(|| StoreError::BlockNotFound(self.genesis_id.clone()))
  }

  async fn get_tx(&self, txid: &TxId) -> Result<(Option<Transaction>, TxStatus), StoreError> {
    if let Some(bytes) = self.backlog.get(txid.as_str())? {
      let entry: BacklogEntry = bincode::deserialize(&bytes)?;
      return Ok((Some(entry.tx), TxStatus::Backlog));
    }
    if let Some(block) = self.get_block_by_tx(txid).await? {
      let tx = block
        .block
        .transactions
        .iter()
        .find(|t| &t.id == txid)
        .cloned();
      let votes = self.votes_for_block(&block.id)?;
      let status = Self::block_vote_status(&block, &votes);
      return Ok((tx, status));
    }
    Ok((None, TxStatus::NotFound))
  }

  async fn get_spent(&self, txid: &TxId, cid: u32) -> Result<Option<Transaction>, StoreError> {
    for item in self.chain.iter() {
      let (_, value) = item?;
      let block: Block = bincode::deserialize(&value)?;
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
    let payload = serde_json::to_value(&vote).map_err(|e| StoreError::Transient(e.to_string()))?;
    let key = Self::vote_key(&vote.vote.voting_for_block, &vote.node_pubkey);
    self.votes.insert(key, bincode::serialize(&vote)?)?;
    let _ = self.changes.send(ChangeEvent {
      table: Table::Votes,
      kind: ChangeKind::Insert,
      payload,
    });
    Ok(())
  }

  async fn get_votes_for_block(&self, block_id: &BlockId) -> Result<Vec<Vote>, StoreError> {
    self.votes_for_block(block_id)
  }

  async fn get_votes_for_block_and_voter(
    &self,
    block_id: &BlockId,
    voter: &Pubkey,
  ) -> Result<Vec<Vote>, StoreError> {
    match self.votes.get(Self::vote_key(block_id, voter))? {
      Some(bytes) => Ok(vec![bincode::deserialize(&bytes)?]),
      None => Ok(vec![]),
    }
  }

  async fn get_votes_by_voter(&self, voter: &Pubkey) -> Result<Vec<Vote>, StoreError> {
    let mut out = Vec::new();
    for item in self.votes.iter() {
      let (_, value) = item?;
      let vote: Vote = bincode::deserialize(&value)?;
      if &vote.node_pubkey == voter {
        out.push(vote);
      }
    }
    Ok(out)
  }

  async fn get_unvoted_blocks(&self, voter: &Pubkey) -> Result<Vec<Block>, StoreError> {
    let mut blocks = Vec::new();
    for item in self.chain.iter() {
      let (_, value) = item?;
      let block: Block = bincode::deserialize(&value)?;
      if block.id == self.genesis_id {
        continue;
      }
      let voted = !self
        .get_votes_for_block_and_voter(&block.id, voter)
        .await?
        .is_empty();
      if !voted {
        blocks.push(block);
      }
    }
    blocks.sort_by_key(|b| b.block.timestamp);
    Ok(blocks)
  }

  async fn heartbeat(&self, node: Pubkey, now: i64) -> Result<(), StoreError> {
    self
      .membership
      .insert(*node.as_bytes(), now.to_be_bytes().to_vec())?;
    Ok(())
  }

  async fn live_nodes(
    &self,
    known: &[Pubkey],
    liveness_threshold_s: i64,
    now: i64,
  ) -> Result<Vec<Pubkey>, StoreError> {
    let mut out = Vec::new();
    for pk in known {
      if let Some(bytes) = self.membership.get(pk.as_bytes())? {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        let last = i64::from_be_bytes(buf);
        if now - last <= liveness_threshold_s {
          out.push(*pk);
        }
      }
    }
    Ok(out)
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
