//! Chain resolver (C4): reconstructs a validator's "last voted block"
//! from its own vote set, per SPEC_FULL.md §4.4.

use {
  crate::{
    crypto::Pubkey,
    errors::ValidationError,
    model::BlockId,
    store::RecordStore,
  },
  std::collections::{HashMap, HashSet},
};

/// Walks `voter`'s vote graph and returns the id of the block it last
/// voted for. With zero votes, returns the genesis block's id.
pub async fn last_voted_block(
  store: &dyn RecordStore,
  voter: &Pubkey,
) -> Result<BlockId, ValidationError> {
  let votes = store
    .get_votes_by_voter(voter)
    .await
    .map_err(|e| ValidationError::OperationError(e.to_string()))?;

  let t_max = match votes.iter().map(|v| v.vote.timestamp).max() {
    Some(t) => t,
    None => {
      let genesis = store
        .get_genesis()
        .await
        .map_err(|e| ValidationError::OperationError(e.to_string()))?;
      return Ok(genesis.id);
    }
  };

  let mut edges: HashMap<BlockId, BlockId> = HashMap::new();
  for vote in votes.iter().filter(|v| v.vote.timestamp == t_max) {
    edges.insert(vote.vote.previous_block.clone(), vote.vote.voting_for_block.clone());
  }

  let mut x = match edges.values().next() {
    Some(v) => v.clone(),
    None => unreachable!("S is non-empty by construction of t_max"),
  };

  let mut explored: HashSet<BlockId> = HashSet::new();
  loop {
    if explored.contains(&x) {
      return Err(ValidationError::CyclicBlockchainError);
    }
    explored.insert(x.clone());
    match edges.get(&x) {
      Some(next) => x = next.clone(),
      None => break,
    }
  }

  Ok(x)
}

#[cfg(test)]
mod test {
  use {
    super::*,
    crate::{crypto::Keypair, model::Vote, store::MemoryStore},
  };

  async fn store_with_genesis() -> (MemoryStore, Keypair) {
    let kp = Keypair::generate(&mut rand::thread_rng());
    let genesis = crate::model::build_genesis(&kp, vec![kp.public()], "t").unwrap();
    (MemoryStore::new(genesis), kp)
  }

  #[tokio::test]
  async fn zero_votes_returns_genesis() {
    let (store, kp) = store_with_genesis().await;
    let genesis = store.get_genesis().await.unwrap();
    let head = last_voted_block(&store, &kp.public()).await.unwrap();
    assert_eq!(head, genesis.id);
  }

  #[tokio::test]
  async fn follows_forward_edges_under_timestamp_collision() {
    let (store, kp) = store_with_genesis().await;
    let genesis = store.get_genesis().await.unwrap();

    let v1 = Vote::sign(
      &kp,
      BlockId::new("b1"),
      genesis.id.clone(),
      true,
      None,
      1000,
    )
    .unwrap();
    let v2 = Vote::sign(&kp, BlockId::new("b2"), BlockId::new("b1"), true, None, 1000).unwrap();
    store.write_vote(v1).await.unwrap();
    store.write_vote(v2).await.unwrap();

    let head = last_voted_block(&store, &kp.public()).await.unwrap();
    assert_eq!(head, BlockId::new("b2"));
  }

  #[tokio::test]
  async fn cyclic_votes_are_detected() {
    let (store, kp) = store_with_genesis().await;

    let v1 = Vote::sign(&kp, BlockId::new("a"), BlockId::new("b"), true, None, 1000).unwrap();
    let v2 = Vote::sign(&kp, BlockId::new("b"), BlockId::new("a"), true, None, 1000).unwrap();
    store.write_vote(v1).await.unwrap();
    store.write_vote(v2).await.unwrap();

    let err = last_voted_block(&store, &kp.public()).await.unwrap_err();
    assert_eq!(err, ValidationError::CyclicBlockchainError);
  }
}
