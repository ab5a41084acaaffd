//! Shared fixtures and end-to-end scenario tests exercising the full
//! submit -> block -> vote pipeline against the in-memory store.

use crate::{
  backlog::{BacklogManager, BlockBuilder},
  crypto::Keypair,
  metrics::NoopSink,
  model::{build_genesis, Asset, Block, Condition, Fulfillment, Input, Operation, Transaction, TransactionBody},
  pipeline::VoteEngine,
  store::MemoryStore,
  validate,
};
use std::sync::Arc;

pub fn keypair() -> Keypair {
  Keypair::generate(&mut rand::thread_rng())
}

/// A single-worker-per-stage pipeline config, for tests that assert on
/// cross-block vote ordering -- the default config may size S3 to
/// multiple workers, and completion order across workers isn't FIFO.
fn single_worker_config() -> crate::config::ArgumentConfig {
  let mut config = crate::config::ArgumentConfig::default();
  config.vote_pipeline.fraction_of_cores = 0.0;
  config
}

pub fn genesis_store(kp: &Keypair, voters: Vec<crate::crypto::Pubkey>) -> Arc<MemoryStore> {
  let genesis = build_genesis(kp, voters, "test-chain").unwrap();
  Arc::new(MemoryStore::new(genesis))
}

pub fn create_tx(data_id: &str) -> Transaction {
  let body = TransactionBody {
    version: 1,
    operation: Operation::Create,
    fulfillments: vec![],
    conditions: vec![],
    asset: Asset {
      data_id: data_id.into(),
      data: serde_json::json!({}),
      divisible: false,
      updatable: false,
      refillable: false,
    },
    metadata: None,
    contract: None,
    relation: None,
  };
  let id = crate::crypto::canonical_hash_hex(&body).unwrap();
  Transaction { id: id.into(), body }
}

/// A CREATE transaction with a single spendable condition owned by `kp`.
pub fn create_tx_with_condition(data_id: &str, kp: &Keypair) -> Transaction {
  let body = TransactionBody {
    version: 1,
    operation: Operation::Create,
    fulfillments: vec![],
    conditions: vec![Condition {
      cid: 0,
      amount: 1,
      owners_after: vec![kp.public()],
      condition: "cond".into(),
    }],
    asset: Asset {
      data_id: data_id.into(),
      data: serde_json::json!({}),
      divisible: false,
      updatable: false,
      refillable: false,
    },
    metadata: None,
    contract: None,
    relation: None,
  };
  let id = crate::crypto::canonical_hash_hex(&body).unwrap();
  Transaction { id: id.into(), body }
}

/// A TRANSFER spending `input_tx`'s condition 0, signed by `kp`.
pub fn transfer_tx(input_tx: &Transaction, kp: &Keypair, asset_data_id: &str) -> Transaction {
  let input = Input {
    txid: input_tx.id.clone(),
    cid: 0,
  };
  let mut body = TransactionBody {
    version: 1,
    operation: Operation::Transfer,
    fulfillments: vec![Fulfillment {
      input,
      fulfillment: crate::crypto::Signature::placeholder(),
    }],
    conditions: vec![],
    asset: Asset {
      data_id: asset_data_id.into(),
      data: serde_json::json!({}),
      divisible: false,
      updatable: false,
      refillable: false,
    },
    metadata: None,
    contract: None,
    relation: None,
  };
  let signing_bytes = body.transfer_signing_bytes().unwrap();
  body.fulfillments[0].fulfillment = kp.sign(&signing_bytes);
  let id = crate::crypto::canonical_hash_hex(&body).unwrap();
  Transaction { id: id.into(), body }
}

#[tokio::test]
async fn e1_single_validator_valid_block_yields_one_valid_vote() {
  use futures::StreamExt;

  let kp = keypair();
  let store = genesis_store(&kp, vec![kp.public()]);
  store.heartbeat(kp.public(), 1000).await.unwrap();

  let backlog = BacklogManager::new(Arc::clone(&store), vec![kp.public()]);
  backlog.submit(create_tx("asset-e1"), 30, 1000).await.unwrap();

  let builder = BlockBuilder::new(Arc::clone(&store), kp.clone(), vec![kp.public()]);
  let block = builder.build_block(10, 1500).await.unwrap().unwrap();

  let engine = VoteEngine::new(
    Arc::clone(&store),
    kp.clone(),
    vec![kp.public()],
    Default::default(),
    Arc::new(NoopSink),
  );
  let mut votes = engine.run().await.unwrap();

  let vote = tokio::time::timeout(std::time::Duration::from_secs(5), votes.next())
    .await
    .expect("pipeline should emit a vote before the timeout")
    .expect("stream should not end");

  assert_eq!(vote.vote.voting_for_block, block.id);
  assert!(vote.vote.is_block_valid);
  assert!(vote.verify_signature());

  let stored = store.get_votes_for_block(&block.id).await.unwrap();
  assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn e2_block_with_a_bad_signature_yields_an_invalid_vote() {
  use futures::StreamExt;

  let kp = keypair();
  let other = keypair();
  let store = genesis_store(&kp, vec![kp.public()]);

  let tx = create_tx("asset-e2");
  let body = crate::model::BlockBody {
    timestamp: 1000,
    transactions: vec![tx],
    node_pubkey: kp.public(),
    voters: vec![kp.public()],
  };
  let id = crate::crypto::canonical_hash_hex(&body).unwrap();
  // Signed by the wrong key: B4 will fail in S1, routing the
  // synthetic-invalid-tx marker through S2-S4 instead.
  let signature = other.sign(&crate::crypto::canonical_bytes(&body).unwrap());
  let block = Block {
    id: id.into(),
    signature,
    block: body,
  };
  store
    .write_block(block.clone(), crate::store::Durability::Soft)
    .await
    .unwrap();

  let engine = VoteEngine::new(
    Arc::clone(&store),
    kp.clone(),
    vec![kp.public()],
    Default::default(),
    Arc::new(NoopSink),
  );
  let mut votes = engine.run().await.unwrap();

  let vote = tokio::time::timeout(std::time::Duration::from_secs(5), votes.next())
    .await
    .expect("pipeline should emit a vote before the timeout")
    .expect("stream should not end");

  assert_eq!(vote.vote.voting_for_block, block.id);
  assert!(!vote.vote.is_block_valid);
}

#[tokio::test]
async fn e4_create_then_transfer_is_recorded_as_spent() {
  use futures::StreamExt;

  let kp = keypair();
  let store = genesis_store(&kp, vec![kp.public()]);
  store.heartbeat(kp.public(), 1000).await.unwrap();

  let create = create_tx_with_condition("asset-e4", &kp);
  let backlog = BacklogManager::new(Arc::clone(&store), vec![kp.public()]);
  backlog.submit(create.clone(), 30, 1000).await.unwrap();

  let builder = BlockBuilder::new(Arc::clone(&store), kp.clone(), vec![kp.public()]);
  let create_block = builder.build_block(10, 1500).await.unwrap().unwrap();

  let engine = VoteEngine::new(
    Arc::clone(&store),
    kp.clone(),
    vec![kp.public()],
    Default::default(),
    Arc::new(NoopSink),
  );
  let mut votes = engine.run().await.unwrap();
  let vote = tokio::time::timeout(std::time::Duration::from_secs(5), votes.next())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(vote.vote.voting_for_block, create_block.id);
  assert!(vote.vote.is_block_valid);
  drop(votes);

  let transfer = transfer_tx(&create, &kp, "asset-e4");
  backlog.submit(transfer.clone(), 30, 2000).await.unwrap();
  let transfer_block = builder.build_block(10, 2500).await.unwrap().unwrap();

  let engine = VoteEngine::new(
    Arc::clone(&store),
    kp.clone(),
    vec![kp.public()],
    Default::default(),
    Arc::new(NoopSink),
  );
  let mut votes = engine.run().await.unwrap();
  let vote = tokio::time::timeout(std::time::Duration::from_secs(5), votes.next())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(vote.vote.voting_for_block, transfer_block.id);
  assert!(vote.vote.is_block_valid);

  let spent = store.get_spent(&create.id, 0).await.unwrap();
  assert_eq!(spent.map(|t| t.id), Some(transfer.id));
}

#[tokio::test]
async fn e5_double_spend_is_rejected_by_validation() {
  let kp = keypair();
  let store = genesis_store(&kp, vec![kp.public()]);

  let create = create_tx_with_condition("asset-e5", &kp);

  // Commit the CREATE directly as its own valid block so its output is
  // spendable.
  let body = crate::model::BlockBody {
    timestamp: 1000,
    transactions: vec![create.clone()],
    node_pubkey: kp.public(),
    voters: vec![kp.public()],
  };
  let id = crate::crypto::canonical_hash_hex(&body).unwrap();
  let signature = kp.sign(&crate::crypto::canonical_bytes(&body).unwrap());
  let create_block = Block {
    id: id.into(),
    signature,
    block: body,
  };
  store
    .write_block(create_block.clone(), crate::store::Durability::Soft)
    .await
    .unwrap();
  let fake_vote = crate::model::Vote::sign(
    &kp,
    create_block.id.clone(),
    store.get_genesis().await.unwrap().id,
    true,
    None,
    1000,
  )
  .unwrap();
  store.write_vote(fake_vote).await.unwrap();

  let first_transfer = transfer_tx(&create, &kp, "asset-e5");
  assert!(validate::validate_transaction(&first_transfer, &*store)
    .await
    .is_ok());

  // Record the first transfer as having already spent the output, then
  // check a second, different transfer against the same input.
  let body2 = crate::model::BlockBody {
    timestamp: 2000,
    transactions: vec![first_transfer.clone()],
    node_pubkey: kp.public(),
    voters: vec![kp.public()],
  };
  let id2 = crate::crypto::canonical_hash_hex(&body2).unwrap();
  let signature2 = kp.sign(&crate::crypto::canonical_bytes(&body2).unwrap());
  store
    .write_block(
      Block {
        id: id2.into(),
        signature: signature2,
        block: body2,
      },
      crate::store::Durability::Soft,
    )
    .await
    .unwrap();

  let second_transfer = transfer_tx(&create, &kp, "asset-e5-second");

  let err = validate::validate_transaction(&second_transfer, &*store)
    .await
    .unwrap_err();
  assert_eq!(
    err,
    crate::errors::ValidationError::DoubleSpend(create.id.clone(), 0)
  );
}

#[tokio::test]
async fn e6_asset_id_mismatch_is_rejected() {
  let kp = keypair();
  let store = genesis_store(&kp, vec![kp.public()]);

  let create = create_tx_with_condition("asset-e6", &kp);
  let body = crate::model::BlockBody {
    timestamp: 1000,
    transactions: vec![create.clone()],
    node_pubkey: kp.public(),
    voters: vec![kp.public()],
  };
  let id = crate::crypto::canonical_hash_hex(&body).unwrap();
  let signature = kp.sign(&crate::crypto::canonical_bytes(&body).unwrap());
  store
    .write_block(
      Block {
        id: id.into(),
        signature,
        block: body,
      },
      crate::store::Durability::Soft,
    )
    .await
    .unwrap();
  let genesis_id = store.get_genesis().await.unwrap().id;
  store
    .write_vote(
      crate::model::Vote::sign(&kp, create.id.clone(), genesis_id, true, None, 1000).unwrap(),
    )
    .await
    .ok();

  let mismatched = transfer_tx(&create, &kp, "some-other-asset");

  let err = validate::validate_transaction(&mismatched, &*store)
    .await
    .unwrap_err();
  assert_eq!(err, crate::errors::ValidationError::AssetIdMismatch);
}

#[tokio::test]
async fn e3_stale_backlog_entry_is_reassigned_to_a_live_node() {
  let assignee = keypair();
  let rescuer = keypair();
  let store = genesis_store(&assignee, vec![assignee.public(), rescuer.public()]);

  store.heartbeat(rescuer.public(), 1000).await.unwrap();
  store.write_backlog(create_tx("asset-e3"), assignee.public(), 0).await.unwrap();

  let manager = BacklogManager::new(
    Arc::clone(&store),
    vec![assignee.public(), rescuer.public()],
  );
  let reassigned = manager.reassign_stale(30, 15, 1000).await.unwrap();
  assert_eq!(reassigned, 1);

  let drained = store.drain_backlog_for(&rescuer.public(), 10).await.unwrap();
  assert_eq!(drained.len(), 1);
  assert_eq!(drained[0].tx.body.asset.data_id, "asset-e3");
}

#[tokio::test]
async fn e7_restart_with_three_unvoted_blocks_chains_previous_block_links() {
  use futures::StreamExt;

  let kp = keypair();
  let store = genesis_store(&kp, vec![kp.public()]);
  store.heartbeat(kp.public(), 1000).await.unwrap();
  let genesis_id = store.get_genesis().await.unwrap().id;

  let backlog = BacklogManager::new(Arc::clone(&store), vec![kp.public()]);
  let builder = BlockBuilder::new(Arc::clone(&store), kp.clone(), vec![kp.public()]);

  let mut block_ids = Vec::new();
  for (i, ts) in [(1, 1000), (2, 2000), (3, 3000)] {
    backlog
      .submit(create_tx(&format!("asset-e7-{i}")), 30, ts)
      .await
      .unwrap();
    let block = builder.build_block(10, ts + 100).await.unwrap().unwrap();
    block_ids.push(block.id);
  }

  let engine = VoteEngine::new(
    Arc::clone(&store),
    kp.clone(),
    vec![kp.public()],
    single_worker_config(),
    Arc::new(NoopSink),
  );
  let mut votes = engine.run().await.unwrap();

  let mut seen = Vec::new();
  for _ in 0..3 {
    let vote = tokio::time::timeout(std::time::Duration::from_secs(5), votes.next())
      .await
      .expect("pipeline should emit a vote before the timeout")
      .expect("stream should not end");
    assert!(vote.vote.is_block_valid);
    seen.push(vote.vote);
  }

  seen.sort_by_key(|v| block_ids.iter().position(|id| id == &v.voting_for_block));
  assert_eq!(seen[0].previous_block, genesis_id);
  assert_eq!(seen[1].previous_block, seen[0].voting_for_block);
  assert_eq!(seen[2].previous_block, seen[1].voting_for_block);
}

#[tokio::test]
async fn e8_a_block_already_voted_on_produces_no_second_vote() {
  use futures::StreamExt;

  let kp = keypair();
  let store = genesis_store(&kp, vec![kp.public()]);
  store.heartbeat(kp.public(), 1000).await.unwrap();

  let backlog = BacklogManager::new(Arc::clone(&store), vec![kp.public()]);
  backlog.submit(create_tx("asset-e8"), 30, 1000).await.unwrap();
  let builder = BlockBuilder::new(Arc::clone(&store), kp.clone(), vec![kp.public()]);
  let block = builder.build_block(10, 1500).await.unwrap().unwrap();

  let engine = VoteEngine::new(
    Arc::clone(&store),
    kp.clone(),
    vec![kp.public()],
    Default::default(),
    Arc::new(NoopSink),
  );
  let mut votes = engine.run().await.unwrap();
  let vote = tokio::time::timeout(std::time::Duration::from_secs(5), votes.next())
    .await
    .unwrap()
    .unwrap();
  assert_eq!(vote.vote.voting_for_block, block.id);
  drop(votes);

  assert_eq!(store.get_votes_for_block(&block.id).await.unwrap().len(), 1);

  // A fresh engine run for the same voter must see the block as already
  // voted (via get_unvoted_blocks) and emit nothing for it.
  let engine = VoteEngine::new(
    Arc::clone(&store),
    kp.clone(),
    vec![kp.public()],
    Default::default(),
    Arc::new(NoopSink),
  );
  let mut votes = engine.run().await.unwrap();
  let second = tokio::time::timeout(std::time::Duration::from_millis(300), votes.next()).await;
  assert!(second.is_err(), "expected no further vote, got {second:?}");
  assert_eq!(store.get_votes_for_block(&block.id).await.unwrap().len(), 1);
}
