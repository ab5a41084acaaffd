//! Vote engine (C5): the five-stage concurrent pipeline described in
//! SPEC_FULL.md §4.5. The exact stage semantics (the `has_previous_vote`
//! shortcut, the synthetic-invalid-tx short-circuit, the
//! counter/validity aggregator maps) are a direct port of
//! `bigchaindb/pipelines/vote.py`'s `Vote` class.

mod stages;

use {
  crate::{
    chain::last_voted_block,
    config::ArgumentConfig,
    crypto::{Keypair, Pubkey},
    metrics::MetricsSink,
    model::{Asset, Block, BlockId, Operation, Transaction, TransactionBody, TxId, Vote},
    store::RecordStore,
    validate,
  },
  std::{sync::Arc, time::Instant},
  stages::{spawn_flatmap_stage, spawn_stage},
  tokio::sync::mpsc,
  tokio_stream::wrappers::ReceiverStream,
};

struct TxBatch {
  block_id: BlockId,
  txs: Vec<Transaction>,
  num_tx: usize,
  begin: Instant,
}

struct TxJob {
  tx: Transaction,
  block_id: BlockId,
  num_tx: usize,
  begin: Instant,
}

struct TxResult {
  valid: bool,
  block_id: BlockId,
  num_tx: usize,
  begin: Instant,
}

struct VoteDraft {
  voting_for_block: BlockId,
  previous_block: BlockId,
  is_block_valid: bool,
  begin: Instant,
}

/// A transaction that is guaranteed to fail validation (its declared id
/// never matches its body's hash). Used by S1 so that a structurally
/// invalid block still flows through S2-S4 unchanged and produces
/// exactly one *invalid* vote, rather than branching the pipeline shape.
fn synthetic_invalid_tx() -> Transaction {
  let body = TransactionBody {
    version: 1,
    operation: Operation::Create,
    fulfillments: vec![],
    conditions: vec![],
    asset: Asset {
      data_id: "synthetic-invalid-marker".into(),
      data: serde_json::Value::Null,
      divisible: false,
      updatable: false,
      refillable: false,
    },
    metadata: None,
    contract: None,
    relation: None,
  };
  Transaction {
    id: TxId::new("0000000000000000000000000000000000000000000000000000000000000000"),
    body,
  }
}

/// Assembles and runs the S1-S5 pipeline for a single validator. Returns
/// a `Stream` of emitted votes; the caller is also responsible for
/// forwarding each to storage's confirmation bookkeeping if needed, but
/// `VoteEngine` itself already persists every vote via S5 before
/// yielding it.
pub struct VoteEngine<S: RecordStore> {
  store: Arc<S>,
  keypair: Keypair,
  validators: Vec<Pubkey>,
  config: ArgumentConfig,
  metrics: Arc<dyn MetricsSink>,
}

impl<S: RecordStore + 'static> VoteEngine<S> {
  pub fn new(
    store: Arc<S>,
    keypair: Keypair,
    validators: Vec<Pubkey>,
    config: ArgumentConfig,
    metrics: Arc<dyn MetricsSink>,
  ) -> Self {
    Self {
      store,
      keypair,
      validators,
      config,
      metrics,
    }
  }

  pub async fn run(self) -> Result<ReceiverStream<Vote>, crate::errors::StoreError> {
    let voter = self.keypair.public();

    let prefeed_blocks = self.store.get_unvoted_blocks(&voter).await?;
    let prefeed = prefeed_blocks
      .into_iter()
      .filter_map(|b| {
        serde_json::to_value(&b).ok().map(|payload| crate::store::ChangeEvent {
          table: crate::store::Table::Chain,
          kind: crate::store::ChangeKind::Insert,
          payload,
        })
      })
      .collect();

    let change_stream = self
      .store
      .change_feed(crate::store::Table::Chain, crate::store::ChangeKind::Insert, prefeed);

    let cap = self.config.pipe_maxsize.max(1);
    let (block_tx, block_rx) = mpsc::channel::<Block>(cap);
    tokio::spawn(async move {
      use futures::StreamExt;
      let mut stream = change_stream;
      while let Some(event) = stream.next().await {
        if let Ok(block) = serde_json::from_value::<Block>(event.payload) {
          if block_tx.send(block).await.is_err() {
            break;
          }
        }
      }
    });

    // S1: validate_block
    let store1 = Arc::clone(&self.store);
    let validators1 = self.validators.clone();
    let metrics1 = Arc::clone(&self.metrics);
    let rx2 = spawn_stage(
      self.config.vote_pipeline.validate_processes_num,
      block_rx,
      cap,
      move |block: Block| {
        let store = Arc::clone(&store1);
        let validators = validators1.clone();
        let metrics = Arc::clone(&metrics1);
        let voter = voter;
        async move {
          let begin = Instant::now();

          let already_voted = !store
            .get_votes_for_block_and_voter(&block.id, &voter)
            .await
            .unwrap_or_default()
            .is_empty();
          if already_voted {
            return None;
          }

          let validation_result = {
            let _timer = crate::metrics::timer(Arc::clone(&metrics), "validate_block");
            validate::validate_block(&block, &validators)
          };

          match validation_result {
            Ok(()) => Some(TxBatch {
              block_id: block.id,
              num_tx: block.block.transactions.len(),
              txs: block.block.transactions,
              begin,
            }),
            Err(_) => Some(TxBatch {
              block_id: block.id,
              num_tx: 1,
              txs: vec![synthetic_invalid_tx()],
              begin,
            }),
          }
        }
      },
    );

    // S2: ungroup
    let rx3 = spawn_flatmap_stage(
      self.config.vote_pipeline.ungroup_processes_num,
      rx2,
      cap,
      |batch: TxBatch| async move {
        let TxBatch {
          block_id,
          txs,
          num_tx,
          begin,
        } = batch;
        txs
          .into_iter()
          .map(|tx| TxJob {
            tx,
            block_id: block_id.clone(),
            num_tx,
            begin,
          })
          .collect::<Vec<_>>()
      },
    );

    // S3: validate_tx
    let store3 = Arc::clone(&self.store);
    let s3_workers = ((num_cpus_estimate() as f64 * self.config.vote_pipeline.fraction_of_cores)
      as usize)
      .max(1);
    let rx4 = spawn_stage(s3_workers, rx3, cap, move |job: TxJob| {
      let store = Arc::clone(&store3);
      async move {
        let valid = validate::validate_transaction(&job.tx, store.as_ref())
          .await
          .is_ok();
        Some(TxResult {
          valid,
          block_id: job.block_id,
          num_tx: job.num_tx,
          begin: job.begin,
        })
      }
    });

    // S4: aggregate (single worker, owns its state directly -- no locks)
    let (vote_tx, vote_rx) = mpsc::channel::<VoteDraft>(cap);
    let genesis_id = last_voted_block(self.store.as_ref(), &voter)
      .await
      .unwrap_or_else(|_| BlockId::new("genesis"));
    tokio::spawn(aggregate(rx4, vote_tx, genesis_id));

    // S5: write_vote (single worker)
    let (out_tx, out_rx) = mpsc::channel::<Vote>(cap);
    let keypair = self.keypair.clone();
    let store5 = Arc::clone(&self.store);
    let metrics = Arc::clone(&self.metrics);
    tokio::spawn(write_votes(vote_rx, out_tx, keypair, store5, metrics));

    Ok(ReceiverStream::new(out_rx))
  }
}

async fn aggregate(
  mut rx: mpsc::Receiver<TxResult>,
  tx: mpsc::Sender<VoteDraft>,
  mut last_voted_id: BlockId,
) {
  use std::collections::HashMap;
  let mut counter: HashMap<BlockId, usize> = HashMap::new();
  let mut validity: HashMap<BlockId, bool> = HashMap::new();
  let mut begin_times: HashMap<BlockId, Instant> = HashMap::new();

  while let Some(result) = rx.recv().await {
    let count = counter.entry(result.block_id.clone()).or_insert(0);
    *count += 1;
    let valid = validity.entry(result.block_id.clone()).or_insert(true);
    *valid &= result.valid;
    begin_times.entry(result.block_id.clone()).or_insert(result.begin);

    if *count == result.num_tx {
      let is_block_valid = validity.remove(&result.block_id).unwrap_or(false);
      counter.remove(&result.block_id);
      let begin = begin_times.remove(&result.block_id).unwrap_or(result.begin);

      let draft = VoteDraft {
        voting_for_block: result.block_id.clone(),
        previous_block: last_voted_id.clone(),
        is_block_valid,
        begin,
      };
      last_voted_id = result.block_id;

      if tx.send(draft).await.is_err() {
        break;
      }
    }
  }
}

async fn write_votes<S: RecordStore>(
  mut rx: mpsc::Receiver<VoteDraft>,
  tx: mpsc::Sender<Vote>,
  keypair: Keypair,
  store: Arc<S>,
  metrics: Arc<dyn MetricsSink>,
) {
  while let Some(draft) = rx.recv().await {
    let _timer = crate::metrics::timer(Arc::clone(&metrics), "write_vote");
    let now = chrono::Utc::now().timestamp();
    let invalid_reason = if draft.is_block_valid {
      None
    } else {
      Some("block or one of its transactions failed validation".to_string())
    };

    let vote = match Vote::sign(
      &keypair,
      draft.voting_for_block,
      draft.previous_block,
      draft.is_block_valid,
      invalid_reason,
      now,
    ) {
      Ok(v) => v,
      Err(_) => continue,
    };

    if store.write_vote(vote.clone()).await.is_err() {
      continue;
    }

    metrics.gauge("vote_time", draft.begin.elapsed().as_secs_f64());

    if tx.send(vote).await.is_err() {
      break;
    }
  }
}

fn num_cpus_estimate() -> usize {
  std::thread::available_parallelism()
    .map(|n| n.get())
    .unwrap_or(1)
}
