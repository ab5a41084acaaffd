mod backlog;
mod chain;
mod cli;
mod config;
mod crypto;
mod errors;
mod metrics;
mod model;
mod pipeline;
mod store;
mod validate;

use {
  crate::{
    backlog::BacklogManager,
    cli::CliOpts,
    config::Config,
    crypto::{Keypair, Pubkey},
    metrics::{MetricsSink, TracingSink},
    model::build_genesis,
    pipeline::VoteEngine,
    store::SledStore,
  },
  clap::StructOpt,
  futures::StreamExt,
  std::sync::Arc,
  tracing::{info, Level},
  tracing_subscriber::{
    filter::filter_fn,
    prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
    Layer,
  },
};

fn resolve_keypair(cfg: &config::KeypairConfig) -> anyhow::Result<Keypair> {
  if cfg.private.is_empty() {
    let kp = Keypair::generate(&mut rand::thread_rng());
    tracing::warn!(
      public = %kp.public(),
      "no keypair configured, generated an ephemeral one for this run"
    );
    Ok(kp)
  } else {
    Ok(cfg.private.parse()?)
  }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
  let opts = CliOpts::parse();

  let loglevel = match opts.verbose {
    1 => Level::DEBUG,
    2 => Level::TRACE,
    _ => Level::INFO,
  };
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer().with_filter(filter_fn(move |metadata| metadata.level() <= &loglevel)),
    )
    .init();

  info!("starting federated ledger node");
  info!(version = env!("CARGO_PKG_VERSION"));

  let config = Config::load(opts.config.as_deref())?;
  let keypair = resolve_keypair(&config.keypair)?;

  let mut validators: Vec<Pubkey> = config
    .keyring
    .iter()
    .filter_map(|s| s.parse().ok())
    .collect();
  if !validators.contains(&keypair.public()) {
    validators.push(keypair.public());
  }
  validators.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

  std::fs::create_dir_all(&opts.data_dir)?;
  let genesis = build_genesis(&keypair, validators.clone(), "federated-ledger")?;
  info!(block_id = %genesis.id, "genesis block");

  let store = Arc::new(SledStore::open(&opts.data_dir, genesis)?);
  let metrics: Arc<dyn MetricsSink> = Arc::new(TracingSink);

  let liveness_threshold_s = config.liveness_threshold.as_secs() as i64;
  let reassign_delay_s = config.backlog_reassign_delay.as_secs() as i64;

  store.heartbeat(keypair.public(), chrono::Utc::now().timestamp()).await?;

  {
    let store = Arc::clone(&store);
    let validators = validators.clone();
    tokio::spawn(async move {
      let manager = BacklogManager::new(store, validators);
      let mut tick = tokio::time::interval(std::time::Duration::from_secs(5));
      loop {
        tick.tick().await;
        let now = chrono::Utc::now().timestamp();
        if let Err(err) = manager
          .reassign_stale(reassign_delay_s, liveness_threshold_s, now)
          .await
        {
          tracing::warn!(%err, "backlog reassignment scan failed");
        }
      }
    });
  }

  let engine = VoteEngine::new(
    Arc::clone(&store),
    keypair.clone(),
    validators,
    config.argument_config.clone(),
    metrics,
  );
  let mut votes = engine.run().await?;

  tokio::select! {
    _ = async {
      while let Some(vote) = votes.next().await {
        info!(
          block = %vote.vote.voting_for_block,
          valid = vote.vote.is_block_valid,
          "cast vote"
        );
      }
    } => {}
    _ = tokio::signal::ctrl_c() => {
      info!("shutting down");
    }
  }

  Ok(())
}
