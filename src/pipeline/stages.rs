//! Generic worker-pool fan-out helpers used to assemble the five pipeline
//! stages. Grounded on `src/consumer.rs`'s channel + `tokio::spawn` +
//! fan-out pattern, generalized from "one task per consumer per item" to
//! "N persistent worker tasks sharing one input channel".

use {
  std::{future::Future, sync::Arc},
  tokio::sync::{mpsc, Mutex},
};

/// Spawns `workers` tasks, each pulling from the shared `rx` and pushing
/// at most one output per input into the returned channel.
pub fn spawn_stage<In, Out, F, Fut>(
  workers: usize,
  rx: mpsc::Receiver<In>,
  capacity: usize,
  f: F,
) -> mpsc::Receiver<Out>
where
  In: Send + 'static,
  Out: Send + 'static,
  F: Fn(In) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Option<Out>> + Send,
{
  let (tx, out_rx) = mpsc::channel(capacity);
  let rx = Arc::new(Mutex::new(rx));
  let f = Arc::new(f);
  for _ in 0..workers.max(1) {
    let rx = Arc::clone(&rx);
    let tx = tx.clone();
    let f = Arc::clone(&f);
    tokio::spawn(async move {
      loop {
        let item = { rx.lock().await.recv().await };
        match item {
          Some(input) => match f(input).await {
            Some(output) => {
              if tx.send(output).await.is_err() {
                break;
              }
            }
            None => continue,
          },
          None => break,
        }
      }
    });
  }
  out_rx
}

/// Like [`spawn_stage`] but each input may fan out into zero or more
/// outputs -- used for S2's block-to-transactions ungrouping.
pub fn spawn_flatmap_stage<In, Out, F, Fut>(
  workers: usize,
  rx: mpsc::Receiver<In>,
  capacity: usize,
  f: F,
) -> mpsc::Receiver<Out>
where
  In: Send + 'static,
  Out: Send + 'static,
  F: Fn(In) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Vec<Out>> + Send,
{
  let (tx, out_rx) = mpsc::channel(capacity);
  let rx = Arc::new(Mutex::new(rx));
  let f = Arc::new(f);
  for _ in 0..workers.max(1) {
    let rx = Arc::clone(&rx);
    let tx = tx.clone();
    let f = Arc::clone(&f);
    tokio::spawn(async move {
      loop {
        let item = { rx.lock().await.recv().await };
        match item {
          Some(input) => {
            for output in f(input).await {
              if tx.send(output).await.is_err() {
                return;
              }
            }
          }
          None => break,
        }
      }
    });
  }
  out_rx
}
