//! The queue → object store → metrics store loop.

use std::{future::Future, sync::Arc, time::Duration};

use tracing::{error, info, warn};

use epi_core::store::MetricsStore;

use crate::{
  Error, Result,
  ingester::Ingester,
  queue::{Message, MessageQueue},
  storage::{ObjectStore, failed_key, processed_key},
};

/// Pause after a failed poll before trying again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
  /// Messages per poll, 1..=10.
  pub max_messages: usize,
  /// Long-poll wait.
  pub wait:         Duration,
  /// How long a received message stays hidden from other workers.
  pub visibility:   Duration,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      max_messages: 10,
      wait:         Duration::from_secs(20),
      visibility:   Duration::from_secs(60),
    }
  }
}

/// What happened to a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// Ingested and moved to `processed/`.
  Processed,
  /// Rejected. The object is moved to `failed/` when its key is usable.
  Failed,
  /// The inbound object no longer exists; an earlier delivery finished it.
  Missing,
  /// The message did not name an inbound key.
  Unreadable,
}

pub struct Worker<S, O, Q> {
  ingester: Ingester<S>,
  objects:  Arc<O>,
  queue:    Arc<Q>,
  config:   WorkerConfig,
}

impl<S, O, Q> Worker<S, O, Q>
where
  S: MetricsStore,
  O: ObjectStore,
  Q: MessageQueue,
{
  pub fn new(ingester: Ingester<S>, objects: Arc<O>, queue: Arc<Q>, config: WorkerConfig) -> Self {
    let max_messages = config.max_messages.clamp(1, 10);
    Self { ingester, objects, queue, config: WorkerConfig { max_messages, ..config } }
  }

  /// Poll until `shutdown` resolves. A batch interrupted by shutdown leaves
  /// its undeleted messages to be redelivered.
  pub async fn run(&self, shutdown: impl Future<Output = ()>) {
    tokio::pin!(shutdown);
    info!(config = ?self.config, "ingestion worker started");
    loop {
      tokio::select! {
        () = &mut shutdown => {
          info!("ingestion worker stopping");
          return;
        }
        result = self.run_once() => {
          if let Err(e) = result {
            error!(error = %e, "queue poll failed");
            tokio::time::sleep(ERROR_BACKOFF).await;
          }
        }
      }
    }
  }

  /// Receive and handle one batch. Returns the outcome of every message that
  /// was acknowledged.
  pub async fn run_once(&self) -> Result<Vec<Outcome>> {
    let WorkerConfig { max_messages, wait, visibility } = self.config;
    let messages = self.queue.receive(max_messages, wait, visibility).await?;

    let mut outcomes = Vec::with_capacity(messages.len());
    for message in messages {
      match self.handle(&message).await {
        Ok(outcome) => {
          self.queue.delete(&message.receipt).await?;
          outcomes.push(outcome);
        }
        Err(e) => {
          // Leave the message for redelivery once its visibility expires.
          warn!(error = %e, body = %message.body, "message will be retried");
        }
      }
    }
    Ok(outcomes)
  }

  async fn handle(&self, message: &Message) -> Result<Outcome> {
    let Some(key) = message.inbound_key() else {
      warn!(body = %message.body, "message does not reference an inbound key");
      return Ok(Outcome::Unreadable);
    };

    let bytes = match self.objects.get(&key).await {
      Ok(bytes) => bytes,
      Err(Error::ObjectNotFound(_)) => {
        info!(%key, "inbound object already handled");
        return Ok(Outcome::Missing);
      }
      // Nothing to move: the key itself is unusable.
      Err(e) if e.is_permanent() => {
        warn!(%key, error = %e, "message rejected");
        return Ok(Outcome::Failed);
      }
      Err(e) => return Err(e),
    };

    match self.ingester.ingest(&bytes).await {
      Ok(_) => {
        self.relocate(&key, &processed_key(&key)).await?;
        Ok(Outcome::Processed)
      }
      Err(e) if e.is_permanent() => {
        warn!(%key, error = %e, "payload rejected");
        self.relocate(&key, &failed_key(&key)).await?;
        Ok(Outcome::Failed)
      }
      Err(e) => Err(e),
    }
  }

  async fn relocate(&self, from: &str, to: &str) -> Result<()> {
    self.objects.copy(from, to).await?;
    self.objects.delete(from).await
  }
}
