//! Writes a validated payload through a [`MetricsStore`].

use std::sync::Arc;

use tracing::{debug, info};

use epi_core::store::MetricsStore;

use crate::{
  Error, Result,
  payload::{self, Payload},
};

/// Summary of one ingested payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
  pub metric:   String,
  pub received: usize,
  /// Rows actually inserted; duplicates of existing rows are discarded.
  pub inserted: usize,
}

pub struct Ingester<S> {
  store:        Arc<S>,
  auth_enabled: bool,
}

impl<S: MetricsStore> Ingester<S> {
  pub fn new(store: Arc<S>, auth_enabled: bool) -> Self { Self { store, auth_enabled } }

  /// Validate `bytes` and write every row it carries in one transaction.
  ///
  /// Validation failures come back as [`Error::Invalid`]; store failures as
  /// [`Error::Store`].
  pub async fn ingest(&self, bytes: &[u8]) -> Result<IngestReport> {
    let payload = payload::parse(bytes, self.auth_enabled)?;
    debug!(path = %payload.path(), rows = payload.len(), "payload validated");
    self.write(&payload).await
  }

  pub async fn write(&self, payload: &Payload) -> Result<IngestReport> {
    let inserted = match payload {
      Payload::Headline { path, rows } => self.store.write_headlines(path, rows).await,
      Payload::TimeSeries { path, rows } => self.store.write_time_series(path, rows).await,
    }
    .map_err(|e| Error::Store(Box::new(e)))?;

    let report = IngestReport {
      metric: payload.path().metric.clone(),
      received: payload.len(),
      inserted,
    };
    info!(metric = %report.metric, received = report.received, inserted, "payload ingested");
    Ok(report)
  }
}
