//! Error types for `epi-ingest`.
//!
//! [`Error::Invalid`] and [`Error::InvalidKey`] are permanent: the message
//! can never succeed and is acknowledged as failed. Every other variant is
//! transient and leaves the queue message in place for redelivery.

use thiserror::Error;

/// Reasons an inbound payload is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
  #[error("payload is not valid JSON: {0}")]
  Malformed(String),

  #[error("`{field}` field is missing from the inbound source data")]
  MissingField { field: String },

  #[error("`{field}` has an unexpected value: {reason}")]
  InvalidField { field: String, reason: String },

  #[error("The given age parameter does not conform to an expected structure.")]
  InvalidAge,

  #[error("`geography_code` must be between 3 and 9 characters long")]
  InvalidGeographyCode,

  #[error("`{metric_group}` is not a recognised metric group")]
  UnknownMetricGroup { metric_group: String },

  #[error("`{metric}` does not belong to the `{metric_group}` metric group")]
  MetricNotInGroup { metric: String, metric_group: String },

  #[error("Inbound data with `is_public=False` cannot be ingested when `AUTH_ENABLED` is false")]
  NonPublicDataSentToPublicIngestion,
}

impl ValidationError {
  pub(crate) fn missing(field: &str) -> Self { Self::MissingField { field: field.to_owned() } }

  pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
    Self::InvalidField { field: field.to_owned(), reason: reason.into() }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid payload: {0}")]
  Invalid(#[from] ValidationError),

  #[error("object `{0}` not found")]
  ObjectNotFound(String),

  #[error("object key `{0}` is not allowed")]
  InvalidKey(String),

  #[error("object store error for `{key}`: {source}")]
  Storage {
    key:    String,
    #[source]
    source: std::io::Error,
  },

  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Whether retrying can never succeed.
  pub fn is_permanent(&self) -> bool { matches!(self, Error::Invalid(_) | Error::InvalidKey(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
