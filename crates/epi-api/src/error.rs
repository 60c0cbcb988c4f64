//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Validation and missing-data failures are the caller's problem and map to
//! `400`; everything else is a `500`. Both carry `{"error_message": ...}`.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Core(#[from] epi_core::Error),

  #[error(transparent)]
  Chart(#[from] epi_charts::Error),

  #[error("{0}")]
  BadRequest(String),

  #[error("Cache entry not found for the given request")]
  CacheEntryNotFound,

  #[error("cache error: {0}")]
  Cache(#[from] redis::RedisError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl ApiError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self { ApiError::Store(Box::new(e)) }

  pub fn status(&self) -> StatusCode {
    let client = match self {
      ApiError::Core(e) => e.is_client_error(),
      ApiError::Chart(e) => e.is_client_error(),
      ApiError::BadRequest(_) => true,
      ApiError::CacheEntryNotFound
      | ApiError::Cache(_)
      | ApiError::Store(_)
      | ApiError::Serialization(_) => false,
    };
    if client { StatusCode::BAD_REQUEST } else { StatusCode::INTERNAL_SERVER_ERROR }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { ApiError::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error_message": self.to_string() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validation_is_a_bad_request() {
    let err = ApiError::from(epi_core::Error::DataNotFoundForAnyPlot);
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(err.to_string(), "No data could be found for any of the requested plots");
  }

  #[test]
  fn infrastructure_is_a_server_error() {
    let err = ApiError::store(std::io::Error::other("disk on fire"));
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(ApiError::CacheEntryNotFound.status(), StatusCode::INTERNAL_SERVER_ERROR);
  }
}
