//! Start-up and auth errors for the server process.

use axum::{
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use epi_core::app_mode::AppMode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("{0} mode needs AUDIT_USERNAME and AUDIT_PASSWORD_HASH")]
  MissingAuditCredentials(AppMode),
  #[error("cache error: {0}")]
  Cache(#[from] epi_api::ApiError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        res
          .headers_mut()
          .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic realm=\"audit\""));
        res
      }
      other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
  }
}
