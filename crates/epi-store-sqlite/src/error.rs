//! Error type for `epi-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] epi_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("permission not found: {0}")]
  PermissionNotFound(String),

  #[error("group not found: {0}")]
  GroupNotFound(i64),
}

impl Error {
  /// Whether the error was caused by the caller's input rather than the
  /// database.
  pub fn is_client_error(&self) -> bool {
    match self {
      Error::Core(e) => e.is_client_error(),
      Error::PermissionNotFound(_) | Error::GroupNotFound(_) => true,
      Error::Database(_) | Error::DateParse(_) => false,
    }
  }
}

impl From<epi_core::rbac::PermissionError> for Error {
  fn from(e: epi_core::rbac::PermissionError) -> Self { Error::Core(e.into()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
