//! Request extractors shared by the handlers.

use std::convert::Infallible;

use axum::{
  extract::{FromRequest, FromRequestParts, Path, Query},
  http::{HeaderMap, request::Parts},
};
use epi_core::{rbac::RbacPermission, store::MetricsStore};
use tracing::debug;

use crate::{ApiState, error::ApiError};

pub const GROUP_ID_HEADER: &str = "X-GroupId";
pub const CACHE_FORCE_REFRESH_HEADER: &str = "Cache-Force-Refresh";
pub const CACHE_CHECK_HEADER: &str = "Cache-Check";

// ─── Rejections as ApiError ──────────────────────────────────────────────────

/// `axum::Json`, rejecting with a `400 {"error_message"}` body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

// ─── Permissions ─────────────────────────────────────────────────────────────

/// The permission set of the calling group.
///
/// Empty unless auth is enabled and the request names a group in
/// `X-GroupId`. An empty set sees public rows only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPermissions {
  pub group_id:    Option<i64>,
  pub permissions: Vec<RbacPermission>,
}

fn group_id(headers: &HeaderMap) -> Option<i64> {
  let value = headers.get(GROUP_ID_HEADER)?.to_str().ok()?;
  match value.trim().parse() {
    Ok(id) => Some(id),
    Err(_) => {
      debug!(value, "ignoring unparseable group id");
      None
    }
  }
}

impl<S> FromRequestParts<ApiState<S>> for RequestPermissions
where
  S: MetricsStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &ApiState<S>) -> Result<Self, Self::Rejection> {
    if !state.settings.auth_enabled {
      return Ok(Self::default());
    }
    let Some(group_id) = group_id(&parts.headers) else {
      return Ok(Self::default());
    };
    let permissions = state.store.group_permissions(group_id).await.map_err(ApiError::store)?;
    Ok(Self { group_id: Some(group_id), permissions })
  }
}

// ─── Cache directives ────────────────────────────────────────────────────────

/// How the caller wants the response cache treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDirectives {
  /// Recompute and overwrite whatever is cached.
  pub force_refresh: bool,
  /// Only answer from the cache; a miss is an error.
  pub check_only:    bool,
}

fn flag(headers: &HeaderMap, name: &str) -> bool {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .is_some_and(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "" | "false" | "0"))
}

impl<S: Send + Sync> FromRequestParts<S> for CacheDirectives {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    Ok(Self {
      force_refresh: flag(&parts.headers, CACHE_FORCE_REFRESH_HEADER),
      check_only:    flag(&parts.headers, CACHE_CHECK_HEADER),
    })
  }
}

#[cfg(test)]
mod tests {
  use axum::http::HeaderValue;

  use super::*;

  #[test]
  fn header_flags() {
    let mut headers = HeaderMap::new();
    assert!(!flag(&headers, CACHE_CHECK_HEADER));
    headers.insert(CACHE_CHECK_HEADER, HeaderValue::from_static("True"));
    assert!(flag(&headers, CACHE_CHECK_HEADER));
    headers.insert(CACHE_CHECK_HEADER, HeaderValue::from_static("false"));
    assert!(!flag(&headers, CACHE_CHECK_HEADER));
  }

  #[test]
  fn group_id_must_be_numeric() {
    let mut headers = HeaderMap::new();
    headers.insert(GROUP_ID_HEADER, HeaderValue::from_static("7"));
    assert_eq!(group_id(&headers), Some(7));
    headers.insert(GROUP_ID_HEADER, HeaderValue::from_static("admins"));
    assert_eq!(group_id(&headers), None);
  }
}
