//! Response caching for the read endpoints.
//!
//! Entries are keyed by the SHA-256 of an endpoint tag, the canonical JSON
//! of the request and the caller's group. Entries never expire; they are
//! replaced when a request carries `Cache-Force-Refresh`.

use std::{collections::HashMap, future::Future, sync::Arc};

use axum::{
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{error::ApiError, extract::CacheDirectives};

const KEY_PREFIX: &str = "epi:response:";

// ─── Entries ─────────────────────────────────────────────────────────────────

/// A computed response body and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub content_type: String,
  pub body:         Vec<u8>,
}

impl CachedResponse {
  pub fn json(value: &impl Serialize) -> Result<Self, ApiError> {
    Ok(Self { content_type: "application/json".into(), body: serde_json::to_vec(value)? })
  }

  pub fn bytes(content_type: &str, body: Vec<u8>) -> Self { Self { content_type: content_type.into(), body } }
}

impl IntoResponse for CachedResponse {
  fn into_response(self) -> Response {
    let content_type = HeaderValue::from_str(&self.content_type)
      .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], self.body).into_response()
  }
}

/// Serialized form in Redis.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
  content_type: String,
  body:         String,
}

impl StoredEntry {
  fn encode(response: &CachedResponse) -> Result<Vec<u8>, ApiError> {
    let entry = StoredEntry { content_type: response.content_type.clone(), body: B64.encode(&response.body) };
    Ok(serde_json::to_vec(&entry)?)
  }

  /// `None` for anything that no longer decodes; it is then recomputed.
  fn decode(raw: &[u8]) -> Option<CachedResponse> {
    let entry: StoredEntry = serde_json::from_slice(raw).ok()?;
    let body = B64.decode(entry.body).ok()?;
    Some(CachedResponse { content_type: entry.content_type, body })
  }
}

// ─── Keys ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  /// Object keys serialize in sorted order, so equal requests hash equally
  /// whatever order their fields arrived in.
  pub fn new(endpoint: &str, request: &impl Serialize, group_id: Option<i64>) -> Result<Self, ApiError> {
    let canonical = json!({
      "endpoint": endpoint,
      "group":    group_id,
      "request":  serde_json::to_value(request)?,
    })
    .to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(Self(format!("{KEY_PREFIX}{}", hex::encode(digest))))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

// ─── Backends ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub enum ResponseCache {
  Redis(ConnectionManager),
  Memory(Arc<RwLock<HashMap<String, CachedResponse>>>),
  /// Every request is computed.
  PassThrough,
}

impl ResponseCache {
  pub fn memory() -> Self { ResponseCache::Memory(Arc::default()) }

  pub async fn redis(url: &str) -> Result<Self, ApiError> {
    let client = redis::Client::open(url)?;
    Ok(ResponseCache::Redis(ConnectionManager::new(client).await?))
  }

  pub fn is_enabled(&self) -> bool { !matches!(self, ResponseCache::PassThrough) }

  pub async fn get(&self, key: &CacheKey) -> Result<Option<CachedResponse>, ApiError> {
    match self {
      ResponseCache::Redis(manager) => {
        let mut conn = manager.clone();
        let raw: Option<Vec<u8>> = conn.get(key.as_str()).await?;
        Ok(raw.as_deref().and_then(StoredEntry::decode))
      }
      ResponseCache::Memory(entries) => Ok(entries.read().await.get(key.as_str()).cloned()),
      ResponseCache::PassThrough => Ok(None),
    }
  }

  pub async fn put(&self, key: &CacheKey, response: &CachedResponse) -> Result<(), ApiError> {
    match self {
      ResponseCache::Redis(manager) => {
        let mut conn = manager.clone();
        let () = conn.set(key.as_str(), StoredEntry::encode(response)?).await?;
      }
      ResponseCache::Memory(entries) => {
        entries.write().await.insert(key.as_str().to_owned(), response.clone());
      }
      ResponseCache::PassThrough => {}
    }
    Ok(())
  }

  /// Round trip to the backing service. Always succeeds without one.
  pub async fn ping(&self) -> Result<(), ApiError> {
    if let ResponseCache::Redis(manager) = self {
      let mut conn = manager.clone();
      let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    }
    Ok(())
  }
}

impl std::fmt::Debug for ResponseCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      ResponseCache::Redis(_) => "Redis",
      ResponseCache::Memory(_) => "Memory",
      ResponseCache::PassThrough => "PassThrough",
    };
    f.debug_tuple("ResponseCache").field(&name).finish()
  }
}

// ─── Decorator ───────────────────────────────────────────────────────────────

/// Answer from the cache when possible, otherwise compute and store.
///
/// `Cache-Force-Refresh` skips the lookup. `Cache-Check` turns a miss into
/// [`ApiError::CacheEntryNotFound`] instead of computing.
pub async fn cached<F, Fut>(
  cache: &ResponseCache,
  key: &CacheKey,
  directives: CacheDirectives,
  compute: F,
) -> Result<CachedResponse, ApiError>
where
  F: FnOnce() -> Fut,
  Fut: Future<Output = Result<CachedResponse, ApiError>>,
{
  if !cache.is_enabled() {
    return compute().await;
  }

  if directives.force_refresh {
    info!(key = key.as_str(), "cache force refresh");
  } else if let Some(hit) = cache.get(key).await? {
    debug!(key = key.as_str(), "cache hit");
    return Ok(hit);
  } else if directives.check_only {
    return Err(ApiError::CacheEntryNotFound);
  } else {
    debug!(key = key.as_str(), "cache miss");
  }

  let response = compute().await?;
  cache.put(key, &response).await?;
  Ok(response)
}
