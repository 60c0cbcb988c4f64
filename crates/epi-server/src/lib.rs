//! Process wiring for the metrics service.
//!
//! Turns a [`ServerConfig`] into the response cache, the router mounted for
//! the process's [`AppMode`] and, in `INGESTION` mode, the worker.

pub mod auth;
pub mod error;

pub use error::{Error, Result};

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware};
use epi_api::{ApiSettings, ApiState, ResponseCache};
use epi_core::{app_mode::AppMode, store::MetricsStore, trends::MetricFamilyTable};
use epi_ingest::worker::WorkerConfig;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use auth::{AuthConfig, require_basic_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration. Keys are read from `config.toml` and from the
/// environment under their upper-case names (`APP_MODE`, `REDIS_HOST`, ...).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub app_mode:                     AppMode,
  pub database_path:                PathBuf,
  pub redis_host:                   Option<String>,
  pub caching_v2_enabled:           bool,
  pub auth_enabled:                 bool,
  pub ingestion_bucket_name:        PathBuf,
  pub sqs_queue_url:                Option<String>,
  pub ingestion_max_messages:       usize,
  pub ingestion_wait_seconds:       u64,
  pub ingestion_visibility_seconds: u64,
  pub frontend_url:                 Option<String>,
  pub host:                         String,
  pub port:                         u16,
  pub audit_username:               Option<String>,
  pub audit_password_hash:          Option<String>,
  /// Which metrics improve when they go up. Built-in rules when unset.
  pub metric_families:              Option<MetricFamilyTable>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      app_mode:                     AppMode::PrivateApi,
      database_path:                PathBuf::from("metrics.sqlite3"),
      redis_host:                   None,
      caching_v2_enabled:           true,
      auth_enabled:                 false,
      ingestion_bucket_name:        PathBuf::from("ingestion"),
      sqs_queue_url:                None,
      ingestion_max_messages:       10,
      ingestion_wait_seconds:       20,
      ingestion_visibility_seconds: 60,
      frontend_url:                 None,
      host:                         "0.0.0.0".to_string(),
      port:                         8000,
      audit_username:               None,
      audit_password_hash:          None,
      metric_families:              None,
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn api_settings(&self) -> ApiSettings {
    ApiSettings {
      app_mode: self.app_mode,
      auth_enabled: self.auth_enabled,
      frontend_url: self.frontend_url.clone(),
      metric_families: self.metric_families.clone().unwrap_or_default(),
    }
  }

  pub fn worker_config(&self) -> WorkerConfig {
    WorkerConfig {
      max_messages: self.ingestion_max_messages,
      wait:         Duration::from_secs(self.ingestion_wait_seconds),
      visibility:   Duration::from_secs(self.ingestion_visibility_seconds),
    }
  }

  /// Both audit credentials, or `None` if either is unset.
  pub fn audit_auth(&self) -> Option<AuthConfig> {
    Some(AuthConfig {
      username:      self.audit_username.clone().filter(|u| !u.is_empty())?,
      password_hash: self.audit_password_hash.clone().filter(|h| !h.is_empty())?,
    })
  }
}

// ─── Cache ────────────────────────────────────────────────────────────────────

/// Only the private API caches. Without `REDIS_HOST` the cache lives in
/// process memory.
pub async fn open_cache(config: &ServerConfig) -> Result<ResponseCache> {
  if config.app_mode != AppMode::PrivateApi || !config.caching_v2_enabled {
    return Ok(ResponseCache::PassThrough);
  }
  match config.redis_host.as_deref().filter(|h| !h.is_empty()) {
    Some(url) => {
      info!(url, "connecting to redis");
      Ok(ResponseCache::redis(url).await?)
    }
    None => {
      warn!("REDIS_HOST is not set; caching responses in process memory");
      Ok(ResponseCache::memory())
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The routes this process serves, chosen by its app mode.
///
/// | Mode | Routes |
/// |------|--------|
/// | `PRIVATE_API` | health, charts/tables/downloads/headlines/trends/geographies/alerts, audit |
/// | `PUBLIC_API` | health, public hierarchy and time series |
/// | `CMS_ADMIN` | health, audit behind basic auth |
/// | `INGESTION`, `FEEDBACK_API` | health |
pub fn router<S>(state: ApiState<S>, config: &ServerConfig) -> Result<Router>
where
  S: MetricsStore + 'static,
{
  let mode = config.app_mode;
  let mut app = epi_api::health_router(state.clone());
  match mode {
    AppMode::PrivateApi => {
      app = app.merge(epi_api::api_router(state.clone())).merge(epi_api::audit_router(state));
    }
    AppMode::PublicApi => {
      app = app.merge(epi_api::public_router(state));
    }
    AppMode::CmsAdmin => {
      let auth = Arc::new(config.audit_auth().ok_or(Error::MissingAuditCredentials(mode))?);
      let audit = epi_api::audit_router(state).route_layer(middleware::from_fn_with_state(auth, require_basic_auth));
      app = app.merge(audit);
    }
    AppMode::Ingestion | AppMode::FeedbackApi => {}
  }
  Ok(app.layer(TraceLayer::new_for_http()))
}

// ─── Shutdown ─────────────────────────────────────────────────────────────────

/// Resolves on ctrl-c, or SIGTERM on unix.
pub async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      warn!(error = %e, "failed to listen for ctrl-c");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(e) => {
        warn!(error = %e, "failed to listen for SIGTERM");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    () = ctrl_c => {},
    () = terminate => {},
  }
  info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use epi_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use tower::ServiceExt;

  use super::*;

  fn config_from(pairs: &[(&str, &str)]) -> ServerConfig {
    let mut builder = config::Config::builder();
    for (key, value) in pairs {
      builder = builder.set_override(*key, *value).unwrap();
    }
    builder.build().unwrap().try_deserialize().unwrap()
  }

  async fn state(config: &ServerConfig) -> ApiState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let cache = open_cache(config).await.unwrap();
    ApiState::new(Arc::new(store), cache, config.api_settings())
  }

  async fn status(app: Router, uri: &str, auth: Option<&str>) -> StatusCode {
    let mut builder = Request::builder().uri(uri);
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap().status()
  }

  const AUDIT_URI: &str = "/api/audit/v1/core-headline/COVID-19_headline_ONSdeaths_7DayChange/Nation/England/default/all/all";
  const CHART_URI: &str = "/api/charts/v3";
  const GEOGRAPHIES_URI: &str = "/api/geographies/v2/COVID-19";
  const PUBLIC_URI: &str = "/api/public/timeseries/themes/infectious_disease/sub_themes/respiratory/topics/COVID-19\
                            /geography_types/Nation/geographies/England/metrics/COVID-19_cases_casesByDay";

  #[test]
  fn defaults_apply_to_an_empty_config() {
    let config = config_from(&[]);
    assert_eq!(config.app_mode, AppMode::PrivateApi);
    assert_eq!(config.address(), "0.0.0.0:8000");
    assert!(config.caching_v2_enabled);
    assert_eq!(config.worker_config(), WorkerConfig::default());
  }

  #[test]
  fn overrides_are_parsed() {
    let config = config_from(&[("app_mode", "INGESTION"), ("ingestion_wait_seconds", "5"), ("auth_enabled", "true")]);
    assert_eq!(config.app_mode, AppMode::Ingestion);
    assert_eq!(config.worker_config().wait, Duration::from_secs(5));
    assert!(config.auth_enabled);
  }

  #[tokio::test]
  async fn cache_follows_mode_and_switch() {
    let private = config_from(&[]);
    assert!(matches!(open_cache(&private).await.unwrap(), ResponseCache::Memory(_)));

    let disabled = config_from(&[("caching_v2_enabled", "false")]);
    assert!(matches!(open_cache(&disabled).await.unwrap(), ResponseCache::PassThrough));

    let public = config_from(&[("app_mode", "PUBLIC_API")]);
    assert!(matches!(open_cache(&public).await.unwrap(), ResponseCache::PassThrough));
  }

  #[tokio::test]
  async fn public_mode_serves_only_public_routes() {
    let config = config_from(&[("app_mode", "PUBLIC_API")]);
    let app = router(state(&config).await, &config).unwrap();
    assert_eq!(status(app.clone(), PUBLIC_URI, None).await, StatusCode::OK);
    assert_eq!(status(app.clone(), "/api/public/timeseries/themes", None).await, StatusCode::OK);
    assert_eq!(status(app.clone(), AUDIT_URI, None).await, StatusCode::NOT_FOUND);
    assert_eq!(status(app.clone(), GEOGRAPHIES_URI, None).await, StatusCode::NOT_FOUND);
    assert_eq!(status(app, "/health/", None).await, StatusCode::OK);
  }

  #[tokio::test]
  async fn private_mode_serves_api_and_audit() {
    let config = config_from(&[]);
    let app = router(state(&config).await, &config).unwrap();
    assert_eq!(status(app.clone(), AUDIT_URI, None).await, StatusCode::OK);
    assert_eq!(status(app.clone(), PUBLIC_URI, None).await, StatusCode::NOT_FOUND);
    // Charts and downloads are POST-only.
    assert_eq!(status(app.clone(), CHART_URI, None).await, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(status(app.clone(), "/api/downloads/v2", None).await, StatusCode::METHOD_NOT_ALLOWED);
    // Mounted; the empty store knows no topics.
    assert_eq!(status(app, GEOGRAPHIES_URI, None).await, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn cms_admin_requires_credentials() {
    let config = config_from(&[("app_mode", "CMS_ADMIN")]);
    let state = state(&config).await;
    assert!(matches!(router(state, &config), Err(Error::MissingAuditCredentials(AppMode::CmsAdmin))));
  }

  #[tokio::test]
  async fn cms_admin_audit_is_behind_basic_auth() {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(b"secret", &salt).unwrap().to_string();
    let config = config_from(&[("app_mode", "CMS_ADMIN"), ("audit_username", "auditor"), ("audit_password_hash", hash.as_str())]);
    let app = router(state(&config).await, &config).unwrap();

    assert_eq!(status(app.clone(), AUDIT_URI, None).await, StatusCode::UNAUTHORIZED);
    let auth = format!("Basic {}", B64.encode("auditor:secret"));
    assert_eq!(status(app.clone(), AUDIT_URI, Some(&auth)).await, StatusCode::OK);
    assert_eq!(status(app, "/health/", None).await, StatusCode::OK);
  }

  #[tokio::test]
  async fn ingestion_mode_serves_health_only() {
    let config = config_from(&[("app_mode", "INGESTION")]);
    let app = router(state(&config).await, &config).unwrap();
    assert_eq!(status(app.clone(), "/health/internal/", None).await, StatusCode::OK);
    assert_eq!(status(app, AUDIT_URI, None).await, StatusCode::NOT_FOUND);
  }
}
