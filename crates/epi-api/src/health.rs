//! Liveness and readiness checks.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/health/` | Always `200` |
//! | `GET`  | `/health/internal/` | `200` when every dependency of the app mode answers, else `503` |

use axum::{Json, extract::State, http::StatusCode};
use epi_core::{app_mode::AppMode, store::MetricsStore};
use serde::Serialize;
use tracing::warn;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Liveness {
  pub status:       &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub frontend_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
  pub status: &'static str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:  Option<String>,
}

/// `GET /health/`
pub async fn liveness<S>(State(state): State<ApiState<S>>) -> Json<Liveness>
where
  S: MetricsStore + 'static,
{
  Json(Liveness { status: "ok", frontend_url: state.settings.frontend_url.clone() })
}

/// Ping what `mode` depends on, database first.
pub async fn check_dependencies<S: MetricsStore>(state: &ApiState<S>, mode: AppMode) -> Result<(), String> {
  if mode.requires_database() {
    state.store.ping().await.map_err(|e| format!("database: {e}"))?;
  }
  if mode.requires_cache() {
    state.cache.ping().await.map_err(|e: ApiError| format!("cache: {e}"))?;
  }
  Ok(())
}

/// `GET /health/internal/`
pub async fn readiness<S>(State(state): State<ApiState<S>>) -> (StatusCode, Json<Readiness>)
where
  S: MetricsStore + 'static,
{
  match check_dependencies(&state, state.settings.app_mode).await {
    Ok(()) => (StatusCode::OK, Json(Readiness { status: "healthy", error: None })),
    Err(error) => {
      warn!(%error, mode = %state.settings.app_mode, "health check failed");
      (StatusCode::SERVICE_UNAVAILABLE, Json(Readiness { status: "unhealthy", error: Some(error) }))
    }
  }
}
