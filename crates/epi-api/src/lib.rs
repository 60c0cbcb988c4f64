//! JSON HTTP API for the metrics service.
//!
//! Exposes axum [`Router`]s backed by any [`epi_core::store::MetricsStore`].
//! Which routers are mounted depends on the process's
//! [`epi_core::app_mode::AppMode`]; that choice, auth for the audit routes,
//! TLS and transport are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = epi_api::health_router(state.clone()).merge(epi_api::api_router(state));
//! ```

pub mod alerts;
pub mod assembly;
pub mod audit;
pub mod cache;
pub mod charts;
pub mod downloads;
pub mod error;
pub mod extract;
pub mod geographies;
pub mod headlines;
pub mod health;
pub mod public;
pub mod tables;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use epi_core::{app_mode::AppMode, store::MetricsStore, trends::MetricFamilyTable};

pub use cache::ResponseCache;
pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Settings the handlers read per request.
#[derive(Debug, Clone, Default)]
pub struct ApiSettings {
  pub app_mode:        AppMode,
  /// When false, requests carry no permissions and only public rows are
  /// served.
  pub auth_enabled:    bool,
  pub metric_families: MetricFamilyTable,
  pub frontend_url:    Option<String>,
}

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:    Arc<S>,
  pub cache:    ResponseCache,
  pub settings: Arc<ApiSettings>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), cache: self.cache.clone(), settings: self.settings.clone() }
  }
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>, cache: ResponseCache, settings: ApiSettings) -> Self {
    Self { store, cache, settings: Arc::new(settings) }
  }
}

/// Today's date, for request defaults.
pub(crate) fn today() -> NaiveDate { Utc::now().date_naive() }

// ─── Routers ─────────────────────────────────────────────────────────────────

/// The private API consumed by the frontend: charts, tables, downloads,
/// headlines, trends, geographies and weather alerts.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: MetricsStore + 'static,
{
  Router::new()
    // Charts
    .route("/api/charts/v3", post(charts::encoded::<S>))
    .route("/api/charts/subplot/v1", post(charts::subplot::<S>))
    .route("/api/charts/dual-category/v1", post(charts::dual_category::<S>))
    // Tables
    .route("/api/tables/v2", post(tables::single::<S>))
    .route("/api/tables/subplot/v1", post(tables::subplot::<S>))
    // Downloads
    .route("/api/downloads/v2", post(downloads::single::<S>))
    .route("/api/downloads/subplot/v1", post(downloads::subplot::<S>))
    .route("/api/bulkdownloads/v1", post(downloads::bulk::<S>))
    // Headlines
    .route("/api/headlines/v2", post(headlines::headline::<S>))
    .route("/api/trends/v2", post(headlines::trend::<S>))
    .route("/api/geographies/v2/{topic}", get(geographies::for_topic::<S>))
    // Weather health alerts
    .route("/api/alerts/v1/{topic}", get(alerts::list::<S>))
    .route("/api/alerts/v1/{topic}/{geography_code}", get(alerts::detail::<S>))
    .with_state(state)
}

/// The browsable, paginated public time-series API.
pub fn public_router<S>(state: ApiState<S>) -> Router<()>
where
  S: MetricsStore + 'static,
{
  Router::new()
    .route("/api/public/timeseries", get(public::root))
    .route("/api/public/timeseries/themes", get(public::themes::<S>))
    .route("/api/public/timeseries/themes/{theme}/sub_themes", get(public::sub_themes::<S>))
    .route(
      "/api/public/timeseries/themes/{theme}/sub_themes/{sub_theme}/topics",
      get(public::topics::<S>),
    )
    .route(
      "/api/public/timeseries/themes/{theme}/sub_themes/{sub_theme}/topics/{topic}/geography_types",
      get(public::geography_types::<S>),
    )
    .route(
      "/api/public/timeseries/themes/{theme}/sub_themes/{sub_theme}/topics/{topic}\
       /geography_types/{geography_type}/geographies",
      get(public::geographies::<S>),
    )
    .route(
      "/api/public/timeseries/themes/{theme}/sub_themes/{sub_theme}/topics/{topic}\
       /geography_types/{geography_type}/geographies/{geography}/metrics",
      get(public::metrics::<S>),
    )
    .route(
      "/api/public/timeseries/themes/{theme}/sub_themes/{sub_theme}/topics/{topic}\
       /geography_types/{geography_type}/geographies/{geography}/metrics/{metric}",
      get(public::time_series::<S>),
    )
    .with_state(state)
}

/// Audit reads, which include embargoed rows.
pub fn audit_router<S>(state: ApiState<S>) -> Router<()>
where
  S: MetricsStore + 'static,
{
  Router::new()
    .route(
      "/api/audit/v1/{kind}/{metric}/{geography_type}/{geography}/{stratum}/{sex}/{age}",
      get(audit::list::<S>),
    )
    .with_state(state)
}

pub fn health_router<S>(state: ApiState<S>) -> Router<()>
where
  S: MetricsStore + 'static,
{
  Router::new()
    .route("/health/", get(health::liveness::<S>))
    .route("/health/internal/", get(health::readiness::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
