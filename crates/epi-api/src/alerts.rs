//! Handlers for weather health alerts.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/alerts/v1/{heat\|cold}` | Current status of every geography with an alert record |
//! | `GET`  | `/api/alerts/v1/{heat\|cold}/{geography_code}` | Status, advice and period for one geography |

use axum::{Json, extract::State};
use chrono::Utc;
use epi_core::{
  alerts::{AlertDetail, AlertState, AlertSummary, AlertTopic},
  rbac::RbacPermission,
  store::{HeadlineQuery, MetricsStore},
};

use crate::{
  ApiState,
  error::ApiError,
  extract::{ApiPath, RequestPermissions},
};

fn parse_topic(topic: &str) -> Result<AlertTopic, ApiError> {
  topic.parse().map_err(|_| ApiError::BadRequest(format!("`{topic}` is not a weather alert topic")))
}

fn alert_query(topic: AlertTopic, geography_code: Option<String>, permissions: &[RbacPermission]) -> HeadlineQuery {
  HeadlineQuery {
    topic: topic.topic_name().to_owned(),
    metric: topic.metric_name(),
    geography_code,
    permissions: permissions.to_vec(),
    ..Default::default()
  }
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /api/alerts/v1/{topic}`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath(topic): ApiPath<String>,
) -> Result<Json<Vec<AlertSummary>>, ApiError>
where
  S: MetricsStore + 'static,
{
  let topic = parse_topic(&topic)?;
  let latest = state
    .store
    .latest_headlines_by_geography(&alert_query(topic, None, &access.permissions))
    .await
    .map_err(ApiError::store)?;

  let now = Utc::now();
  let summaries = latest
    .iter()
    .map(|headline| {
      let code = headline.geography_code.as_deref().unwrap_or_default();
      AlertState::current(topic, Some(headline), now).summary(code, &headline.geography)
    })
    .collect();
  Ok(Json(summaries))
}

// ─── Detail ───────────────────────────────────────────────────────────────────

/// `GET /api/alerts/v1/{topic}/{geography_code}`
///
/// A geography without any alert record reports green with null dates.
pub async fn detail<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath((topic, geography_code)): ApiPath<(String, String)>,
) -> Result<Json<AlertDetail>, ApiError>
where
  S: MetricsStore + 'static,
{
  let topic = parse_topic(&topic)?;
  let latest = state
    .store
    .latest_headline(&alert_query(topic, Some(geography_code), &access.permissions))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(AlertState::current(topic, latest.as_ref(), Utc::now()).detail()))
}
