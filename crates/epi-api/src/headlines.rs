//! Handlers for headline numbers and trends.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/headlines/v2` | Latest non-embargoed headline value |
//! | `POST` | `/api/trends/v2` | Change plus percentage change, with direction and colour |

use axum::{
  extract::State,
  response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use epi_core::{
  Error,
  dimension::MetricGroup,
  rbac::RbacPermission,
  store::{HeadlineQuery, MetricsStore},
  trends::Trend,
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState,
  cache::{CacheKey, CachedResponse, cached},
  error::ApiError,
  extract::{ApiJson, CacheDirectives, RequestPermissions},
};

/// The dimensions a headline is looked up by. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadlineFilter {
  pub topic:          String,
  #[serde(default)]
  pub geography:      Option<String>,
  #[serde(default)]
  pub geography_type: Option<String>,
  #[serde(default)]
  pub geography_code: Option<String>,
  #[serde(default)]
  pub age:            Option<String>,
  #[serde(default)]
  pub sex:            Option<String>,
  #[serde(default)]
  pub stratum:        Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<String> { value.clone().filter(|v| !v.trim().is_empty()) }

impl HeadlineFilter {
  fn query(&self, metric: &str, permissions: &[RbacPermission]) -> HeadlineQuery {
    HeadlineQuery {
      topic:          self.topic.clone(),
      metric:         metric.to_owned(),
      geography:      non_empty(&self.geography),
      geography_code: non_empty(&self.geography_code),
      geography_type: non_empty(&self.geography_type),
      age:            non_empty(&self.age),
      sex:            non_empty(&self.sex),
      stratum:        non_empty(&self.stratum),
      permissions:    permissions.to_vec(),
      as_of:          None,
    }
  }
}

/// Headline metrics only, and only under their own topic.
async fn check_headline_metric<S: MetricsStore>(store: &S, topic: &str, metric: &str) -> Result<(), ApiError> {
  if !MetricGroup::from_metric(metric)?.is_headline() {
    return Err(Error::InvalidRequest(format!("`{metric}` is not a headline metric")).into());
  }
  if !store.is_metric_available_for_topic(topic, metric).await.map_err(ApiError::store)? {
    return Err(Error::MetricDoesNotSupportTopic { topic: topic.to_owned(), metric: metric.to_owned() }.into());
  }
  Ok(())
}

// ─── Headlines ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineRequest {
  pub metric: String,
  #[serde(flatten)]
  pub filter: HeadlineFilter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineResponse {
  pub metric_value: f64,
  pub period_end:   NaiveDate,
}

/// `POST /api/headlines/v2`
pub async fn headline<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<HeadlineRequest>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("headlines/v2", &request, access.group_id)?;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    check_headline_metric(store, &request.filter.topic, &request.metric).await?;
    let latest = store
      .latest_headline(&request.filter.query(&request.metric, permissions))
      .await
      .map_err(ApiError::store)?
      .ok_or(Error::HeadlineNotFound)?;

    CachedResponse::json(&HeadlineResponse {
      metric_value: latest.metric_value,
      period_end:   latest.period_end.date_naive(),
    })
  })
  .await?;
  Ok(response.into_response())
}

// ─── Trends ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendRequest {
  pub metric:            String,
  pub percentage_metric: String,
  #[serde(flatten)]
  pub filter:            HeadlineFilter,
}

/// `POST /api/trends/v2`
pub async fn trend<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<TrendRequest>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("trends/v2", &request, access.group_id)?;
  let settings = state.settings.clone();
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let topic = &request.filter.topic;
    check_headline_metric(store, topic, &request.metric).await?;
    check_headline_metric(store, topic, &request.percentage_metric).await?;

    let not_found = || Error::TrendDataNotFound { topic: topic.clone(), metric: request.metric.clone() };
    let change = store
      .latest_headline(&request.filter.query(&request.metric, permissions))
      .await
      .map_err(ApiError::store)?
      .ok_or_else(not_found)?;
    let percentage = store
      .latest_headline(&request.filter.query(&request.percentage_metric, permissions))
      .await
      .map_err(ApiError::store)?
      .ok_or_else(not_found)?;

    CachedResponse::json(&Trend::new(
      &settings.metric_families,
      request.metric.clone(),
      change.metric_value,
      request.percentage_metric.clone(),
      percentage.metric_value,
    ))
  })
  .await?;
  Ok(response.into_response())
}
