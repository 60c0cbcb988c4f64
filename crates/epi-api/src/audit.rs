//! Operator-only audit reads. Unlike every other read these include rows
//! still under embargo.
//!
//! | Method | Path |
//! |--------|------|
//! | `GET`  | `/api/audit/v1/{kind}/{metric}/{geography_type}/{geography}/{stratum}/{sex}/{age}` |
//!
//! `kind` is one of `core-timeseries`, `api-timeseries`, `core-headline`.
//! Pagination: `?page=<n>&page_size=<n>`.

use axum::{
  Json,
  extract::State,
  response::{IntoResponse, Response},
};
use epi_core::store::{AuditQuery, DEFAULT_PAGE_SIZE, MetricsStore};
use serde::Deserialize;

use crate::{
  ApiState,
  error::ApiError,
  extract::{ApiPath, ApiQuery},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditKind {
  CoreTimeseries,
  ApiTimeseries,
  CoreHeadline,
}

#[derive(Debug, Deserialize)]
pub struct AuditPath {
  pub kind:           AuditKind,
  pub metric:         String,
  pub geography_type: String,
  pub geography:      String,
  pub stratum:        String,
  pub sex:            String,
  pub age:            String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
  pub page:      Option<u32>,
  pub page_size: Option<u32>,
}

impl PageParams {
  pub fn page(self) -> u32 { self.page.unwrap_or(1) }

  pub fn page_size(self) -> u32 { self.page_size.unwrap_or(DEFAULT_PAGE_SIZE) }
}

/// `GET /api/audit/v1/{kind}/...`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  ApiPath(path): ApiPath<AuditPath>,
  ApiQuery(paging): ApiQuery<PageParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let query = AuditQuery {
    metric:         path.metric,
    geography_type: path.geography_type,
    geography:      path.geography,
    stratum:        path.stratum,
    sex:            path.sex,
    age:            path.age,
    page:           paging.page(),
    page_size:      paging.page_size(),
  };

  let store = &state.store;
  let response = match path.kind {
    AuditKind::CoreTimeseries => {
      Json(store.audit_time_series(&query).await.map_err(ApiError::store)?).into_response()
    }
    AuditKind::ApiTimeseries => {
      Json(store.audit_api_time_series(&query).await.map_err(ApiError::store)?).into_response()
    }
    AuditKind::CoreHeadline => Json(store.audit_headlines(&query).await.map_err(ApiError::store)?).into_response(),
  };
  Ok(response)
}
