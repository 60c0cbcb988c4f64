//! Handlers for the chart endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/charts/v3` | Body: `ChartRequestParams`; `?preview=true` returns image bytes |
//! | `POST` | `/api/charts/subplot/v1` | Body: `SubplotChartRequestParams` |
//! | `POST` | `/api/charts/dual-category/v1` | Body: `DualCategoryChartRequestParams` |
//!
//! Without `preview` the response is `{last_updated, chart, alt_text, figure}`
//! and the request must ask for `svg`.

use axum::{
  extract::State,
  response::{IntoResponse, Response},
};
use epi_charts::{
  ChartOutput,
  output::{generate_chart, generate_dual_category_chart, generate_subplot_chart},
  payload::{ChartGenerationPayload, SubplotChartGenerationPayload, SubplotGenerationData},
  raster,
};
use epi_core::{
  Error,
  plots::{ChartRequestParams, DualCategoryChartRequestParams, FileFormat, SubplotChartRequestParams},
  store::MetricsStore,
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState,
  assembly::PlotAssembler,
  cache::{CacheKey, CachedResponse, cached},
  error::ApiError,
  extract::{ApiJson, ApiQuery, CacheDirectives, RequestPermissions},
  today,
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChartQuery {
  #[serde(default)]
  pub preview: bool,
}

/// Image bytes for a preview, otherwise the encoded JSON response.
fn respond(output: &ChartOutput, format: FileFormat, query: ChartQuery) -> Result<CachedResponse, ApiError> {
  if query.preview {
    Ok(CachedResponse::bytes(raster::content_type(format), output.write(format)?))
  } else {
    CachedResponse::json(&output.encode(format)?)
  }
}

// ─── Single category ──────────────────────────────────────────────────────────

/// `POST /api/charts/v3[?preview=true]`
pub async fn encoded<S>(
  State(state): State<ApiState<S>>,
  ApiQuery(query): ApiQuery<ChartQuery>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<ChartRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new(&format!("charts/v3?preview={}", query.preview), &request, access.group_id)?;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    let family = request.validate(today)?;
    let assembler = PlotAssembler::new(store, permissions, today);
    let plots = assembler.assemble(&request.resolved_plots()).await?;

    let output = generate_chart(&ChartGenerationPayload::new(request, plots), family)?;
    respond(&output, request.file_format, query)
  })
  .await?;
  Ok(response.into_response())
}

// ─── Subplots ─────────────────────────────────────────────────────────────────

/// `POST /api/charts/subplot/v1[?preview=true]`
pub async fn subplot<S>(
  State(state): State<ApiState<S>>,
  ApiQuery(query): ApiQuery<ChartQuery>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<SubplotChartRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new(&format!("charts/subplot/v1?preview={}", query.preview), &request, access.group_id)?;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    request.validate(today)?;
    let assembler = PlotAssembler::new(store, permissions, today);

    let mut subplots = Vec::with_capacity(request.subplots.len());
    for subplot in &request.subplots {
      let plots = assembler.assemble_lenient(&subplot.plots).await?;
      subplots.push(SubplotGenerationData { subplot_title: subplot.subplot_title.clone(), plots });
    }
    if subplots.iter().all(|s| s.plots.is_empty()) {
      return Err(Error::DataNotFoundForAnyPlot.into());
    }

    let output = generate_subplot_chart(&SubplotChartGenerationPayload::new(request, subplots))?;
    respond(&output, request.file_format, query)
  })
  .await?;
  Ok(response.into_response())
}

// ─── Dual category ────────────────────────────────────────────────────────────

/// `POST /api/charts/dual-category/v1[?preview=true]`
pub async fn dual_category<S>(
  State(state): State<ApiState<S>>,
  ApiQuery(query): ApiQuery<ChartQuery>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<DualCategoryChartRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key =
    CacheKey::new(&format!("charts/dual-category/v1?preview={}", query.preview), &request, access.group_id)?;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    request.validate(today)?;
    let assembler = PlotAssembler::new(store, permissions, today);
    let plots = assembler.assemble(&request.to_chart_request().plots).await?;

    let output = generate_dual_category_chart(request, plots)?;
    respond(&output, request.file_format, query)
  })
  .await?;
  Ok(response.into_response())
}
