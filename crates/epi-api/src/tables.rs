//! Handlers for the table endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/tables/v2` | Body: `TableRequestParams` |
//! | `POST` | `/api/tables/subplot/v1` | Body: `SubplotChartRequestParams` |
//!
//! Both respond with `[{reference, values: [{label, value, ...}]}]`.

use axum::{
  extract::State,
  response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use epi_charts::tables::{SubplotTableGroup, generate_subplot_table, generate_table};
use epi_core::{
  Error,
  plots::{PlotGenerationData, PlotParameters, SubplotChartRequestParams, TableRequestParams},
  store::MetricsStore,
};
use tracing::debug;

use crate::{
  ApiState,
  assembly::PlotAssembler,
  cache::{CacheKey, CachedResponse, cached},
  error::ApiError,
  extract::{ApiJson, CacheDirectives, RequestPermissions},
  today,
};

// ─── Single category ──────────────────────────────────────────────────────────

/// `POST /api/tables/v2`
pub async fn single<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<TableRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("tables/v2", &request, access.group_id)?;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    if request.plots.is_empty() {
      return Err(Error::NoPlotsRequested.into());
    }
    let plots = request.resolved_plots();
    for plot in &plots {
      plot.validate(today)?;
    }
    let data = PlotAssembler::new(store, permissions, today).assemble(&plots).await?;
    CachedResponse::json(&generate_table(&data))
  })
  .await?;
  Ok(response.into_response())
}

// ─── Subplots ─────────────────────────────────────────────────────────────────

/// `POST /api/tables/subplot/v1`
///
/// One row per value of the first subplot's x axis, one cell per subplot.
/// A cell whose plot is invalid or has no data is null; the request fails
/// only when every cell of every row is null.
pub async fn subplot<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<SubplotChartRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("tables/subplot/v1", &request, access.group_id)?;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    if request.subplots.iter().all(|s| s.plots.is_empty()) {
      return Err(Error::NoPlotsRequested.into());
    }
    let assembler = PlotAssembler::new(store, permissions, today);

    let mut groups = Vec::new();
    for group in request.output_payload_for_tables() {
      let mut cells = Vec::with_capacity(group.plots.len());
      for plot in &group.plots {
        let cell = match plot {
          Some(plot) => match subplot_cell(&assembler, plot, today).await {
            Err(e) if e.status().is_client_error() => {
              debug!(reference = %group.reference, metric = %plot.metric, error = %e, "empty subplot cell");
              None
            }
            other => other?,
          },
          None => None,
        };
        cells.push(cell);
      }
      groups.push(SubplotTableGroup { reference: group.reference, cells });
    }
    if groups.iter().all(|g| g.cells.iter().all(Option::is_none)) {
      return Err(Error::DataNotFoundForAnyPlot.into());
    }
    CachedResponse::json(&generate_subplot_table(&request.subplot_titles(), groups))
  })
  .await?;
  Ok(response.into_response())
}

async fn subplot_cell<S: MetricsStore>(
  assembler: &PlotAssembler<'_, S>,
  plot: &PlotParameters,
  today: NaiveDate,
) -> Result<Option<PlotGenerationData>, ApiError> {
  plot.validate(today)?;
  assembler.validate(plot).await?;
  assembler.plot_data(plot).await
}
