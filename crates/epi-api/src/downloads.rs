//! Handlers for the data download endpoints.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | `POST` | `/api/downloads/v2` | `DownloadRequestParams` |
//! | `POST` | `/api/downloads/subplot/v1` | `SubplotDownloadRequestParams` |
//! | `POST` | `/api/bulkdownloads/v1` | `BulkDownloadRequestParams` |
//!
//! `file_format` is `csv` (the default) or `json`. Responses are sent as
//! attachments; bulk downloads are a gzipped tarball with one file per
//! chart.

use axum::{
  extract::State,
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};
use epi_charts::exports::{HeadlineExport, TimeSeriesExport, archive, encode_rows, to_csv};
use epi_core::{
  Error,
  plots::{
    BulkDownloadRequestParams, DownloadFormat, DownloadRequestParams, PlotParameters,
    SubplotDownloadRequestParams,
  },
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

const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

fn attachment(response: CachedResponse, filename: &str) -> Response {
  let mut response = response.into_response();
  if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
    response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
  }
  response
}

/// One file's worth of rows, or `None` when no plot had any.
async fn chart_file<S: MetricsStore>(
  assembler: &PlotAssembler<'_, S>,
  plots: &[PlotParameters],
  headline: bool,
  format: DownloadFormat,
) -> Result<Option<Vec<u8>>, ApiError> {
  let body = if headline {
    let rows: Vec<HeadlineExport> = assembler.headline_rows(plots).await?.into_iter().map(Into::into).collect();
    if rows.is_empty() {
      return Ok(None);
    }
    encode_rows(&rows, format)?
  } else {
    let rows: Vec<TimeSeriesExport> = assembler.time_series_rows(plots).await?.into_iter().map(Into::into).collect();
    if rows.is_empty() {
      return Ok(None);
    }
    encode_rows(&rows, format)?
  };
  Ok(Some(body))
}

// ─── Single chart ─────────────────────────────────────────────────────────────

/// `POST /api/downloads/v2`
pub async fn single<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<DownloadRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("downloads/v2", &request, access.group_id)?;
  let format = request.file_format;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    let headline = request.validate(today)?;
    let assembler = PlotAssembler::new(store, permissions, today);
    let body = chart_file(&assembler, &request.resolved_plots(), headline, format)
      .await?
      .ok_or(Error::DataNotFoundForAnyPlot)?;
    Ok(CachedResponse::bytes(format.content_type(), body))
  })
  .await?;
  Ok(attachment(response, &format!("chart_download.{}", format.extension())))
}

// ─── Subplots ─────────────────────────────────────────────────────────────────

/// `POST /api/downloads/subplot/v1`
///
/// The rows of every group of a subplot chart. CSV output is one table with
/// a single header; JSON output is an array per group. Groups without data
/// are left out; the request fails only when every group is empty.
pub async fn subplot<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<SubplotDownloadRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("downloads/subplot/v1", &request, access.group_id)?;
  let format = request.file_format;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    request.validate(today)?;
    let assembler = PlotAssembler::new(store, permissions, today);

    let mut groups: Vec<Vec<TimeSeriesExport>> = Vec::new();
    for group in request.output_payload_for_tables() {
      let plots: Vec<PlotParameters> = group.plots.into_iter().flatten().filter(|p| !p.is_headline()).collect();
      let rows = assembler.time_series_rows(&plots).await?;
      if rows.is_empty() {
        debug!(reference = %group.reference, "subplot download group has no rows");
        continue;
      }
      groups.push(rows.into_iter().map(Into::into).collect());
    }
    if groups.is_empty() {
      return Err(Error::DataNotFoundForAnyPlot.into());
    }

    let body = match format {
      DownloadFormat::Csv => to_csv(&groups.concat()).into_bytes(),
      DownloadFormat::Json => serde_json::to_vec(&groups)?,
    };
    Ok(CachedResponse::bytes(format.content_type(), body))
  })
  .await?;
  Ok(attachment(response, &format!("charts-download.{}", format.extension())))
}

// ─── Bulk ─────────────────────────────────────────────────────────────────────

/// `POST /api/bulkdownloads/v1`
///
/// Charts without data get no file; the request fails only when no chart
/// has any.
pub async fn bulk<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  access: RequestPermissions,
  ApiJson(request): ApiJson<BulkDownloadRequestParams>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("bulkdownloads/v1", &request, access.group_id)?;
  let (store, request, permissions) = (state.store.as_ref(), &request, access.permissions.as_slice());
  let response = cached(&state.cache, &key, directives, move || async move {
    let today = today();
    request.validate(today)?;
    let assembler = PlotAssembler::new(store, permissions, today);

    let mut files = Vec::with_capacity(request.charts.len());
    for chart in &request.charts {
      let headline = chart.validate(today)?;
      match chart_file(&assembler, &chart.resolved_plots(), headline, request.file_format).await? {
        Some(body) => files.push((chart.name.clone(), body)),
        None => debug!(chart = %chart.name, "bulk download chart has no rows"),
      }
    }
    if files.is_empty() {
      return Err(Error::DataNotFoundForAnyPlot.into());
    }
    Ok(CachedResponse::bytes(ARCHIVE_CONTENT_TYPE, archive(&files, request.file_format)?))
  })
  .await?;
  Ok(attachment(response, "downloads.tar.gz"))
}
