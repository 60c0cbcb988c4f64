//! The public time-series API.
//!
//! | Method | Path |
//! |--------|------|
//! | `GET`  | `/api/public/timeseries` |
//! | `GET`  | `/api/public/timeseries/themes` |
//! | `GET`  | `.../themes/{theme}/sub_themes` |
//! | `GET`  | `.../sub_themes/{sub_theme}/topics` |
//! | `GET`  | `.../topics/{topic}/geography_types` |
//! | `GET`  | `.../geography_types/{geography_type}/geographies` |
//! | `GET`  | `.../geographies/{geography}/metrics` |
//! | `GET`  | `.../metrics/{metric}` |
//!
//! Each listing level returns `[{name, link}]`, the link pointing at the
//! next level down. The leaf returns rows ordered by date, paginated with
//! `?page=<n>&page_size=<n>` and narrowed by the optional `stratum`, `sex`,
//! `age`, `year`, `epiweek`, `date` and `in_reporting_delay_period`
//! filters. Non-public rows reach the response only when the caller's
//! permissions cover them, and every row is checked again before it is
//! serialized.

use axum::{Json, extract::State};
use chrono::NaiveDate;
use epi_core::{
  rbac::{RbacPermission, filter_visible},
  record::ApiTimeSeriesRecord,
  store::{
    MetricsStore, Page, PublicCatalogueQuery, PublicLevel, PublicTimeSeriesFilters,
    PublicTimeSeriesQuery,
  },
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

use crate::{
  ApiState,
  audit::PageParams,
  error::ApiError,
  extract::{ApiPath, ApiQuery, RequestPermissions},
};

pub const PUBLIC_PREFIX: &str = "/api/public/timeseries";

// ─── Hierarchy ───────────────────────────────────────────────────────────────

/// The ancestors named in a listing path. Levels above the listed one are
/// set; the rest are absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HierarchyPath {
  pub theme:          Option<String>,
  pub sub_theme:      Option<String>,
  pub topic:          Option<String>,
  pub geography_type: Option<String>,
  pub geography:      Option<String>,
}

impl HierarchyPath {
  /// `(level, value)` for every ancestor, top first.
  fn ancestors(&self) -> Vec<(PublicLevel, &str)> {
    [
      (PublicLevel::Theme, &self.theme),
      (PublicLevel::SubTheme, &self.sub_theme),
      (PublicLevel::Topic, &self.topic),
      (PublicLevel::GeographyType, &self.geography_type),
      (PublicLevel::Geography, &self.geography),
    ]
    .into_iter()
    .map_while(|(level, value)| value.as_deref().map(|v| (level, v)))
    .collect()
  }

  /// The path listing `level` under these ancestors.
  fn listing_path(&self, level: PublicLevel) -> String {
    let mut path = PUBLIC_PREFIX.to_owned();
    for (ancestor, value) in self.ancestors() {
      path.push_str(&format!("/{}/{}", ancestor.segment(), encode_segment(value)));
    }
    path.push('/');
    path.push_str(level.segment());
    path
  }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  for byte in value.bytes() {
    if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) {
      out.push(char::from(byte));
    } else {
      out.push_str(&format!("%{byte:02X}"));
    }
  }
  out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLink {
  pub name: String,
  pub link: String,
}

/// `GET /api/public/timeseries`
pub async fn root() -> Json<Value> {
  Json(json!({ "links": { "themes": HierarchyPath::default().listing_path(PublicLevel::Theme) } }))
}

async fn listing<S>(
  state: &ApiState<S>,
  permissions: Vec<RbacPermission>,
  level: PublicLevel,
  path: HierarchyPath,
) -> Result<Json<Vec<HierarchyLink>>, ApiError>
where
  S: MetricsStore + 'static,
{
  let query = PublicCatalogueQuery {
    level,
    theme: path.theme.clone(),
    sub_theme: path.sub_theme.clone(),
    topic: path.topic.clone(),
    geography_type: path.geography_type.clone(),
    geography: path.geography.clone(),
    permissions,
    as_of: None,
  };
  let names = state.store.public_catalogue(&query).await.map_err(ApiError::store)?;
  let here = path.listing_path(level);
  let links = names
    .into_iter()
    .map(|name| {
      let link = match level.next() {
        Some(next) => format!("{here}/{}/{}", encode_segment(&name), next.segment()),
        None => format!("{here}/{}", encode_segment(&name)),
      };
      HierarchyLink { name, link }
    })
    .collect();
  Ok(Json(links))
}

/// `GET /api/public/timeseries/themes`
pub async fn themes<S>(State(state): State<ApiState<S>>, access: RequestPermissions) -> Result<Json<Vec<HierarchyLink>>, ApiError>
where
  S: MetricsStore + 'static,
{
  listing(&state, access.permissions, PublicLevel::Theme, HierarchyPath::default()).await
}

/// `GET .../themes/{theme}/sub_themes`
pub async fn sub_themes<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath(path): ApiPath<HierarchyPath>,
) -> Result<Json<Vec<HierarchyLink>>, ApiError>
where
  S: MetricsStore + 'static,
{
  listing(&state, access.permissions, PublicLevel::SubTheme, path).await
}

/// `GET .../sub_themes/{sub_theme}/topics`
pub async fn topics<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath(path): ApiPath<HierarchyPath>,
) -> Result<Json<Vec<HierarchyLink>>, ApiError>
where
  S: MetricsStore + 'static,
{
  listing(&state, access.permissions, PublicLevel::Topic, path).await
}

/// `GET .../topics/{topic}/geography_types`
pub async fn geography_types<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath(path): ApiPath<HierarchyPath>,
) -> Result<Json<Vec<HierarchyLink>>, ApiError>
where
  S: MetricsStore + 'static,
{
  listing(&state, access.permissions, PublicLevel::GeographyType, path).await
}

/// `GET .../geography_types/{geography_type}/geographies`
pub async fn geographies<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath(path): ApiPath<HierarchyPath>,
) -> Result<Json<Vec<HierarchyLink>>, ApiError>
where
  S: MetricsStore + 'static,
{
  listing(&state, access.permissions, PublicLevel::Geography, path).await
}

/// `GET .../geographies/{geography}/metrics`
pub async fn metrics<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath(path): ApiPath<HierarchyPath>,
) -> Result<Json<Vec<HierarchyLink>>, ApiError>
where
  S: MetricsStore + 'static,
{
  listing(&state, access.permissions, PublicLevel::Metric, path).await
}

// ─── Time series ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PublicPath {
  pub theme:          String,
  pub sub_theme:      String,
  pub topic:          String,
  pub geography_type: String,
  pub geography:      String,
  pub metric:         String,
}

/// A row as the public sees it: no ids, embargo or visibility flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTimeSeries {
  pub theme:                     String,
  pub sub_theme:                 String,
  pub topic:                     String,
  pub geography_type:            String,
  pub geography:                 String,
  pub geography_code:            Option<String>,
  pub metric:                    String,
  pub metric_group:              String,
  pub metric_frequency:          String,
  pub stratum:                   String,
  pub age:                       String,
  pub sex:                       String,
  pub year:                      i32,
  pub month:                     Option<u32>,
  pub epiweek:                   u32,
  pub date:                      NaiveDate,
  pub metric_value:              f64,
  pub in_reporting_delay_period: bool,
}

impl From<ApiTimeSeriesRecord> for PublicTimeSeries {
  fn from(r: ApiTimeSeriesRecord) -> Self {
    Self {
      theme:                     r.theme,
      sub_theme:                 r.sub_theme,
      topic:                     r.topic,
      geography_type:            r.geography_type,
      geography:                 r.geography,
      geography_code:            r.geography_code,
      metric:                    r.metric,
      metric_group:              r.metric_group,
      metric_frequency:          r.metric_frequency,
      stratum:                   r.stratum,
      age:                       r.age,
      sex:                       r.sex,
      year:                      r.year,
      month:                     r.month,
      epiweek:                   r.epiweek,
      date:                      r.date,
      metric_value:              r.metric_value,
      in_reporting_delay_period: r.in_reporting_delay_period,
    }
  }
}

/// `GET .../metrics/{metric}`
pub async fn time_series<S>(
  State(state): State<ApiState<S>>,
  access: RequestPermissions,
  ApiPath(path): ApiPath<PublicPath>,
  ApiQuery(paging): ApiQuery<PageParams>,
  ApiQuery(filters): ApiQuery<PublicTimeSeriesFilters>,
) -> Result<Json<Page<PublicTimeSeries>>, ApiError>
where
  S: MetricsStore + 'static,
{
  let query = PublicTimeSeriesQuery {
    theme: path.theme,
    sub_theme: path.sub_theme,
    topic: path.topic,
    geography_type: path.geography_type,
    geography: path.geography,
    metric: path.metric,
    filters,
    page: paging.page(),
    page_size: paging.page_size(),
    permissions: access.permissions.clone(),
    as_of: None,
  };
  let page = state.store.public_time_series(&query).await.map_err(ApiError::store)?;
  Ok(Json(visible_page(page, &access.permissions).map(PublicTimeSeries::from)))
}

/// Drop rows the caller may not see. `count` shrinks by the rows dropped so
/// it never promises rows no page will return.
fn visible_page(mut page: Page<ApiTimeSeriesRecord>, permissions: &[RbacPermission]) -> Page<ApiTimeSeriesRecord> {
  let fetched = page.results.len();
  page.results = filter_visible(page.results, permissions);
  let dropped = fetched - page.results.len();
  if dropped > 0 {
    warn!(dropped, "store returned rows the caller may not see");
    page.count = page.count.saturating_sub(dropped as u64);
  }
  page
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;

  fn record(id: i64, is_public: bool) -> ApiTimeSeriesRecord {
    ApiTimeSeriesRecord {
      id,
      theme: "infectious_disease".into(),
      sub_theme: "respiratory".into(),
      topic: "COVID-19".into(),
      metric: "COVID-19_cases_casesByDay".into(),
      metric_group: "cases".into(),
      metric_frequency: "daily".into(),
      geography_type: "Nation".into(),
      geography: "England".into(),
      geography_code: Some("E92000001".into()),
      stratum: "default".into(),
      age: "all".into(),
      sex: "all".into(),
      year: 2023,
      month: None,
      epiweek: 1,
      date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
      metric_value: 1.0,
      refresh_date: Utc.with_ymd_and_hms(2023, 4, 1, 9, 0, 0).unwrap(),
      embargo: None,
      in_reporting_delay_period: false,
      is_public,
    }
  }

  #[test]
  fn dropped_rows_leave_the_count() {
    let page = Page { count: 3, page: 1, page_size: 50, results: vec![record(1, true), record(2, false), record(3, true)] };
    let page = visible_page(page, &[]);
    assert_eq!(page.count, 2);
    assert_eq!(page.results.iter().map(|r| r.id).collect::<Vec<_>>(), [1, 3]);

    let permitted = RbacPermission { name: "id".into(), theme: Some("infectious_disease".into()), ..Default::default() };
    let page = Page { count: 1, page: 1, page_size: 50, results: vec![record(2, false)] };
    assert_eq!(visible_page(page, &[permitted]).count, 1);
  }

  #[test]
  fn listing_paths_encode_their_ancestors() {
    let path = HierarchyPath {
      theme:          Some("infectious_disease".into()),
      sub_theme:      Some("respiratory".into()),
      topic:          Some("COVID-19".into()),
      geography_type: Some("Lower Tier Local Authority".into()),
      geography:      None,
    };
    assert_eq!(
      path.listing_path(PublicLevel::Geography),
      "/api/public/timeseries/themes/infectious_disease/sub_themes/respiratory/topics/COVID-19\
       /geography_types/Lower%20Tier%20Local%20Authority/geographies"
    );
    assert_eq!(HierarchyPath::default().listing_path(PublicLevel::Theme), "/api/public/timeseries/themes");
  }
}
