//! The `MetricsStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `epi-store-sqlite`).
//! The API and the ingestion worker depend on this abstraction, not on any
//! concrete backend.
//!
//! Every read except the audit family applies the same visibility rules:
//!
//! 1. rows whose `embargo` is later than `as_of` (default: now) are hidden;
//! 2. rows with `is_public = false` are hidden unless a permission in the
//!    query's permission set authorises the row's tuple.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

use crate::{
  dimension::DimensionPath,
  plots::{ChartAxis, PlotPoint},
  rbac::RbacPermission,
  record::{ApiTimeSeriesRecord, HeadlineRecord, NewHeadline, NewTimeSeries, TimeSeriesRecord},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Parameters for [`MetricsStore::query_time_series`].
#[derive(Debug, Clone)]
pub struct TimeSeriesQuery {
  pub topic:          String,
  pub metric:         String,
  pub geography:      Option<String>,
  pub geography_type: Option<String>,
  pub age:            Option<String>,
  pub sex:            Option<String>,
  pub stratum:        Option<String>,
  pub date_from:      NaiveDate,
  pub date_to:        NaiveDate,
  /// Field the points are keyed and ordered by. For any axis other than
  /// `date`, only the latest-dated row per key is kept.
  pub x_axis:         ChartAxis,
  pub permissions:    Vec<RbacPermission>,
  /// Point in time for the embargo check; `None` means now.
  pub as_of:          Option<DateTime<Utc>>,
}

/// Parameters for the headline reads. Unset filters match anything.
#[derive(Debug, Clone, Default)]
pub struct HeadlineQuery {
  pub topic:          String,
  pub metric:         String,
  pub geography:      Option<String>,
  pub geography_code: Option<String>,
  pub geography_type: Option<String>,
  pub age:            Option<String>,
  pub sex:            Option<String>,
  pub stratum:        Option<String>,
  pub permissions:    Vec<RbacPermission>,
  pub as_of:          Option<DateTime<Utc>>,
}

/// Parameters for the audit reads. These bypass the embargo check.
#[derive(Debug, Clone)]
pub struct AuditQuery {
  pub metric:         String,
  pub geography_type: String,
  pub geography:      String,
  pub stratum:        String,
  pub sex:            String,
  pub age:            String,
  pub page:           u32,
  pub page_size:      u32,
}

/// Parameters for [`MetricsStore::public_time_series`].
#[derive(Debug, Clone)]
pub struct PublicTimeSeriesQuery {
  pub theme:          String,
  pub sub_theme:      String,
  pub topic:          String,
  pub geography_type: String,
  pub geography:      String,
  pub metric:         String,
  pub filters:        PublicTimeSeriesFilters,
  pub page:           u32,
  pub page_size:      u32,
  pub permissions:    Vec<RbacPermission>,
  pub as_of:          Option<DateTime<Utc>>,
}

/// Optional column filters on the public time series, read from the query
/// string. Unset filters match anything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PublicTimeSeriesFilters {
  pub stratum:                   Option<String>,
  pub sex:                       Option<String>,
  pub age:                       Option<String>,
  pub year:                      Option<i32>,
  pub epiweek:                   Option<u32>,
  pub date:                      Option<NaiveDate>,
  pub in_reporting_delay_period: Option<bool>,
}

/// A level of the browsable public hierarchy, top first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PublicLevel {
  Theme,
  SubTheme,
  Topic,
  GeographyType,
  Geography,
  Metric,
}

impl PublicLevel {
  /// The level below this one, `None` for metrics.
  pub fn next(self) -> Option<Self> {
    match self {
      PublicLevel::Theme => Some(PublicLevel::SubTheme),
      PublicLevel::SubTheme => Some(PublicLevel::Topic),
      PublicLevel::Topic => Some(PublicLevel::GeographyType),
      PublicLevel::GeographyType => Some(PublicLevel::Geography),
      PublicLevel::Geography => Some(PublicLevel::Metric),
      PublicLevel::Metric => None,
    }
  }

  /// The plural path segment listing this level, e.g. `sub_themes`.
  pub fn segment(self) -> &'static str {
    match self {
      PublicLevel::Theme => "themes",
      PublicLevel::SubTheme => "sub_themes",
      PublicLevel::Topic => "topics",
      PublicLevel::GeographyType => "geography_types",
      PublicLevel::Geography => "geographies",
      PublicLevel::Metric => "metrics",
    }
  }
}

/// Parameters for [`MetricsStore::public_catalogue`]: the distinct values
/// of `level` under the given ancestors. Ancestors left unset match
/// anything.
#[derive(Debug, Clone)]
pub struct PublicCatalogueQuery {
  pub level:          PublicLevel,
  pub theme:          Option<String>,
  pub sub_theme:      Option<String>,
  pub topic:          Option<String>,
  pub geography_type: Option<String>,
  pub geography:      Option<String>,
  pub permissions:    Vec<RbacPermission>,
  pub as_of:          Option<DateTime<Utc>>,
}

/// A geography holding data for some topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeographySummary {
  pub geography_type: String,
  pub geography:      String,
  pub geography_code: Option<String>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// One page of results. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
  pub count:     u64,
  pub page:      u32,
  pub page_size: u32,
  pub results:   Vec<T>,
}

impl<T> Page<T> {
  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      count:     self.count,
      page:      self.page,
      page_size: self.page_size,
      results:   self.results.into_iter().map(f).collect(),
    }
  }
}

/// Clamp page parameters and return `(limit, offset)`.
pub fn page_window(page: u32, page_size: u32) -> (u32, u32) {
  let page_size = page_size.clamp(1, 1000);
  let page = page.max(1);
  (page_size, (page - 1).saturating_mul(page_size))
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a metrics store backend.
///
/// Fact rows are insert-only. Writes are idempotent: a row identical to an
/// existing one (over the uniqueness key) is discarded unless it is written
/// with `force_write`.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait MetricsStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Catalogue ─────────────────────────────────────────────────────────

  /// Whether `metric` exists under `topic`.
  fn is_metric_available_for_topic<'a>(
    &'a self,
    topic: &'a str,
    metric: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Number of time-series rows for a topic/metric pair, ignoring
  /// visibility.
  fn count_time_series<'a>(
    &'a self,
    topic: &'a str,
    metric: &'a str,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  /// Whether any topic of that name exists.
  fn topic_exists<'a>(&'a self, topic: &'a str) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Every geography with time-series rows for `topic`, ordered by
  /// geography type then name.
  fn geographies_for_topic<'a>(
    &'a self,
    topic: &'a str,
  ) -> impl Future<Output = Result<Vec<GeographySummary>, Self::Error>> + Send + 'a;

  /// Distinct visible values of one level of the public hierarchy, sorted.
  fn public_catalogue<'a>(
    &'a self,
    query: &'a PublicCatalogueQuery,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  // ── Time series reads ─────────────────────────────────────────────────

  /// Visible time-series points matching `query`, sorted ascending by the
  /// x axis. Age keys are rendered as display ranges in natural order.
  fn query_time_series<'a>(
    &'a self,
    query: &'a TimeSeriesQuery,
  ) -> impl Future<Output = Result<Vec<PlotPoint>, Self::Error>> + Send + 'a;

  /// Every visible time-series row matching `query`, newest date first.
  /// `x_axis` is ignored: nothing is collapsed per key.
  fn download_time_series<'a>(
    &'a self,
    query: &'a TimeSeriesQuery,
  ) -> impl Future<Output = Result<Vec<TimeSeriesRecord>, Self::Error>> + Send + 'a;

  /// A page of public-API rows for one fully-specified tuple, ordered by
  /// date. Visibility rules apply.
  fn public_time_series<'a>(
    &'a self,
    query: &'a PublicTimeSeriesQuery,
  ) -> impl Future<Output = Result<Page<ApiTimeSeriesRecord>, Self::Error>> + Send + 'a;

  // ── Headline reads ────────────────────────────────────────────────────

  /// The visible headline with the latest `refresh_date`, or `None`.
  fn latest_headline<'a>(
    &'a self,
    query: &'a HeadlineQuery,
  ) -> impl Future<Output = Result<Option<HeadlineRecord>, Self::Error>> + Send + 'a;

  /// The latest visible headline per `x_axis` key, as plot points ordered by
  /// that key.
  fn query_headline_series<'a>(
    &'a self,
    query: &'a HeadlineQuery,
    x_axis: ChartAxis,
  ) -> impl Future<Output = Result<Vec<PlotPoint>, Self::Error>> + Send + 'a;

  /// The latest visible headline per geography, ordered by geography code.
  fn latest_headlines_by_geography<'a>(
    &'a self,
    query: &'a HeadlineQuery,
  ) -> impl Future<Output = Result<Vec<HeadlineRecord>, Self::Error>> + Send + 'a;

  // ── Audit reads (embargo ignored) ─────────────────────────────────────

  fn audit_time_series<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Page<TimeSeriesRecord>, Self::Error>> + Send + 'a;

  fn audit_api_time_series<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Page<ApiTimeSeriesRecord>, Self::Error>> + Send + 'a;

  fn audit_headlines<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Page<HeadlineRecord>, Self::Error>> + Send + 'a;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Get-or-create every dimension in `path`, then insert `rows` and their
  /// public projections in one transaction. Returns the number of rows
  /// actually inserted.
  fn write_time_series<'a>(
    &'a self,
    path: &'a DimensionPath,
    rows: &'a [NewTimeSeries],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// As [`MetricsStore::write_time_series`], for headline rows.
  fn write_headlines<'a>(
    &'a self,
    path: &'a DimensionPath,
    rows: &'a [NewHeadline],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  // ── Access control ────────────────────────────────────────────────────

  /// Validate and persist a permission. Returns its id.
  fn create_permission<'a>(
    &'a self,
    permission: &'a RbacPermission,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;

  /// Create a group, or return the id of the existing group of that name.
  fn create_group<'a>(
    &'a self,
    name: &'a str,
  ) -> impl Future<Output = Result<i64, Self::Error>> + Send + 'a;

  fn add_permission_to_group<'a>(
    &'a self,
    group_id: i64,
    permission_name: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Permissions held by a group; empty for an unknown group.
  fn group_permissions(
    &self,
    group_id: i64,
  ) -> impl Future<Output = Result<Vec<RbacPermission>, Self::Error>> + Send + '_;

  // ── Health ────────────────────────────────────────────────────────────

  /// Cheap round trip proving the connection is usable.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
