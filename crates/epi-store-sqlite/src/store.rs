//! [`SqliteStore`]: the SQLite implementation of [`MetricsStore`].

use std::{collections::HashMap, path::Path};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, Row, ToSql, Transaction};
use tracing::debug;

use epi_core::{
  dimension::{DimensionPath, Sex},
  plots::{ChartAxis, PlotPoint},
  rbac::{PermissionLineage, RbacPermission, validate_permission},
  record::{
    ApiTimeSeriesRecord, HeadlineRecord, NewHeadline, NewTimeSeries, TimeSeriesRecord,
    round_metric_value,
  },
  store::{
    AuditQuery, GeographySummary, HeadlineQuery, MetricsStore, Page, PublicCatalogueQuery,
    PublicLevel, PublicTimeSeriesQuery, TimeSeriesQuery, page_window,
  },
};

use crate::{
  Error, Result,
  encode::{
    RawApiTimeSeries, RawHeadline, RawPoint, RawTimeSeries, encode_date, encode_dt,
  },
  filter::{Filter, flat_column, joined_column},
  schema::SCHEMA,
};

// ─── SQL fragments ───────────────────────────────────────────────────────────

const TIME_SERIES_FROM: &str = "
  FROM core_time_series ts
  JOIN metrics m          ON m.id   = ts.metric_id
  JOIN topics tp          ON tp.id  = m.topic_id
  JOIN sub_themes sth     ON sth.id = tp.sub_theme_id
  JOIN themes th          ON th.id  = sth.theme_id
  JOIN geographies g      ON g.id   = ts.geography_id
  JOIN geography_types gt ON gt.id  = g.geography_type_id
  JOIN ages a             ON a.id   = ts.age_id
  JOIN strata st          ON st.id  = ts.stratum_id";

const HEADLINE_FROM: &str = "
  FROM core_headlines h
  JOIN metrics m          ON m.id   = h.metric_id
  JOIN topics tp          ON tp.id  = m.topic_id
  JOIN sub_themes sth     ON sth.id = tp.sub_theme_id
  JOIN themes th          ON th.id  = sth.theme_id
  JOIN geographies g      ON g.id   = h.geography_id
  JOIN geography_types gt ON gt.id  = g.geography_type_id
  JOIN ages a             ON a.id   = h.age_id
  JOIN strata st          ON st.id  = h.stratum_id";

const TIME_SERIES_COLUMNS: &str = "
  ts.id, th.name, sth.name, tp.name, m.name, ts.metric_frequency, gt.name, g.name,
  g.geography_code, st.name, a.name, ts.sex, ts.year, ts.month, ts.epiweek, ts.date,
  ts.metric_value, ts.refresh_date, ts.embargo, ts.in_reporting_delay_period, ts.is_public";

const HEADLINE_COLUMNS: &str = "
  h.id, th.name, sth.name, tp.name, m.name, gt.name, g.name, g.geography_code, st.name,
  a.name, h.sex, h.period_start, h.period_end, h.metric_value, h.upper_confidence,
  h.lower_confidence, h.refresh_date, h.embargo, h.is_public";

const API_TIME_SERIES_COLUMNS: &str = "
  a.id, a.theme, a.sub_theme, a.topic, a.metric, a.metric_group, a.metric_frequency,
  a.geography_type, a.geography, a.geography_code, a.stratum, a.age, a.sex, a.year,
  a.month, a.epiweek, a.date, a.metric_value, a.refresh_date, a.embargo,
  a.in_reporting_delay_period, a.is_public";

const TIME_SERIES_POINT_COLUMNS: &str = "
  ts.date, ts.refresh_date, a.name, st.name, g.name, ts.sex, ts.metric_value,
  ts.in_reporting_delay_period, NULL, NULL";

const HEADLINE_POINT_COLUMNS: &str = "
  substr(h.period_end, 1, 10), h.refresh_date, a.name, st.name, g.name, h.sex,
  h.metric_value, 0, h.upper_confidence, h.lower_confidence";

fn raw_point(row: &Row<'_>) -> rusqlite::Result<RawPoint> {
  Ok(RawPoint {
    date:                      row.get(0)?,
    refresh_date:              row.get(1)?,
    age:                       row.get(2)?,
    stratum:                   row.get(3)?,
    geography:                 row.get(4)?,
    sex:                       row.get(5)?,
    metric_value:              row.get(6)?,
    in_reporting_delay_period: row.get(7)?,
    upper_confidence:          row.get(8)?,
    lower_confidence:          row.get(9)?,
  })
}

fn raw_permission(row: &Row<'_>) -> rusqlite::Result<RbacPermission> {
  Ok(RbacPermission {
    name:           row.get(0)?,
    theme:          row.get(1)?,
    sub_theme:      row.get(2)?,
    topic:          row.get(3)?,
    metric:         row.get(4)?,
    geography_type: row.get(5)?,
    geography:      row.get(6)?,
  })
}

fn query_all<T>(
  conn: &rusqlite::Connection,
  sql: &str,
  params: &[String],
  map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
  let mut stmt = conn.prepare(sql)?;
  stmt.query_map(rusqlite::params_from_iter(params.iter()), map)?.collect()
}

fn count_all(conn: &rusqlite::Connection, sql: &str, params: &[String]) -> rusqlite::Result<u64> {
  conn.query_row(sql, rusqlite::params_from_iter(params.iter()), |r| r.get::<_, i64>(0))
    .map(|n| n.max(0) as u64)
}

/// Keep the last row per `axis` key (rows arrive ordered oldest first), then
/// order by that key.
fn latest_per_key(raws: Vec<RawPoint>, axis: ChartAxis) -> Vec<RawPoint> {
  let mut latest: HashMap<String, RawPoint> = HashMap::new();
  for raw in raws {
    latest.insert(raw.key(axis), raw);
  }
  let mut points: Vec<RawPoint> = latest.into_values().collect();
  points.sort_by(|a, b| axis.compare_keys(&a.key(axis), &b.key(axis)));
  points
}

/// The `api_time_series` column holding each hierarchy level.
fn level_column(level: PublicLevel) -> &'static str {
  match level {
    PublicLevel::Theme => "a.theme",
    PublicLevel::SubTheme => "a.sub_theme",
    PublicLevel::Topic => "a.topic",
    PublicLevel::GeographyType => "a.geography_type",
    PublicLevel::Geography => "a.geography",
    PublicLevel::Metric => "a.metric",
  }
}

fn raw_geography(row: &Row<'_>) -> rusqlite::Result<GeographySummary> {
  Ok(GeographySummary {
    geography_type: row.get(0)?,
    geography:      row.get(1)?,
    geography_code: row.get(2)?,
  })
}

fn normalise_sex(sex: Option<&str>) -> Option<String> {
  sex.map(|s| Sex::from_inbound(s).to_string())
}

fn headline_filter(query: &HeadlineQuery, now: String) -> Filter {
  let mut f = Filter::new();
  f.eq("tp.name", query.topic.as_str())
    .eq("m.name", query.metric.as_str())
    .eq_opt("g.name", query.geography.as_deref())
    .eq_opt("g.geography_code", query.geography_code.as_deref())
    .eq_opt("gt.name", query.geography_type.as_deref())
    .eq_opt("a.name", query.age.as_deref())
    .eq_opt("h.sex", normalise_sex(query.sex.as_deref()).as_deref())
    .eq_opt("st.name", query.stratum.as_deref())
    .not_embargoed("h.embargo", now)
    .visible("h.is_public", &query.permissions, joined_column);
  f
}

fn audit_filter(query: &AuditQuery, prefix: &str) -> Filter {
  let mut f = Filter::new();
  f.eq("m.name", query.metric.as_str())
    .eq("gt.name", query.geography_type.as_str())
    .eq("g.name", query.geography.as_str())
    .eq("st.name", query.stratum.as_str())
    .eq(&format!("{prefix}.sex"), Sex::from_inbound(&query.sex).to_string())
    .eq("a.name", query.age.as_str());
  f
}

// ─── Write helpers ───────────────────────────────────────────────────────────

/// Resolved dimension keys for one payload.
struct DimensionIds {
  metric_id:    i64,
  geography_id: i64,
  stratum_id:   i64,
  age_id:       i64,
}

fn get_or_create(
  tx: &Transaction<'_>,
  insert: &str,
  select: &str,
  params: &[&dyn ToSql],
) -> rusqlite::Result<i64> {
  tx.execute(insert, params)?;
  tx.query_row(select, params, |r| r.get(0))
}

/// Get-or-create every dimension of `path`, parents first.
fn resolve_dimensions(tx: &Transaction<'_>, path: &DimensionPath) -> rusqlite::Result<DimensionIds> {
  let theme_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO themes (name) VALUES (?1)",
    "SELECT id FROM themes WHERE name = ?1",
    rusqlite::params![path.theme],
  )?;
  let sub_theme_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO sub_themes (name, theme_id) VALUES (?1, ?2)",
    "SELECT id FROM sub_themes WHERE name = ?1 AND theme_id = ?2",
    rusqlite::params![path.sub_theme, theme_id],
  )?;
  let topic_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO topics (name, sub_theme_id) VALUES (?1, ?2)",
    "SELECT id FROM topics WHERE name = ?1 AND sub_theme_id = ?2",
    rusqlite::params![path.topic, sub_theme_id],
  )?;
  let geography_type_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO geography_types (name) VALUES (?1)",
    "SELECT id FROM geography_types WHERE name = ?1",
    rusqlite::params![path.geography_type],
  )?;
  let geography_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO geographies (name, geography_type_id) VALUES (?1, ?2)",
    "SELECT id FROM geographies WHERE name = ?1 AND geography_type_id = ?2",
    rusqlite::params![path.geography, geography_type_id],
  )?;
  if let Some(code) = &path.geography_code {
    tx.execute(
      "UPDATE geographies SET geography_code = ?1 WHERE id = ?2 AND geography_code IS NULL",
      rusqlite::params![code, geography_id],
    )?;
  }
  let metric_group_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO metric_groups (name, topic_id) VALUES (?1, ?2)",
    "SELECT id FROM metric_groups WHERE name = ?1 AND topic_id = ?2",
    rusqlite::params![path.metric_group, topic_id],
  )?;
  let metric_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO metrics (name, topic_id, metric_group_id) VALUES (?1, ?2, ?3)",
    "SELECT id FROM metrics WHERE name = ?1 AND topic_id = ?2 AND metric_group_id = ?3",
    rusqlite::params![path.metric, topic_id, metric_group_id],
  )?;
  let stratum_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO strata (name) VALUES (?1)",
    "SELECT id FROM strata WHERE name = ?1",
    rusqlite::params![path.stratum],
  )?;
  let age_id = get_or_create(
    tx,
    "INSERT OR IGNORE INTO ages (name) VALUES (?1)",
    "SELECT id FROM ages WHERE name = ?1",
    rusqlite::params![path.age],
  )?;

  Ok(DimensionIds { metric_id, geography_id, stratum_id, age_id })
}

/// The parent of a named child, preferring `preferred` when the child name
/// exists under several parents.
fn parent_name(
  conn: &rusqlite::Connection,
  sql: &str,
  child: Option<&str>,
  preferred: Option<&str>,
) -> rusqlite::Result<Option<String>> {
  let Some(child) = child else {
    return Ok(None);
  };
  conn
    .query_row(sql, rusqlite::params![child, preferred.unwrap_or_default()], |r| r.get(0))
    .optional()
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A metrics store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn fetch_points(&self, sql: String, params: Vec<String>) -> Result<Vec<RawPoint>> {
    Ok(self.conn.call(move |conn| Ok(query_all(conn, &sql, &params, raw_point)?)).await?)
  }

  async fn fetch_headlines(&self, sql: String, params: Vec<String>) -> Result<Vec<HeadlineRecord>> {
    let raws = self
      .conn
      .call(move |conn| Ok(query_all(conn, &sql, &params, RawHeadline::from_row)?))
      .await?;
    raws.into_iter().map(RawHeadline::into_record).collect()
  }

  /// Run a count query and a page query sharing one `WHERE` clause.
  async fn fetch_page<R: Send + 'static>(
    &self,
    columns: &'static str,
    from: &'static str,
    filter: Filter,
    order_by: &'static str,
    page: u32,
    page_size: u32,
    map: fn(&Row<'_>) -> rusqlite::Result<R>,
  ) -> Result<(u64, Vec<R>)> {
    let (limit, offset) = page_window(page, page_size);
    let where_clause = filter.where_clause();
    let params = filter.params();
    let count_sql = format!("SELECT COUNT(*) {from} {where_clause}");
    let page_sql = format!(
      "SELECT {columns} {from} {where_clause} ORDER BY {order_by} LIMIT {limit} OFFSET {offset}"
    );

    Ok(
      self
        .conn
        .call(move |conn| {
          let count = count_all(conn, &count_sql, &params)?;
          let rows = query_all(conn, &page_sql, &params, map)?;
          Ok((count, rows))
        })
        .await?,
    )
  }
}

fn page_of<T>(count: u64, page: u32, page_size: u32, results: Vec<T>) -> Page<T> {
  let (limit, offset) = page_window(page, page_size);
  Page { count, page: offset / limit + 1, page_size: limit, results }
}

// ─── MetricsStore impl ───────────────────────────────────────────────────────

impl MetricsStore for SqliteStore {
  type Error = Error;

  // ── Catalogue ─────────────────────────────────────────────────────────────

  async fn is_metric_available_for_topic(&self, topic: &str, metric: &str) -> Result<bool> {
    let (topic, metric) = (topic.to_owned(), metric.to_owned());
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT 1 FROM metrics m JOIN topics tp ON tp.id = m.topic_id
                 WHERE tp.name = ?1 AND m.name = ?2 LIMIT 1",
                rusqlite::params![topic, metric],
                |_| Ok(true),
              )
              .optional()?
              .unwrap_or(false),
          )
        })
        .await?,
    )
  }

  async fn count_time_series(&self, topic: &str, metric: &str) -> Result<u64> {
    let params = vec![topic.to_owned(), metric.to_owned()];
    let sql = format!("SELECT COUNT(*) {TIME_SERIES_FROM} WHERE tp.name = ? AND m.name = ?");
    Ok(self.conn.call(move |conn| Ok(count_all(conn, &sql, &params)?)).await?)
  }

  async fn topic_exists(&self, topic: &str) -> Result<bool> {
    let params = vec![topic.to_owned()];
    let sql = "SELECT COUNT(*) FROM topics WHERE name = ?";
    Ok(self.conn.call(move |conn| Ok(count_all(conn, sql, &params)? > 0)).await?)
  }

  async fn geographies_for_topic(&self, topic: &str) -> Result<Vec<GeographySummary>> {
    let params = vec![topic.to_owned()];
    let sql = "SELECT DISTINCT gt.name, g.name, g.geography_code
       FROM core_time_series ts
       JOIN metrics m          ON m.id  = ts.metric_id
       JOIN topics tp          ON tp.id = m.topic_id
       JOIN geographies g      ON g.id  = ts.geography_id
       JOIN geography_types gt ON gt.id = g.geography_type_id
       WHERE tp.name = ?
       ORDER BY gt.name, g.name";
    Ok(self.conn.call(move |conn| Ok(query_all(conn, sql, &params, raw_geography)?)).await?)
  }

  async fn public_catalogue(&self, query: &PublicCatalogueQuery) -> Result<Vec<String>> {
    let now = encode_dt(query.as_of.unwrap_or_else(Utc::now));
    let mut f = Filter::new();
    f.eq_opt("a.theme", query.theme.as_deref())
      .eq_opt("a.sub_theme", query.sub_theme.as_deref())
      .eq_opt("a.topic", query.topic.as_deref())
      .eq_opt("a.geography_type", query.geography_type.as_deref())
      .eq_opt("a.geography", query.geography.as_deref())
      .not_embargoed("a.embargo", now)
      .visible("a.is_public", &query.permissions, flat_column);

    let column = level_column(query.level);
    let sql = format!(
      "SELECT DISTINCT {column} FROM api_time_series a {} ORDER BY {column}",
      f.where_clause()
    );
    let params = f.params();
    Ok(
      self
        .conn
        .call(move |conn| Ok(query_all(conn, &sql, &params, |row| row.get::<_, String>(0))?))
        .await?,
    )
  }

  // ── Time series reads ─────────────────────────────────────────────────────

  async fn query_time_series(&self, query: &TimeSeriesQuery) -> Result<Vec<PlotPoint>> {
    let now = encode_dt(query.as_of.unwrap_or_else(Utc::now));
    let mut f = Filter::new();
    f.eq("tp.name", query.topic.as_str())
      .eq("m.name", query.metric.as_str())
      .eq_opt("g.name", query.geography.as_deref())
      .eq_opt("gt.name", query.geography_type.as_deref())
      .eq_opt("a.name", query.age.as_deref())
      .eq_opt("ts.sex", normalise_sex(query.sex.as_deref()).as_deref())
      .eq_opt("st.name", query.stratum.as_deref())
      .between("ts.date", encode_date(query.date_from), encode_date(query.date_to))
      .not_embargoed("ts.embargo", now)
      .visible("ts.is_public", &query.permissions, joined_column);

    let sql = format!(
      "SELECT {TIME_SERIES_POINT_COLUMNS} {TIME_SERIES_FROM} {}
       ORDER BY ts.date, ts.refresh_date, ts.id",
      f.where_clause()
    );
    let raws = self.fetch_points(sql, f.params()).await?;
    debug!(topic = %query.topic, metric = %query.metric, rows = raws.len(), "time series query");

    latest_per_key(raws, query.x_axis)
      .into_iter()
      .map(|raw| raw.into_point(query.x_axis))
      .collect()
  }

  async fn download_time_series(&self, query: &TimeSeriesQuery) -> Result<Vec<TimeSeriesRecord>> {
    let now = encode_dt(query.as_of.unwrap_or_else(Utc::now));
    let mut f = Filter::new();
    f.eq("tp.name", query.topic.as_str())
      .eq("m.name", query.metric.as_str())
      .eq_opt("g.name", query.geography.as_deref())
      .eq_opt("gt.name", query.geography_type.as_deref())
      .eq_opt("a.name", query.age.as_deref())
      .eq_opt("ts.sex", normalise_sex(query.sex.as_deref()).as_deref())
      .eq_opt("st.name", query.stratum.as_deref())
      .between("ts.date", encode_date(query.date_from), encode_date(query.date_to))
      .not_embargoed("ts.embargo", now)
      .visible("ts.is_public", &query.permissions, joined_column);

    let sql = format!(
      "SELECT {TIME_SERIES_COLUMNS} {TIME_SERIES_FROM} {}
       ORDER BY ts.date DESC, ts.refresh_date DESC, ts.id DESC",
      f.where_clause()
    );
    let params = f.params();
    let raws = self
      .conn
      .call(move |conn| Ok(query_all(conn, &sql, &params, RawTimeSeries::from_row)?))
      .await?;
    debug!(topic = %query.topic, metric = %query.metric, rows = raws.len(), "download query");
    raws.into_iter().map(RawTimeSeries::into_record).collect()
  }

  async fn public_time_series(
    &self,
    query: &PublicTimeSeriesQuery,
  ) -> Result<Page<ApiTimeSeriesRecord>> {
    let now = encode_dt(query.as_of.unwrap_or_else(Utc::now));
    let filters = &query.filters;
    let mut f = Filter::new();
    f.eq("a.theme", query.theme.as_str())
      .eq("a.sub_theme", query.sub_theme.as_str())
      .eq("a.topic", query.topic.as_str())
      .eq("a.geography_type", query.geography_type.as_str())
      .eq("a.geography", query.geography.as_str())
      .eq("a.metric", query.metric.as_str())
      .eq_opt("a.stratum", filters.stratum.as_deref())
      .eq_opt("a.sex", normalise_sex(filters.sex.as_deref()).as_deref())
      .eq_opt("a.age", filters.age.as_deref())
      .eq_opt("a.year", filters.year.map(|y| y.to_string()).as_deref())
      .eq_opt("a.epiweek", filters.epiweek.map(|w| w.to_string()).as_deref())
      .eq_opt("a.date", filters.date.map(encode_date).as_deref())
      .eq_opt(
        "a.in_reporting_delay_period",
        filters.in_reporting_delay_period.map(|d| if d { "1" } else { "0" }),
      )
      .not_embargoed("a.embargo", now)
      .visible("a.is_public", &query.permissions, flat_column);

    let (count, raws) = self
      .fetch_page(
        API_TIME_SERIES_COLUMNS,
        "FROM api_time_series a",
        f,
        "a.date, a.id",
        query.page,
        query.page_size,
        RawApiTimeSeries::from_row,
      )
      .await?;
    let results = raws.into_iter().map(RawApiTimeSeries::into_record).collect::<Result<_>>()?;
    Ok(page_of(count, query.page, query.page_size, results))
  }

  // ── Headline reads ────────────────────────────────────────────────────────

  async fn latest_headline(&self, query: &HeadlineQuery) -> Result<Option<HeadlineRecord>> {
    let now = encode_dt(query.as_of.unwrap_or_else(Utc::now));
    let f = headline_filter(query, now);
    let sql = format!(
      "SELECT {HEADLINE_COLUMNS} {HEADLINE_FROM} {}
       ORDER BY h.refresh_date DESC, h.period_end DESC, h.id DESC LIMIT 1",
      f.where_clause()
    );
    Ok(self.fetch_headlines(sql, f.params()).await?.into_iter().next())
  }

  async fn query_headline_series(
    &self,
    query: &HeadlineQuery,
    x_axis: ChartAxis,
  ) -> Result<Vec<PlotPoint>> {
    let now = encode_dt(query.as_of.unwrap_or_else(Utc::now));
    let f = headline_filter(query, now);
    let sql = format!(
      "SELECT {HEADLINE_POINT_COLUMNS} {HEADLINE_FROM} {}
       ORDER BY h.period_end, h.refresh_date, h.id",
      f.where_clause()
    );
    let raws = self.fetch_points(sql, f.params()).await?;

    latest_per_key(raws, x_axis).into_iter().map(|raw| raw.into_point(x_axis)).collect()
  }

  async fn latest_headlines_by_geography(
    &self,
    query: &HeadlineQuery,
  ) -> Result<Vec<HeadlineRecord>> {
    let now = encode_dt(query.as_of.unwrap_or_else(Utc::now));
    let f = headline_filter(query, now);
    let sql = format!(
      "SELECT {HEADLINE_COLUMNS} {HEADLINE_FROM} {}
       ORDER BY h.refresh_date, h.period_end, h.id",
      f.where_clause()
    );
    let records = self.fetch_headlines(sql, f.params()).await?;

    let mut latest: HashMap<(String, String), HeadlineRecord> = HashMap::new();
    for record in records {
      latest.insert((record.geography_type.clone(), record.geography.clone()), record);
    }
    let mut out: Vec<HeadlineRecord> = latest.into_values().collect();
    out.sort_by(|a, b| {
      (a.geography_code.is_none(), &a.geography_code, &a.geography)
        .cmp(&(b.geography_code.is_none(), &b.geography_code, &b.geography))
    });
    Ok(out)
  }

  // ── Audit reads ───────────────────────────────────────────────────────────

  async fn audit_time_series(&self, query: &AuditQuery) -> Result<Page<TimeSeriesRecord>> {
    let (count, raws) = self
      .fetch_page(
        TIME_SERIES_COLUMNS,
        TIME_SERIES_FROM,
        audit_filter(query, "ts"),
        "ts.date, ts.refresh_date, ts.id",
        query.page,
        query.page_size,
        RawTimeSeries::from_row,
      )
      .await?;
    let results = raws.into_iter().map(RawTimeSeries::into_record).collect::<Result<_>>()?;
    Ok(page_of(count, query.page, query.page_size, results))
  }

  async fn audit_api_time_series(&self, query: &AuditQuery) -> Result<Page<ApiTimeSeriesRecord>> {
    let mut f = Filter::new();
    f.eq("a.metric", query.metric.as_str())
      .eq("a.geography_type", query.geography_type.as_str())
      .eq("a.geography", query.geography.as_str())
      .eq("a.stratum", query.stratum.as_str())
      .eq("a.sex", Sex::from_inbound(&query.sex).to_string())
      .eq("a.age", query.age.as_str());

    let (count, raws) = self
      .fetch_page(
        API_TIME_SERIES_COLUMNS,
        "FROM api_time_series a",
        f,
        "a.date, a.refresh_date, a.id",
        query.page,
        query.page_size,
        RawApiTimeSeries::from_row,
      )
      .await?;
    let results = raws.into_iter().map(RawApiTimeSeries::into_record).collect::<Result<_>>()?;
    Ok(page_of(count, query.page, query.page_size, results))
  }

  async fn audit_headlines(&self, query: &AuditQuery) -> Result<Page<HeadlineRecord>> {
    let (count, raws) = self
      .fetch_page(
        HEADLINE_COLUMNS,
        HEADLINE_FROM,
        audit_filter(query, "h"),
        "h.period_end, h.refresh_date, h.id",
        query.page,
        query.page_size,
        RawHeadline::from_row,
      )
      .await?;
    let results = raws.into_iter().map(RawHeadline::into_record).collect::<Result<_>>()?;
    Ok(page_of(count, query.page, query.page_size, results))
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn write_time_series(&self, path: &DimensionPath, rows: &[NewTimeSeries]) -> Result<usize> {
    let path = path.clone();
    let rows = rows.to_vec();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let ids = resolve_dimensions(&tx, &path)?;
        let mut inserted = 0;
        {
          let mut core = tx.prepare_cached(
            "INSERT OR IGNORE INTO core_time_series (
               metric_id, geography_id, stratum_id, age_id, sex, metric_frequency,
               year, month, epiweek, date, metric_value, refresh_date, embargo,
               in_reporting_delay_period, is_public, force_write
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
          )?;
          let mut api = tx.prepare_cached(
            "INSERT OR IGNORE INTO api_time_series (
               theme, sub_theme, topic, metric, metric_group, metric_frequency,
               geography_type, geography, geography_code, stratum, age, sex,
               year, month, epiweek, date, metric_value, refresh_date, embargo,
               in_reporting_delay_period, is_public, force_write
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                       ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
          )?;

          for row in &rows {
            let sex = row.sex.to_string();
            let frequency = row.metric_frequency.code();
            let date = encode_date(row.date);
            let value = round_metric_value(row.metric_value);
            let refresh = encode_dt(row.refresh_date);
            let embargo = row.embargo.map(encode_dt);

            inserted += core.execute(rusqlite::params![
              ids.metric_id,
              ids.geography_id,
              ids.stratum_id,
              ids.age_id,
              sex,
              frequency,
              row.year,
              row.month,
              row.epiweek,
              date,
              value,
              refresh,
              embargo,
              row.in_reporting_delay_period,
              row.is_public,
              row.force_write,
            ])?;
            api.execute(rusqlite::params![
              path.theme,
              path.sub_theme,
              path.topic,
              path.metric,
              path.metric_group,
              frequency,
              path.geography_type,
              path.geography,
              path.geography_code,
              path.stratum,
              path.age,
              sex,
              row.year,
              row.month,
              row.epiweek,
              date,
              value,
              refresh,
              embargo,
              row.in_reporting_delay_period,
              row.is_public,
              row.force_write,
            ])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    debug!(%inserted, "time series rows written");
    Ok(inserted)
  }

  async fn write_headlines(&self, path: &DimensionPath, rows: &[NewHeadline]) -> Result<usize> {
    let path = path.clone();
    let rows = rows.to_vec();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let ids = resolve_dimensions(&tx, &path)?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT OR IGNORE INTO core_headlines (
               metric_id, geography_id, stratum_id, age_id, sex, refresh_date, embargo,
               period_start, period_end, metric_value, upper_confidence, lower_confidence,
               is_public, force_write
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
          )?;
          for row in &rows {
            inserted += stmt.execute(rusqlite::params![
              ids.metric_id,
              ids.geography_id,
              ids.stratum_id,
              ids.age_id,
              row.sex.to_string(),
              encode_dt(row.refresh_date),
              row.embargo.map(encode_dt),
              encode_dt(row.period_start),
              encode_dt(row.period_end),
              round_metric_value(row.metric_value),
              row.upper_confidence.map(round_metric_value),
              row.lower_confidence.map(round_metric_value),
              row.is_public,
              row.force_write,
            ])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    debug!(%inserted, "headline rows written");
    Ok(inserted)
  }

  // ── Access control ────────────────────────────────────────────────────────

  async fn create_permission(&self, permission: &RbacPermission) -> Result<i64> {
    let candidate = permission.clone();
    let (lineage, existing) = self
      .conn
      .call(move |conn| {
        let lineage = PermissionLineage {
          sub_theme_theme:          parent_name(
            conn,
            "SELECT th.name FROM sub_themes s JOIN themes th ON th.id = s.theme_id
             WHERE s.name = ?1 ORDER BY th.name = ?2 DESC LIMIT 1",
            candidate.sub_theme.as_deref(),
            candidate.theme.as_deref(),
          )?,
          topic_sub_theme:          parent_name(
            conn,
            "SELECT sth.name FROM topics tp JOIN sub_themes sth ON sth.id = tp.sub_theme_id
             WHERE tp.name = ?1 ORDER BY sth.name = ?2 DESC LIMIT 1",
            candidate.topic.as_deref(),
            candidate.sub_theme.as_deref(),
          )?,
          topic_theme:              parent_name(
            conn,
            "SELECT th.name FROM topics tp
             JOIN sub_themes sth ON sth.id = tp.sub_theme_id
             JOIN themes th      ON th.id  = sth.theme_id
             WHERE tp.name = ?1 ORDER BY th.name = ?2 DESC LIMIT 1",
            candidate.topic.as_deref(),
            candidate.theme.as_deref(),
          )?,
          metric_topic:             parent_name(
            conn,
            "SELECT tp.name FROM metrics m JOIN topics tp ON tp.id = m.topic_id
             WHERE m.name = ?1 ORDER BY tp.name = ?2 DESC LIMIT 1",
            candidate.metric.as_deref(),
            candidate.topic.as_deref(),
          )?,
          geography_geography_type: parent_name(
            conn,
            "SELECT gt.name FROM geographies g
             JOIN geography_types gt ON gt.id = g.geography_type_id
             WHERE g.name = ?1 ORDER BY gt.name = ?2 DESC LIMIT 1",
            candidate.geography.as_deref(),
            candidate.geography_type.as_deref(),
          )?,
        };
        let existing = query_all(
          conn,
          "SELECT name, theme, sub_theme, topic, metric, geography_type, geography
           FROM rbac_permissions",
          &[],
          raw_permission,
        )?;
        Ok((lineage, existing))
      })
      .await?;

    validate_permission(permission, &lineage, &existing)?;

    let p = permission.clone();
    let id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO rbac_permissions
             (name, theme, sub_theme, topic, metric, geography_type, geography)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            p.name,
            p.theme,
            p.sub_theme,
            p.topic,
            p.metric,
            p.geography_type,
            p.geography
          ],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;
    Ok(id)
  }

  async fn create_group(&self, name: &str) -> Result<i64> {
    let name = name.to_owned();
    Ok(
      self
        .conn
        .call(move |conn| {
          conn.execute(
            "INSERT OR IGNORE INTO rbac_groups (name) VALUES (?1)",
            rusqlite::params![name],
          )?;
          Ok(conn.query_row(
            "SELECT id FROM rbac_groups WHERE name = ?1",
            rusqlite::params![name],
            |r| r.get(0),
          )?)
        })
        .await?,
    )
  }

  async fn add_permission_to_group(&self, group_id: i64, permission_name: &str) -> Result<()> {
    let name = permission_name.to_owned();
    let lookup = name.clone();
    let (group, permission): (Option<i64>, Option<i64>) = self
      .conn
      .call(move |conn| {
        let group = conn
          .query_row("SELECT id FROM rbac_groups WHERE id = ?1", [group_id], |r| r.get(0))
          .optional()?;
        let permission = conn
          .query_row(
            "SELECT id FROM rbac_permissions WHERE name = ?1",
            rusqlite::params![lookup],
            |r| r.get(0),
          )
          .optional()?;
        Ok((group, permission))
      })
      .await?;

    let group_id = group.ok_or(Error::GroupNotFound(group_id))?;
    let permission_id = permission.ok_or(Error::PermissionNotFound(name))?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO rbac_group_permissions (group_id, permission_id) VALUES (?1, ?2)",
          rusqlite::params![group_id, permission_id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn group_permissions(&self, group_id: i64) -> Result<Vec<RbacPermission>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          let mut stmt = conn.prepare(
            "SELECT p.name, p.theme, p.sub_theme, p.topic, p.metric, p.geography_type, p.geography
             FROM rbac_permissions p
             JOIN rbac_group_permissions gp ON gp.permission_id = p.id
             WHERE gp.group_id = ?1
             ORDER BY p.name",
          )?;
          let rows = stmt
            .query_map([group_id], raw_permission)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?,
    )
  }

  // ── Health ────────────────────────────────────────────────────────────────

  async fn ping(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
