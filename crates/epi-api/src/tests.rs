//! Router tests against an in-memory `SqliteStore`.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use epi_core::{
  app_mode::AppMode,
  dimension::{DimensionPath, MetricFrequency, Sex},
  record::{NewHeadline, NewTimeSeries},
  store::MetricsStore,
};
use epi_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::{ApiSettings, ApiState, ResponseCache, api_router, audit_router, health_router, public_router};

// ─── Fixtures ────────────────────────────────────────────────────────────────

const CASES: &str = "COVID-19_cases_casesByDay";
const DEATHS_CHANGE: &str = "COVID-19_headline_ONSdeaths_7DayChange";

fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

fn refreshed() -> DateTime<Utc> { Utc.with_ymd_and_hms(2023, 4, 1, 9, 0, 0).unwrap() }

fn covid_path(metric: &str, metric_group: &str) -> DimensionPath {
  DimensionPath {
    theme:          "infectious_disease".into(),
    sub_theme:      "respiratory".into(),
    topic:          "COVID-19".into(),
    metric_group:   metric_group.into(),
    metric:         metric.into(),
    geography_type: "Nation".into(),
    geography:      "England".into(),
    geography_code: Some("E92000001".into()),
    age:            "all".into(),
    stratum:        "default".into(),
  }
}

fn heat_path(geography: &str, code: &str) -> DimensionPath {
  DimensionPath {
    theme:          "climate_and_environment".into(),
    sub_theme:      "seasonal_environmental".into(),
    topic:          "Heat-alert".into(),
    metric_group:   "headline".into(),
    metric:         "Heat-alert_headline_matrixNumber".into(),
    geography_type: "UKHSA Region".into(),
    geography:      geography.into(),
    geography_code: Some(code.into()),
    age:            "all".into(),
    stratum:        "default".into(),
  }
}

fn daily(date: NaiveDate, value: f64) -> NewTimeSeries {
  NewTimeSeries {
    metric_frequency:          MetricFrequency::Daily,
    sex:                       Sex::All,
    year:                      2023,
    month:                     None,
    epiweek:                   1,
    date,
    metric_value:              value,
    refresh_date:              refreshed(),
    embargo:                   None,
    in_reporting_delay_period: false,
    is_public:                 true,
    force_write:               false,
  }
}

fn headline(
  value: f64,
  period_start: DateTime<Utc>,
  period_end: DateTime<Utc>,
  embargo: Option<DateTime<Utc>>,
) -> NewHeadline {
  NewHeadline {
    sex: Sex::All,
    period_start,
    period_end,
    metric_value: value,
    upper_confidence: None,
    lower_confidence: None,
    refresh_date: refreshed(),
    embargo,
    is_public: true,
    force_write: false,
  }
}

/// 90 daily case rows across Q1 2023.
async fn seeded_store() -> SqliteStore {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  let rows: Vec<_> = (0..90).map(|i| daily(day(2023, 1, 1) + Duration::days(i), i as f64)).collect();
  store.write_time_series(&covid_path(CASES, "cases"), &rows).await.unwrap();
  store
}

fn state(store: SqliteStore, cache: ResponseCache) -> ApiState<SqliteStore> {
  let settings = ApiSettings { app_mode: AppMode::PrivateApi, ..Default::default() };
  ApiState::new(Arc::new(store), cache, settings)
}

fn app(state: ApiState<SqliteStore>) -> Router {
  health_router(state.clone())
    .merge(api_router(state.clone()))
    .merge(audit_router(state.clone()))
    .merge(public_router(state))
}

async fn oneshot_raw(
  app: Router,
  method: &str,
  uri: &str,
  headers: Vec<(&str, &str)>,
  body: &str,
) -> axum::response::Response {
  let mut builder = Request::builder().method(method).uri(uri).header(header::CONTENT_TYPE, "application/json");
  for (k, v) in headers {
    builder = builder.header(k, v);
  }
  let req = builder.body(Body::from(body.to_string())).unwrap();
  app.oneshot(req).await.unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

fn cases_chart_request() -> String {
  json!({
    "file_format": "svg",
    "chart_width": 515,
    "chart_height": 220,
    "plots": [{
      "chart_type": "line_multi_coloured",
      "topic": "COVID-19",
      "metric": CASES,
      "geography": "England",
      "geography_type": "Nation",
      "date_from": "2023-01-01",
      "date_to": "2023-03-31",
    }],
  })
  .to_string()
}

// ── Charts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn chart_draws_every_day_and_reports_last_updated() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let resp = oneshot_raw(app, "POST", "/api/charts/v3", vec![], &cases_chart_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let body = json_body(resp).await;
  assert_eq!(body["last_updated"], "2023-03-31");
  assert_eq!(body["figure"]["data"][0]["x"].as_array().unwrap().len(), 90);
  assert!(body["chart"].as_str().unwrap().starts_with("%3Csvg"));
  assert!(!body["alt_text"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn chart_preview_returns_image_bytes() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let resp = oneshot_raw(app, "POST", "/api/charts/v3?preview=true", vec![], &cases_chart_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "image/svg+xml");
}

#[tokio::test]
async fn chart_for_unknown_metric_is_a_bad_request() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let body = json!({
    "plots": [{ "chart_type": "line_multi_coloured", "topic": "COVID-19", "metric": "COVID-19_deaths_ONSByDay" }],
  });
  let resp = oneshot_raw(app, "POST", "/api/charts/v3", vec![], &body.to_string()).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(resp).await["error_message"].is_string());
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let resp = oneshot_raw(app, "POST", "/api/charts/v3", vec![], "{\"plots\": 12").await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(resp).await["error_message"].is_string());
}

// ── Tables ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn table_has_one_row_per_date() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let resp = oneshot_raw(app, "POST", "/api/tables/v2", vec![], &cases_chart_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let rows = json_body(resp).await;
  let rows = rows.as_array().unwrap();
  assert_eq!(rows.len(), 90);
  assert_eq!(rows[0]["values"][0]["label"], "Plot1");
}

#[tokio::test]
async fn table_without_plots_is_a_bad_request() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let resp = oneshot_raw(app, "POST", "/api/tables/v2", vec![], r#"{"plots": []}"#).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

fn geography_subplots(geographies: &[&str], date_to: &str) -> String {
  let plots: Vec<Value> = geographies
    .iter()
    .map(|g| {
      json!({
        "chart_type": "bar",
        "topic": "COVID-19",
        "metric": CASES,
        "geography": g,
        "date_from": "2023-01-01",
        "date_to": date_to,
      })
    })
    .collect();
  let subplot = |title: &str| json!({"subplot_title": title, "x_axis": "geography", "plots": plots});
  json!({"file_format": "svg", "subplots": [subplot("A"), subplot("B"), subplot("C")]}).to_string()
}

#[tokio::test]
async fn subplot_table_keeps_groups_without_data() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let body = geography_subplots(&["England", "London", "Leeds"], "2023-03-31");
  let resp = oneshot_raw(app, "POST", "/api/tables/subplot/v1", vec![], &body).await;
  assert_eq!(resp.status(), StatusCode::OK);

  let rows = json_body(resp).await;
  let rows = rows.as_array().unwrap();
  let references: Vec<&str> = rows.iter().map(|r| r["reference"].as_str().unwrap()).collect();
  assert_eq!(references, vec!["England", "London", "Leeds"]);
  for row in rows {
    let values = row["values"].as_array().unwrap();
    let labels: Vec<&str> = values.iter().map(|v| v["label"].as_str().unwrap()).collect();
    assert_eq!(labels, vec!["A", "B", "C"]);
  }
  assert!(rows[0]["values"].as_array().unwrap().iter().all(|v| v["value"].is_number()));
  assert!(rows[1]["values"].as_array().unwrap().iter().all(|v| v["value"].is_null()));
  assert!(rows[2]["values"].as_array().unwrap().iter().all(|v| v["value"].is_null()));
}

#[tokio::test]
async fn subplot_table_nulls_invalid_cells() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  // date_to before date_from
  let body = geography_subplots(&["England"], "2022-12-01");
  let resp = oneshot_raw(app.clone(), "POST", "/api/tables/subplot/v1", vec![], &body).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let mut request: Value = serde_json::from_str(&geography_subplots(&["England"], "2023-03-31")).unwrap();
  request["subplots"][1]["plots"][0]["date_to"] = json!("2022-12-01");
  let resp = oneshot_raw(app, "POST", "/api/tables/subplot/v1", vec![], &request.to_string()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let rows = json_body(resp).await;
  assert_eq!(rows[0]["values"][0]["value"], rows[0]["values"][2]["value"]);
  assert!(rows[0]["values"][1]["value"].is_null());
}

// ── Downloads ────────────────────────────────────────────────────────────────

fn cases_download(file_format: &str, geography: &str) -> Value {
  json!({
    "file_format": file_format,
    "plots": [{
      "topic": "COVID-19",
      "metric": CASES,
      "geography": geography,
      "geography_type": "Nation",
      "date_from": "2023-03-01",
      "date_to": "2023-03-31",
    }],
  })
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
  axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec()
}

#[tokio::test]
async fn csv_download_lists_rows_newest_first() {
  let app = app(state(seeded_store().await, ResponseCache::memory()));
  let request = cases_download("csv", "England").to_string();
  let resp = oneshot_raw(app, "POST", "/api/downloads/v2", vec![], &request).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/csv");
  assert_eq!(resp.headers()[header::CONTENT_DISPOSITION], "attachment; filename=\"chart_download.csv\"");

  let text = String::from_utf8(body_bytes(resp).await).unwrap();
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(lines.len(), 32);
  assert!(lines[0].starts_with("theme,sub_theme,topic,geography_type,geography,metric,"));
  assert!(lines[1].ends_with(",2023,2023-03-31,89.0000,False"));
  assert!(lines[31].contains(",2023-03-01,"));
}

#[tokio::test]
async fn json_download_and_missing_data() {
  let state = state(seeded_store().await, ResponseCache::PassThrough);
  let request = cases_download("json", "England").to_string();
  let resp = oneshot_raw(app(state.clone()), "POST", "/api/downloads/v2", vec![], &request).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let rows = json_body(resp).await;
  assert_eq!(rows.as_array().unwrap().len(), 31);
  assert_eq!(rows[0]["metric_value"], 89.0);
  assert_eq!(rows[0]["in_reporting_delay_period"], false);

  let request = cases_download("json", "Wales").to_string();
  let resp = oneshot_raw(app(state.clone()), "POST", "/api/downloads/v2", vec![], &request).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let request = cases_download("xlsx", "England").to_string();
  let resp = oneshot_raw(app(state), "POST", "/api/downloads/v2", vec![], &request).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subplot_download_skips_groups_without_rows() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let mut request: Value = serde_json::from_str(&geography_subplots(&["England", "London"], "2023-03-31")).unwrap();
  request["file_format"] = json!("json");
  let resp = oneshot_raw(app.clone(), "POST", "/api/downloads/subplot/v1", vec![], &request.to_string()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let groups = json_body(resp).await;
  let groups = groups.as_array().unwrap();
  assert_eq!(groups.len(), 1);
  // Three subplots share the England plot; its rows appear once.
  assert_eq!(groups[0].as_array().unwrap().len(), 90);

  request["file_format"] = json!("csv");
  let resp = oneshot_raw(app, "POST", "/api/downloads/subplot/v1", vec![], &request.to_string()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let text = String::from_utf8(body_bytes(resp).await).unwrap();
  assert_eq!(text.lines().count(), 91);
}

#[tokio::test]
async fn bulk_download_archives_charts_with_data() {
  use std::io::Read as _;

  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let chart = |name: &str, geography: &str| {
    let mut chart = cases_download("csv", geography);
    chart["name"] = json!(name);
    chart
  };
  let request = json!({
    "file_format": "csv",
    "charts": [chart("Cases in England", "England"), chart("Cases in Wales", "Wales")],
  });
  let resp = oneshot_raw(app.clone(), "POST", "/api/bulkdownloads/v1", vec![], &request.to_string()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/gzip");

  let bytes = body_bytes(resp).await;
  let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(bytes.as_slice()));
  let mut names = Vec::new();
  for entry in tarball.entries().unwrap() {
    let mut entry = entry.unwrap();
    names.push(entry.path().unwrap().to_string_lossy().into_owned());
    let mut contents = String::new();
    entry.read_to_string(&mut contents).unwrap();
    assert_eq!(contents.lines().count(), 32);
  }
  assert_eq!(names, ["Cases_in_England.csv"]);

  let empty = json!({ "charts": [chart("Cases in Wales", "Wales")] });
  let resp = oneshot_raw(app, "POST", "/api/bulkdownloads/v1", vec![], &empty.to_string()).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Geographies ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn geographies_are_grouped_by_type() {
  let state = state(seeded_store().await, ResponseCache::PassThrough);
  let resp = oneshot_raw(app(state.clone()), "GET", "/api/geographies/v2/COVID-19", vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(
    json_body(resp).await,
    json!([{ "geography_type": "Nation", "geographies": [{ "name": "England", "geography_code": "E92000001" }] }])
  );

  let resp = oneshot_raw(app(state), "GET", "/api/geographies/v2/Measles", vec![], "").await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Cache ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cache_check_on_a_cold_cache_is_a_server_error() {
  let app = app(state(seeded_store().await, ResponseCache::memory()));
  let resp = oneshot_raw(app, "POST", "/api/charts/v3", vec![("Cache-Check", "true")], &cases_chart_request()).await;
  assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(json_body(resp).await["error_message"], "Cache entry not found for the given request");
}

#[tokio::test]
async fn cache_check_after_a_request_is_a_hit() {
  let state = state(seeded_store().await, ResponseCache::memory());
  let first = oneshot_raw(app(state.clone()), "POST", "/api/charts/v3", vec![], &cases_chart_request()).await;
  assert_eq!(first.status(), StatusCode::OK);

  let check =
    oneshot_raw(app(state), "POST", "/api/charts/v3", vec![("Cache-Check", "true")], &cases_chart_request()).await;
  assert_eq!(check.status(), StatusCode::OK);
  assert_eq!(json_body(check).await["last_updated"], "2023-03-31");
}

// ── Headlines and audit ──────────────────────────────────────────────────────

#[tokio::test]
async fn embargoed_headline_is_visible_only_to_audit() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let embargo = Utc::now() + Duration::days(7);
  let start = Utc.with_ymd_and_hms(2023, 3, 25, 0, 0, 0).unwrap();
  let end = Utc.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap();
  store
    .write_headlines(&covid_path(DEATHS_CHANGE, "headline"), &[headline(-12.0, start, end, Some(embargo))])
    .await
    .unwrap();
  let state = state(store, ResponseCache::PassThrough);

  let request = json!({ "topic": "COVID-19", "metric": DEATHS_CHANGE, "geography": "England" }).to_string();
  let resp = oneshot_raw(app(state.clone()), "POST", "/api/headlines/v2", vec![], &request).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let uri = format!("/api/audit/v1/core-headline/{DEATHS_CHANGE}/Nation/England/default/all/all");
  let resp = oneshot_raw(app(state), "GET", &uri, vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);
  let page = json_body(resp).await;
  assert_eq!(page["count"], 1);
  assert_eq!(page["results"][0]["metric_value"], -12.0);
}

#[tokio::test]
async fn released_headline_returns_value_and_period_end() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let start = Utc.with_ymd_and_hms(2023, 3, 25, 0, 0, 0).unwrap();
  let end = Utc.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap();
  store.write_headlines(&covid_path(DEATHS_CHANGE, "headline"), &[headline(-12.0, start, end, None)]).await.unwrap();

  let request = json!({ "topic": "COVID-19", "metric": DEATHS_CHANGE, "geography": "" }).to_string();
  let resp = oneshot_raw(app(state(store, ResponseCache::PassThrough)), "POST", "/api/headlines/v2", vec![], &request)
    .await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await, json!({ "metric_value": -12.0, "period_end": "2023-03-31" }));
}

#[tokio::test]
async fn headline_endpoint_rejects_timeseries_metrics() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let request = json!({ "topic": "COVID-19", "metric": CASES }).to_string();
  let resp = oneshot_raw(app, "POST", "/api/headlines/v2", vec![], &request).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn audit_rejects_unknown_kind() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let uri = format!("/api/audit/v1/everything/{CASES}/Nation/England/default/all/all");
  let resp = oneshot_raw(app, "GET", &uri, vec![], "").await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Public API ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn public_time_series_is_paginated() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let uri = format!(
    "/api/public/timeseries/themes/infectious_disease/sub_themes/respiratory/topics/COVID-19\
     /geography_types/Nation/geographies/England/metrics/{CASES}?page=2&page_size=30"
  );
  let resp = oneshot_raw(app, "GET", &uri, vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);

  let page = json_body(resp).await;
  assert_eq!(page["count"], 90);
  assert_eq!(page["results"].as_array().unwrap().len(), 30);
  assert_eq!(page["results"][0]["date"], "2023-01-31");
  assert!(page["results"][0].get("is_public").is_none());
}

#[tokio::test]
async fn public_hierarchy_links_lead_to_the_series() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let mut uri = "/api/public/timeseries".to_owned();
  let resp = oneshot_raw(app.clone(), "GET", &uri, vec![], "").await;
  uri = json_body(resp).await["links"]["themes"].as_str().unwrap().to_owned();

  let expected = ["infectious_disease", "respiratory", "COVID-19", "Nation", "England", CASES];
  for name in expected {
    let resp = oneshot_raw(app.clone(), "GET", &uri, vec![], "").await;
    assert_eq!(resp.status(), StatusCode::OK, "{uri}");
    let links = json_body(resp).await;
    assert_eq!(links.as_array().unwrap().len(), 1);
    assert_eq!(links[0]["name"], name);
    uri = links[0]["link"].as_str().unwrap().to_owned();
  }

  let resp = oneshot_raw(app, "GET", &uri, vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["count"], 90);
}

#[tokio::test]
async fn public_filters_and_hidden_rows_shape_the_count() {
  let store = seeded_store().await;
  let mut hidden = daily(day(2023, 4, 1), 1.0);
  hidden.is_public = false;
  store.write_time_series(&covid_path(CASES, "cases"), &[hidden]).await.unwrap();
  let app = app(state(store, ResponseCache::PassThrough));
  let base = format!(
    "/api/public/timeseries/themes/infectious_disease/sub_themes/respiratory/topics/COVID-19\
     /geography_types/Nation/geographies/England/metrics/{CASES}"
  );

  let resp = oneshot_raw(app.clone(), "GET", &base, vec![], "").await;
  let page = json_body(resp).await;
  assert_eq!(page["count"], 90);

  let resp = oneshot_raw(app.clone(), "GET", &format!("{base}?date=2023-01-05&page_size=10"), vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);
  let page = json_body(resp).await;
  assert_eq!(page["count"], 1);
  assert_eq!(page["results"][0]["metric_value"], 4.0);

  let resp = oneshot_raw(app.clone(), "GET", &format!("{base}?in_reporting_delay_period=true"), vec![], "").await;
  assert_eq!(json_body(resp).await["count"], 0);

  let resp = oneshot_raw(app, "GET", &format!("{base}?year=twenty"), vec![], "").await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Alerts ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn heat_alerts_report_live_and_expired_status() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let now = Utc::now();
  store
    .write_headlines(&heat_path("North East", "E12000001"), &[headline(16.0, now - Duration::days(1), now + Duration::days(2), None)])
    .await
    .unwrap();
  store
    .write_headlines(&heat_path("London", "E12000007"), &[headline(16.0, now - Duration::days(5), now - Duration::days(2), None)])
    .await
    .unwrap();
  let state = state(store, ResponseCache::PassThrough);

  let resp = oneshot_raw(app(state.clone()), "GET", "/api/alerts/v1/heat/E12000001", vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);
  let detail = json_body(resp).await;
  assert_eq!(detail["status"], "Red");
  assert_eq!(detail["impact"], "High");

  let resp = oneshot_raw(app(state.clone()), "GET", "/api/alerts/v1/heat/E12000007", vec![], "").await;
  assert_eq!(json_body(resp).await["status"], "Green");

  let resp = oneshot_raw(app(state), "GET", "/api/alerts/v1/heat", vec![], "").await;
  let summaries = json_body(resp).await;
  assert_eq!(summaries.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_alert_topic_is_a_bad_request() {
  let app = app(state(seeded_store().await, ResponseCache::PassThrough));
  let resp = oneshot_raw(app, "GET", "/api/alerts/v1/flood", vec![], "").await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ── Health ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoints_answer() {
  let state = state(seeded_store().await, ResponseCache::memory());
  let resp = oneshot_raw(app(state.clone()), "GET", "/health/", vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["status"], "ok");

  let resp = oneshot_raw(app(state), "GET", "/health/internal/", vec![], "").await;
  assert_eq!(resp.status(), StatusCode::OK);
  assert_eq!(json_body(resp).await["status"], "healthy");
}
