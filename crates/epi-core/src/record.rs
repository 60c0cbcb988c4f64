//! Fact rows: time series, headlines and the flat public projection.
//!
//! Fact rows are insert-only. A correction is a new row written with
//! `force_write = true`; headline rows are superseded by a newer
//! `refresh_date` rather than updated.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::dimension::{MetricFrequency, Sex};

/// Number of decimal places retained for `metric_value`.
pub const METRIC_VALUE_DECIMAL_PLACES: i32 = 4;

/// Round a value to the presentation precision stored in the fact tables.
pub fn round_metric_value(value: f64) -> f64 {
  let factor = 10f64.powi(METRIC_VALUE_DECIMAL_PLACES);
  (value * factor).round() / factor
}

// ─── Writes ──────────────────────────────────────────────────────────────────

/// A single time-series observation ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTimeSeries {
  pub metric_frequency:          MetricFrequency,
  pub sex:                       Sex,
  pub year:                      i32,
  pub month:                     Option<u32>,
  pub epiweek:                   u32,
  pub date:                      NaiveDate,
  pub metric_value:              f64,
  pub refresh_date:              DateTime<Utc>,
  pub embargo:                   Option<DateTime<Utc>>,
  pub in_reporting_delay_period: bool,
  pub is_public:                 bool,
  pub force_write:               bool,
}

/// A single headline figure ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHeadline {
  pub sex:              Sex,
  pub period_start:     DateTime<Utc>,
  pub period_end:       DateTime<Utc>,
  pub metric_value:     f64,
  pub upper_confidence: Option<f64>,
  pub lower_confidence: Option<f64>,
  pub refresh_date:     DateTime<Utc>,
  pub embargo:          Option<DateTime<Utc>>,
  pub is_public:        bool,
  pub force_write:      bool,
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// A `CoreTimeSeries` row joined with its dimension names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
  pub id:                        i64,
  pub theme:                     String,
  pub sub_theme:                 String,
  pub topic:                     String,
  pub metric:                    String,
  pub metric_frequency:          String,
  pub geography_type:            String,
  pub geography:                 String,
  pub geography_code:            Option<String>,
  pub stratum:                   String,
  pub age:                       String,
  pub sex:                       String,
  pub year:                      i32,
  pub month:                     Option<u32>,
  pub epiweek:                   u32,
  pub date:                      NaiveDate,
  pub metric_value:              f64,
  pub refresh_date:              DateTime<Utc>,
  pub embargo:                   Option<DateTime<Utc>>,
  pub in_reporting_delay_period: bool,
  pub is_public:                 bool,
}

/// A `CoreHeadline` row joined with its dimension names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineRecord {
  pub id:               i64,
  pub theme:            String,
  pub sub_theme:        String,
  pub topic:            String,
  pub metric:           String,
  pub geography_type:   String,
  pub geography:        String,
  pub geography_code:   Option<String>,
  pub stratum:          String,
  pub age:              String,
  pub sex:              String,
  pub period_start:     DateTime<Utc>,
  pub period_end:       DateTime<Utc>,
  pub metric_value:     f64,
  pub upper_confidence: Option<f64>,
  pub lower_confidence: Option<f64>,
  pub refresh_date:     DateTime<Utc>,
  pub embargo:          Option<DateTime<Utc>>,
  pub is_public:        bool,
}

/// The denormalised public projection of a time-series row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiTimeSeriesRecord {
  pub id:                        i64,
  pub theme:                     String,
  pub sub_theme:                 String,
  pub topic:                     String,
  pub metric:                    String,
  pub metric_group:              String,
  pub metric_frequency:          String,
  pub geography_type:            String,
  pub geography:                 String,
  pub geography_code:            Option<String>,
  pub stratum:                   String,
  pub age:                       String,
  pub sex:                       String,
  pub year:                      i32,
  pub month:                     Option<u32>,
  pub epiweek:                   u32,
  pub date:                      NaiveDate,
  pub metric_value:              f64,
  pub refresh_date:              DateTime<Utc>,
  pub embargo:                   Option<DateTime<Utc>>,
  pub in_reporting_delay_period: bool,
  pub is_public:                 bool,
}
