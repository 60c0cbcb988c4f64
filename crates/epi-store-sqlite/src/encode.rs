//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `Z` suffix) so that SQL string comparison orders them
//! correctly. Dates are stored as `YYYY-MM-DD`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use epi_core::{
  dimension::{AGE_ALL, age_display_name},
  plots::{AxisValue, ChartAxis, PlotPoint},
  record::{ApiTimeSeriesRecord, HeadlineRecord, TimeSeriesRecord},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── Plot points ─────────────────────────────────────────────────────────────

/// The columns every plot query selects, whatever the x axis.
pub struct RawPoint {
  pub date:                      String,
  pub refresh_date:              String,
  pub age:                       String,
  pub stratum:                   String,
  pub geography:                 String,
  pub sex:                       String,
  pub metric_value:              f64,
  pub in_reporting_delay_period: bool,
  pub upper_confidence:          Option<f64>,
  pub lower_confidence:          Option<f64>,
}

impl RawPoint {
  /// The raw grouping key for `axis`, before display formatting.
  pub fn key(&self, axis: ChartAxis) -> String {
    match axis {
      ChartAxis::Date => self.date.clone(),
      ChartAxis::Age => self.age.clone(),
      ChartAxis::Stratum => self.stratum.clone(),
      ChartAxis::Geography => self.geography.clone(),
      ChartAxis::Sex => self.sex.clone(),
      ChartAxis::Metric => self.metric_value.to_string(),
    }
  }

  pub fn into_point(self, axis: ChartAxis) -> Result<PlotPoint> {
    let date = decode_date(&self.date)?;
    let x = match axis {
      ChartAxis::Date => AxisValue::Date(date),
      ChartAxis::Age if self.age == AGE_ALL => AxisValue::Text(self.age),
      ChartAxis::Age => AxisValue::Text(age_display_name(&self.age)),
      ChartAxis::Stratum => AxisValue::Text(self.stratum),
      ChartAxis::Geography => AxisValue::Text(self.geography),
      ChartAxis::Sex => AxisValue::Text(self.sex),
      ChartAxis::Metric => AxisValue::Text(self.metric_value.to_string()),
    };
    Ok(PlotPoint {
      x,
      y: self.metric_value,
      in_reporting_delay_period: self.in_reporting_delay_period,
      upper_confidence: self.upper_confidence,
      lower_confidence: self.lower_confidence,
      date,
    })
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Raw values read from a `core_time_series` row joined with its dimensions.
pub struct RawTimeSeries {
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
  pub date:                      String,
  pub metric_value:              f64,
  pub refresh_date:              String,
  pub embargo:                   Option<String>,
  pub in_reporting_delay_period: bool,
  pub is_public:                 bool,
}

impl RawTimeSeries {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                        row.get(0)?,
      theme:                     row.get(1)?,
      sub_theme:                 row.get(2)?,
      topic:                     row.get(3)?,
      metric:                    row.get(4)?,
      metric_frequency:          row.get(5)?,
      geography_type:            row.get(6)?,
      geography:                 row.get(7)?,
      geography_code:            row.get(8)?,
      stratum:                   row.get(9)?,
      age:                       row.get(10)?,
      sex:                       row.get(11)?,
      year:                      row.get(12)?,
      month:                     row.get(13)?,
      epiweek:                   row.get(14)?,
      date:                      row.get(15)?,
      metric_value:              row.get(16)?,
      refresh_date:              row.get(17)?,
      embargo:                   row.get(18)?,
      in_reporting_delay_period: row.get(19)?,
      is_public:                 row.get(20)?,
    })
  }

  pub fn into_record(self) -> Result<TimeSeriesRecord> {
    Ok(TimeSeriesRecord {
      id:                        self.id,
      theme:                     self.theme,
      sub_theme:                 self.sub_theme,
      topic:                     self.topic,
      metric:                    self.metric,
      metric_frequency:          self.metric_frequency,
      geography_type:            self.geography_type,
      geography:                 self.geography,
      geography_code:            self.geography_code,
      stratum:                   self.stratum,
      age:                       self.age,
      sex:                       self.sex,
      year:                      self.year,
      month:                     self.month,
      epiweek:                   self.epiweek,
      date:                      decode_date(&self.date)?,
      metric_value:              self.metric_value,
      refresh_date:              decode_dt(&self.refresh_date)?,
      embargo:                   decode_opt_dt(self.embargo.as_deref())?,
      in_reporting_delay_period: self.in_reporting_delay_period,
      is_public:                 self.is_public,
    })
  }
}

/// Raw values read from a `core_headlines` row joined with its dimensions.
pub struct RawHeadline {
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
  pub period_start:     String,
  pub period_end:       String,
  pub metric_value:     f64,
  pub upper_confidence: Option<f64>,
  pub lower_confidence: Option<f64>,
  pub refresh_date:     String,
  pub embargo:          Option<String>,
  pub is_public:        bool,
}

impl RawHeadline {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get(0)?,
      theme:            row.get(1)?,
      sub_theme:        row.get(2)?,
      topic:            row.get(3)?,
      metric:           row.get(4)?,
      geography_type:   row.get(5)?,
      geography:        row.get(6)?,
      geography_code:   row.get(7)?,
      stratum:          row.get(8)?,
      age:              row.get(9)?,
      sex:              row.get(10)?,
      period_start:     row.get(11)?,
      period_end:       row.get(12)?,
      metric_value:     row.get(13)?,
      upper_confidence: row.get(14)?,
      lower_confidence: row.get(15)?,
      refresh_date:     row.get(16)?,
      embargo:          row.get(17)?,
      is_public:        row.get(18)?,
    })
  }

  pub fn into_record(self) -> Result<HeadlineRecord> {
    Ok(HeadlineRecord {
      id:               self.id,
      theme:            self.theme,
      sub_theme:        self.sub_theme,
      topic:            self.topic,
      metric:           self.metric,
      geography_type:   self.geography_type,
      geography:        self.geography,
      geography_code:   self.geography_code,
      stratum:          self.stratum,
      age:              self.age,
      sex:              self.sex,
      period_start:     decode_dt(&self.period_start)?,
      period_end:       decode_dt(&self.period_end)?,
      metric_value:     self.metric_value,
      upper_confidence: self.upper_confidence,
      lower_confidence: self.lower_confidence,
      refresh_date:     decode_dt(&self.refresh_date)?,
      embargo:          decode_opt_dt(self.embargo.as_deref())?,
      is_public:        self.is_public,
    })
  }
}

/// Raw values read from an `api_time_series` row.
pub struct RawApiTimeSeries {
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
  pub date:                      String,
  pub metric_value:              f64,
  pub refresh_date:              String,
  pub embargo:                   Option<String>,
  pub in_reporting_delay_period: bool,
  pub is_public:                 bool,
}

impl RawApiTimeSeries {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                        row.get(0)?,
      theme:                     row.get(1)?,
      sub_theme:                 row.get(2)?,
      topic:                     row.get(3)?,
      metric:                    row.get(4)?,
      metric_group:              row.get(5)?,
      metric_frequency:          row.get(6)?,
      geography_type:            row.get(7)?,
      geography:                 row.get(8)?,
      geography_code:            row.get(9)?,
      stratum:                   row.get(10)?,
      age:                       row.get(11)?,
      sex:                       row.get(12)?,
      year:                      row.get(13)?,
      month:                     row.get(14)?,
      epiweek:                   row.get(15)?,
      date:                      row.get(16)?,
      metric_value:              row.get(17)?,
      refresh_date:              row.get(18)?,
      embargo:                   row.get(19)?,
      in_reporting_delay_period: row.get(20)?,
      is_public:                 row.get(21)?,
    })
  }

  pub fn into_record(self) -> Result<ApiTimeSeriesRecord> {
    Ok(ApiTimeSeriesRecord {
      id:                        self.id,
      theme:                     self.theme,
      sub_theme:                 self.sub_theme,
      topic:                     self.topic,
      metric:                    self.metric,
      metric_group:              self.metric_group,
      metric_frequency:          self.metric_frequency,
      geography_type:            self.geography_type,
      geography:                 self.geography,
      geography_code:            self.geography_code,
      stratum:                   self.stratum,
      age:                       self.age,
      sex:                       self.sex,
      year:                      self.year,
      month:                     self.month,
      epiweek:                   self.epiweek,
      date:                      decode_date(&self.date)?,
      metric_value:              self.metric_value,
      refresh_date:              decode_dt(&self.refresh_date)?,
      embargo:                   decode_opt_dt(self.embargo.as_deref())?,
      in_reporting_delay_period: self.in_reporting_delay_period,
      is_public:                 self.is_public,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_sortable() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(1500);
    let (ea, eb) = (encode_dt(a), encode_dt(b));
    assert_eq!(ea, "2024-01-01T09:00:00.000000Z");
    assert_eq!(ea.len(), eb.len());
    assert!(ea < eb);
    assert_eq!(decode_dt(&eb).unwrap(), b);
  }
}
