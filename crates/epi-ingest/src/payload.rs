//! Inbound payload decoding and validation.
//!
//! A payload is a single JSON object describing one dimension tuple plus
//! either a `data` array of headline figures (when `metric_group` is
//! `headline`) or a `time_series` array of dated observations.
//!
//! Decoding walks a [`serde_json::Value`] by hand rather than deriving, so
//! that a missing key is reported with the field name the producers know.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use epi_core::{
  dimension::{DimensionPath, MetricFrequency, MetricGroup, Sex, is_valid_age},
  record::{NewHeadline, NewTimeSeries},
};

use crate::error::ValidationError;

type Result<T, E = ValidationError> = std::result::Result<T, E>;

/// A validated payload, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  Headline {
    path: DimensionPath,
    rows: Vec<NewHeadline>,
  },
  TimeSeries {
    path: DimensionPath,
    rows: Vec<NewTimeSeries>,
  },
}

impl Payload {
  pub fn path(&self) -> &DimensionPath {
    match self {
      Payload::Headline { path, .. } | Payload::TimeSeries { path, .. } => path,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      Payload::Headline { rows, .. } => rows.len(),
      Payload::TimeSeries { rows, .. } => rows.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Decode and validate a payload.
///
/// Non-public payloads are only accepted when `auth_enabled` is set.
pub fn parse(bytes: &[u8], auth_enabled: bool) -> Result<Payload> {
  let value: Value =
    serde_json::from_slice(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))?;
  let Value::Object(object) = value else {
    return Err(ValidationError::Malformed("expected a JSON object".into()));
  };
  let fields = Fields(&object);

  let metric_group_name = fields.string("metric_group")?;
  let metric_group: MetricGroup = metric_group_name.parse().map_err(|_| {
    ValidationError::UnknownMetricGroup { metric_group: metric_group_name.clone() }
  })?;
  let metric = fields.string("metric")?;
  if !metric.contains(metric_group_name.as_str()) {
    return Err(ValidationError::MetricNotInGroup { metric, metric_group: metric_group_name });
  }

  let geography_code = fields.string("geography_code")?;
  if !(3..=9).contains(&geography_code.chars().count()) {
    return Err(ValidationError::InvalidGeographyCode);
  }

  let age = fields.string("age")?;
  if !is_valid_age(&age) {
    return Err(ValidationError::InvalidAge);
  }

  let path = DimensionPath {
    theme: fields.string("parent_theme")?,
    sub_theme: fields.string("child_theme")?,
    topic: fields.string("topic")?,
    metric_group: metric_group_name,
    metric,
    geography_type: fields.string("geography_type")?,
    geography: fields.string("geography")?,
    geography_code: Some(geography_code),
    age,
    stratum: fields.string("stratum")?,
  };
  let sex = Sex::from_inbound(&fields.string("sex")?);
  let refresh_date = fields.datetime("refresh_date")?;
  let is_public = fields.bool_or("is_public", true)?;
  let force_write = fields.bool_or("force_write", false)?;

  if !is_public && !auth_enabled {
    return Err(ValidationError::NonPublicDataSentToPublicIngestion);
  }

  if metric_group.is_headline() {
    let rows = fields
      .array("data")?
      .iter()
      .map(|entry| {
        let entry = Fields::of(entry, "data")?;
        Ok(NewHeadline {
          sex,
          period_start: entry.datetime("period_start")?,
          period_end: entry.datetime("period_end")?,
          metric_value: entry.number("metric_value")?,
          upper_confidence: entry.opt_number("upper_confidence")?,
          lower_confidence: entry.opt_number("lower_confidence")?,
          refresh_date,
          embargo: entry.opt_datetime("embargo")?,
          is_public,
          force_write,
        })
      })
      .collect::<Result<Vec<_>>>()?;
    return Ok(Payload::Headline { path, rows });
  }

  let metric_frequency = parse_frequency(&fields.string("metric_frequency")?)?;
  let mut rows = Vec::new();
  for entry in fields.array("time_series")? {
    let entry = Fields::of(entry, "time_series")?;
    // Null values are gaps in the source series, not errors.
    let Some(metric_value) = entry.opt_number("metric_value")? else {
      continue;
    };
    let date = entry.date("date")?;
    rows.push(NewTimeSeries {
      metric_frequency,
      sex,
      year: date.year(),
      month: Some(date.month()),
      epiweek: entry.unsigned("epiweek")?,
      date,
      metric_value,
      refresh_date,
      embargo: entry.opt_datetime("embargo")?,
      in_reporting_delay_period: entry.bool_or("in_reporting_delay_period", false)?,
      is_public,
      force_write,
    });
  }
  Ok(Payload::TimeSeries { path, rows })
}

fn parse_frequency(value: &str) -> Result<MetricFrequency> {
  value
    .parse()
    .or_else(|_| value.to_lowercase().parse())
    .or_else(|_| value.to_uppercase().parse())
    .map_err(|_| ValidationError::invalid("metric_frequency", value))
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) or a bare date
/// (midnight UTC).
fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
  let value = value.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
    return Some(dt.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
      return Some(naive.and_utc());
    }
  }
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .ok()
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|naive| naive.and_utc())
}

// ─── Field access ────────────────────────────────────────────────────────────

struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
  fn of(value: &'a Value, field: &str) -> Result<Self> {
    value
      .as_object()
      .map(Fields)
      .ok_or_else(|| ValidationError::invalid(field, "expected an object"))
  }

  /// The value under `field`, treating `null` as missing.
  fn present(&self, field: &str) -> Option<&'a Value> {
    self.0.get(field).filter(|v| !v.is_null())
  }

  fn required(&self, field: &str) -> Result<&'a Value> {
    self.present(field).ok_or_else(|| ValidationError::missing(field))
  }

  fn string(&self, field: &str) -> Result<String> {
    match self.required(field)? {
      Value::String(s) => Ok(s.clone()),
      other => Err(ValidationError::invalid(field, format!("expected a string, got {other}"))),
    }
  }

  fn array(&self, field: &str) -> Result<&'a Vec<Value>> {
    match self.required(field)? {
      Value::Array(entries) => Ok(entries),
      other => Err(ValidationError::invalid(field, format!("expected an array, got {other}"))),
    }
  }

  fn number(&self, field: &str) -> Result<f64> {
    let value = self.required(field)?;
    as_number(value).ok_or_else(|| ValidationError::invalid(field, format!("expected a number, got {value}")))
  }

  fn opt_number(&self, field: &str) -> Result<Option<f64>> {
    self
      .present(field)
      .map(|value| {
        as_number(value)
          .ok_or_else(|| ValidationError::invalid(field, format!("expected a number, got {value}")))
      })
      .transpose()
  }

  fn unsigned(&self, field: &str) -> Result<u32> {
    let value = self.required(field)?;
    value
      .as_u64()
      .and_then(|n| u32::try_from(n).ok())
      .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
      .ok_or_else(|| ValidationError::invalid(field, format!("expected a whole number, got {value}")))
  }

  fn bool_or(&self, field: &str, default: bool) -> Result<bool> {
    match self.present(field) {
      None => Ok(default),
      Some(Value::Bool(b)) => Ok(*b),
      Some(other) => Err(ValidationError::invalid(field, format!("expected a boolean, got {other}"))),
    }
  }

  fn date(&self, field: &str) -> Result<NaiveDate> {
    let raw = self.string(field)?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
      .map_err(|_| ValidationError::invalid(field, format!("`{raw}` is not a YYYY-MM-DD date")))
  }

  fn datetime(&self, field: &str) -> Result<DateTime<Utc>> {
    let raw = self.string(field)?;
    parse_datetime(&raw)
      .ok_or_else(|| ValidationError::invalid(field, format!("`{raw}` is not a timestamp")))
  }

  fn opt_datetime(&self, field: &str) -> Result<Option<DateTime<Utc>>> {
    if self.present(field).is_none() {
      return Ok(None);
    }
    self.datetime(field).map(Some)
  }
}

fn as_number(value: &Value) -> Option<f64> {
  value.as_f64().or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn time_series_payload() -> Value {
    json!({
      "parent_theme": "infectious_disease",
      "child_theme": "respiratory",
      "topic": "COVID-19",
      "metric_group": "cases",
      "metric": "COVID-19_cases_casesByDay",
      "metric_frequency": "daily",
      "geography_type": "Nation",
      "geography": "England",
      "geography_code": "E92000001",
      "age": "all",
      "sex": "all",
      "stratum": "default",
      "refresh_date": "2023-11-20",
      "time_series": [
        {"epiweek": 1, "date": "2023-01-02", "embargo": null, "metric_value": 10},
        {"epiweek": 1, "date": "2023-01-03", "embargo": "2023-01-04 09:00:00", "metric_value": 12.5},
        {"epiweek": 1, "date": "2023-01-04", "embargo": null, "metric_value": null},
      ],
    })
  }

  fn bytes(value: &Value) -> Vec<u8> { serde_json::to_vec(value).unwrap() }

  #[test]
  fn time_series_skips_null_values() {
    let payload = parse(&bytes(&time_series_payload()), false).unwrap();
    let Payload::TimeSeries { path, rows } = payload else {
      panic!("expected a time series payload");
    };
    assert_eq!(path.sub_theme, "respiratory");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].metric_frequency, MetricFrequency::Daily);
    assert_eq!(rows[1].embargo.unwrap().to_rfc3339(), "2023-01-04T09:00:00+00:00");
    assert_eq!(rows[0].month, Some(1));
  }

  #[test]
  fn missing_field_names_the_field() {
    let mut value = time_series_payload();
    value.as_object_mut().unwrap().remove("topic");
    let err = parse(&bytes(&value), false).unwrap_err();
    assert_eq!(err.to_string(), "`topic` field is missing from the inbound source data");
  }

  #[test]
  fn headline_payload() {
    let value = json!({
      "parent_theme": "infectious_disease",
      "child_theme": "respiratory",
      "topic": "COVID-19",
      "metric_group": "headline",
      "metric": "COVID-19_headline_ONSdeaths_7DayChange",
      "geography_type": "Nation",
      "geography": "England",
      "geography_code": "E92000001",
      "age": "all",
      "sex": "Female",
      "stratum": "default",
      "refresh_date": "2023-11-20T12:00:00Z",
      "data": [{
        "period_start": "2023-11-13",
        "period_end": "2023-11-19",
        "embargo": null,
        "metric_value": -3,
        "upper_confidence": 1.5,
      }],
    });
    let Payload::Headline { rows, .. } = parse(&bytes(&value), false).unwrap() else {
      panic!("expected a headline payload");
    };
    assert_eq!(rows[0].sex, Sex::F);
    assert_eq!(rows[0].metric_value, -3.0);
    assert_eq!(rows[0].upper_confidence, Some(1.5));
    assert_eq!(rows[0].lower_confidence, None);
  }

  #[test]
  fn non_public_needs_auth() {
    let mut value = time_series_payload();
    value["is_public"] = json!(false);
    assert_eq!(
      parse(&bytes(&value), false).unwrap_err(),
      ValidationError::NonPublicDataSentToPublicIngestion
    );
    assert!(parse(&bytes(&value), true).is_ok());
  }

  #[test]
  fn rejects_bad_dimensions() {
    let mut value = time_series_payload();
    value["age"] = json!("4-10");
    assert_eq!(parse(&bytes(&value), false).unwrap_err(), ValidationError::InvalidAge);

    let mut value = time_series_payload();
    value["geography_code"] = json!("E9");
    assert_eq!(parse(&bytes(&value), false).unwrap_err(), ValidationError::InvalidGeographyCode);

    let mut value = time_series_payload();
    value["metric_group"] = json!("deaths");
    assert!(matches!(
      parse(&bytes(&value), false).unwrap_err(),
      ValidationError::MetricNotInGroup { .. }
    ));
  }
}
