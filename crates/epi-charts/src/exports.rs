//! Data downloads: the rows behind a chart as CSV or JSON, and archives of
//! several such files.

use std::io::Write as _;

use chrono::{DateTime, NaiveDate, Utc};
use epi_core::{
  plots::DownloadFormat,
  record::{HeadlineRecord, TimeSeriesRecord},
};
use flate2::{Compression, write::GzEncoder};
use serde::Serialize;

use crate::Result;

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A row with a fixed column order.
pub trait ExportRow: Serialize {
  const HEADERS: &'static [&'static str];

  fn cells(&self) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesExport {
  pub theme:                     String,
  pub sub_theme:                 String,
  pub topic:                     String,
  pub geography_type:            String,
  pub geography:                 String,
  pub metric:                    String,
  pub sex:                       String,
  pub age:                       String,
  pub stratum:                   String,
  pub year:                      i32,
  pub date:                      NaiveDate,
  pub metric_value:              f64,
  pub in_reporting_delay_period: bool,
}

impl From<TimeSeriesRecord> for TimeSeriesExport {
  fn from(r: TimeSeriesRecord) -> Self {
    Self {
      theme:                     r.theme,
      sub_theme:                 r.sub_theme,
      topic:                     r.topic,
      geography_type:            r.geography_type,
      geography:                 r.geography,
      metric:                    r.metric,
      sex:                       r.sex,
      age:                       r.age,
      stratum:                   r.stratum,
      year:                      r.year,
      date:                      r.date,
      metric_value:              r.metric_value,
      in_reporting_delay_period: r.in_reporting_delay_period,
    }
  }
}

impl ExportRow for TimeSeriesExport {
  const HEADERS: &'static [&'static str] = &[
    "theme",
    "sub_theme",
    "topic",
    "geography_type",
    "geography",
    "metric",
    "sex",
    "age",
    "stratum",
    "year",
    "date",
    "metric_value",
    "in_reporting_delay_period",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.theme.clone(),
      self.sub_theme.clone(),
      self.topic.clone(),
      self.geography_type.clone(),
      self.geography.clone(),
      self.metric.clone(),
      self.sex.clone(),
      self.age.clone(),
      self.stratum.clone(),
      self.year.to_string(),
      self.date.to_string(),
      format_value(self.metric_value),
      python_bool(self.in_reporting_delay_period),
    ]
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeadlineExport {
  pub theme:            String,
  pub sub_theme:        String,
  pub topic:            String,
  pub geography_type:   String,
  pub geography:        String,
  pub metric:           String,
  pub sex:              String,
  pub age:              String,
  pub stratum:          String,
  pub period_start:     DateTime<Utc>,
  pub period_end:       DateTime<Utc>,
  pub metric_value:     f64,
  pub upper_confidence: Option<f64>,
  pub lower_confidence: Option<f64>,
}

impl From<HeadlineRecord> for HeadlineExport {
  fn from(r: HeadlineRecord) -> Self {
    Self {
      theme:            r.theme,
      sub_theme:        r.sub_theme,
      topic:            r.topic,
      geography_type:   r.geography_type,
      geography:        r.geography,
      metric:           r.metric,
      sex:              r.sex,
      age:              r.age,
      stratum:          r.stratum,
      period_start:     r.period_start,
      period_end:       r.period_end,
      metric_value:     r.metric_value,
      upper_confidence: r.upper_confidence,
      lower_confidence: r.lower_confidence,
    }
  }
}

impl ExportRow for HeadlineExport {
  const HEADERS: &'static [&'static str] = &[
    "theme",
    "sub_theme",
    "topic",
    "geography_type",
    "geography",
    "metric",
    "sex",
    "age",
    "stratum",
    "period_start",
    "period_end",
    "metric_value",
    "upper_confidence",
    "lower_confidence",
  ];

  fn cells(&self) -> Vec<String> {
    vec![
      self.theme.clone(),
      self.sub_theme.clone(),
      self.topic.clone(),
      self.geography_type.clone(),
      self.geography.clone(),
      self.metric.clone(),
      self.sex.clone(),
      self.age.clone(),
      self.stratum.clone(),
      self.period_start.to_rfc3339(),
      self.period_end.to_rfc3339(),
      format_value(self.metric_value),
      self.upper_confidence.map(format_value).unwrap_or_default(),
      self.lower_confidence.map(format_value).unwrap_or_default(),
    ]
  }
}

/// Values are stored to four places and exported the same way.
fn format_value(value: f64) -> String { format!("{value:.4}") }

fn python_bool(value: bool) -> String { (if value { "True" } else { "False" }).to_owned() }

// ─── Encoding ────────────────────────────────────────────────────────────────

/// RFC 4180 field quoting.
fn csv_field(field: &str) -> String {
  if field.contains([',', '"', '\n', '\r']) {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_owned()
  }
}

fn csv_line(out: &mut String, fields: impl IntoIterator<Item = impl AsRef<str>>) {
  let line: Vec<String> = fields.into_iter().map(|f| csv_field(f.as_ref())).collect();
  out.push_str(&line.join(","));
  out.push_str("\r\n");
}

/// A header line followed by one line per row. The header is written even
/// when there are no rows.
pub fn to_csv<R: ExportRow>(rows: &[R]) -> String {
  let mut out = String::new();
  csv_line(&mut out, R::HEADERS);
  for row in rows {
    csv_line(&mut out, row.cells());
  }
  out
}

/// `rows` encoded in `format`: CSV text or a JSON array.
pub fn encode_rows<R: ExportRow>(rows: &[R], format: DownloadFormat) -> Result<Vec<u8>> {
  match format {
    DownloadFormat::Csv => Ok(to_csv(rows).into_bytes()),
    DownloadFormat::Json => Ok(serde_json::to_vec(rows)?),
  }
}

// ─── Archives ────────────────────────────────────────────────────────────────

/// Reduce a chart name to a safe archive entry name.
pub fn file_stem(name: &str) -> String {
  let stem: String = name
    .trim()
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
    .collect();
  if stem.is_empty() { "chart".to_owned() } else { stem }
}

/// A gzipped tarball holding one entry per `(name, contents)` pair. Names
/// are passed through [`file_stem`] and de-duplicated with a numeric
/// suffix.
pub fn archive(files: &[(String, Vec<u8>)], format: DownloadFormat) -> Result<Vec<u8>> {
  let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
  let mut used: Vec<String> = Vec::with_capacity(files.len());
  for (name, contents) in files {
    let stem = file_stem(name);
    let mut entry = format!("{stem}.{}", format.extension());
    let mut n = 1;
    while used.contains(&entry) {
      n += 1;
      entry = format!("{stem}-{n}.{}", format.extension());
    }

    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, &entry, contents.as_slice())?;
    used.push(entry);
  }
  let mut gz = builder.into_inner()?;
  gz.flush()?;
  Ok(gz.finish()?)
}

#[cfg(test)]
mod tests {
  use std::io::Read as _;

  use chrono::TimeZone;
  use flate2::read::GzDecoder;

  use super::*;

  fn row(geography: &str, value: f64) -> TimeSeriesExport {
    TimeSeriesExport {
      theme:                     "infectious_disease".into(),
      sub_theme:                 "respiratory".into(),
      topic:                     "COVID-19".into(),
      geography_type:            "Nation".into(),
      geography:                 geography.into(),
      metric:                    "COVID-19_cases_casesByDay".into(),
      sex:                       "all".into(),
      age:                       "all".into(),
      stratum:                   "default".into(),
      year:                      2023,
      date:                      NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
      metric_value:              value,
      in_reporting_delay_period: false,
    }
  }

  #[test]
  fn csv_has_header_and_quoted_fields() {
    let csv = to_csv(&[row("England", 12.5), row("Bristol, City of", 3.0)]);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
      lines[0],
      "theme,sub_theme,topic,geography_type,geography,metric,sex,age,stratum,year,date,\
       metric_value,in_reporting_delay_period"
    );
    assert_eq!(
      lines[1],
      "infectious_disease,respiratory,COVID-19,Nation,England,COVID-19_cases_casesByDay,all,all,\
       default,2023,2023-01-02,12.5000,False"
    );
    assert!(lines[2].contains(",\"Bristol, City of\","));
    assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
  }

  #[test]
  fn empty_csv_keeps_the_header() {
    assert_eq!(to_csv::<HeadlineExport>(&[]).lines().count(), 1);
  }

  #[test]
  fn headline_cells_leave_missing_confidence_blank() {
    let at = Utc.with_ymd_and_hms(2023, 3, 31, 0, 0, 0).unwrap();
    let export = HeadlineExport {
      theme:            "infectious_disease".into(),
      sub_theme:        "respiratory".into(),
      topic:            "COVID-19".into(),
      geography_type:   "Nation".into(),
      geography:        "England".into(),
      metric:           "COVID-19_headline_ONSdeaths_7DayChange".into(),
      sex:              "all".into(),
      age:              "all".into(),
      stratum:          "default".into(),
      period_start:     at,
      period_end:       at,
      metric_value:     -3.0,
      upper_confidence: None,
      lower_confidence: Some(1.25),
    };
    let cells = export.cells();
    assert_eq!(cells.len(), HeadlineExport::HEADERS.len());
    assert_eq!(cells[11], "-3.0000");
    assert_eq!(cells[12], "");
    assert_eq!(cells[13], "1.2500");
  }

  #[test]
  fn json_rows_keep_their_types() {
    let body = encode_rows(&[row("England", 1.0)], DownloadFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value[0]["metric_value"], 1.0);
    assert_eq!(value[0]["in_reporting_delay_period"], false);
    assert_eq!(value[0]["date"], "2023-01-02");
  }

  #[test]
  fn archive_entries_are_named_and_deduplicated() {
    let files = vec![
      ("Cases by day".to_owned(), b"a".to_vec()),
      ("Cases by day".to_owned(), b"b".to_vec()),
      ("../etc".to_owned(), b"c".to_vec()),
    ];
    let bytes = archive(&files, DownloadFormat::Csv).unwrap();

    let mut tarball = tar::Archive::new(GzDecoder::new(bytes.as_slice()));
    let mut entries = Vec::new();
    for entry in tarball.entries().unwrap() {
      let mut entry = entry.unwrap();
      let path = entry.path().unwrap().to_string_lossy().into_owned();
      let mut contents = String::new();
      entry.read_to_string(&mut contents).unwrap();
      entries.push((path, contents));
    }
    assert_eq!(entries, [
      ("Cases_by_day.csv".to_owned(), "a".to_owned()),
      ("Cases_by_day-2.csv".to_owned(), "b".to_owned()),
      ("___etc.csv".to_owned(), "c".to_owned()),
    ]);
  }
}
