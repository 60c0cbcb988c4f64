//! Error types for `epi-core`.
//!
//! Variants fall into two families that the HTTP layer treats alike
//! (bad request): request validation and "no data". See
//! [`Error::is_client_error`].

use chrono::NaiveDate;
use thiserror::Error;

use crate::rbac::PermissionError;

#[derive(Debug, Error)]
pub enum Error {
  // ── Request validation ────────────────────────────────────────────────

  #[error("The metric provided doesn't appear to be valid.")]
  InvalidMetric { metric: String },

  #[error("`{topic}` does not have a corresponding metric of `{metric}`")]
  MetricDoesNotSupportTopic { topic: String, metric: String },

  #[error("`date_from` ({date_from}) must not be later than `date_to` ({date_to})")]
  DatesNotInChronologicalOrder {
    date_from: NaiveDate,
    date_to:   NaiveDate,
  },

  #[error("`{metric}` is not compatible with `{chart_type}` chart types")]
  ChartTypeDoesNotSupportMetric { metric: String, chart_type: String },

  #[error(
    "There has been an invalid combination of plots selected, Please review your plot data. {}",
    .0.join(", ")
  )]
  InvalidChartTypeCombination(Vec<String>),

  #[error("Invalid file format, must be `svg`")]
  InvalidFileFormat,

  #[error("at least one plot must be requested")]
  NoPlotsRequested,

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error(transparent)]
  Permission(#[from] PermissionError),

  // ── No data ───────────────────────────────────────────────────────────

  #[error("No data could be found for the requested plot")]
  DataNotFoundForPlot,

  #[error("No data could be found for any of the requested plots")]
  DataNotFoundForAnyPlot,

  #[error("No data could be found for those parameters")]
  HeadlineNotFound,

  #[error("Data for `{topic}` and `{metric}` could not be found.")]
  TrendDataNotFound { topic: String, metric: String },

  // ── Internal ──────────────────────────────────────────────────────────

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether this error is the caller's fault (validation or missing data)
  /// rather than an internal failure.
  pub fn is_client_error(&self) -> bool { !matches!(self, Error::Serialization(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn combination_message_lists_uncommon_types() {
    let err = Error::InvalidChartTypeCombination(vec![
      "line_single_simplified".into(),
      "waffle".into(),
    ]);
    assert_eq!(
      err.to_string(),
      "There has been an invalid combination of plots selected, Please review \
       your plot data. line_single_simplified, waffle"
    );
  }

  #[test]
  fn metric_topic_message_is_verbatim() {
    let err = Error::MetricDoesNotSupportTopic {
      topic:  "Influenza".into(),
      metric: "COVID-19_cases_casesByDay".into(),
    };
    assert_eq!(
      err.to_string(),
      "`Influenza` does not have a corresponding metric of `COVID-19_cases_casesByDay`"
    );
  }
}
