//! Dimension vocabulary shared by ingestion, queries and rendering.
//!
//! Dimension *rows* (themes, topics, geographies, ...) live in the store. This
//! module only holds the closed enumerations and the naming rules that the
//! rest of the workspace relies on.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{Error, Result};

// ─── Metric group ────────────────────────────────────────────────────────────

/// The second token of a metric name, e.g. `COVID-19_cases_casesByDay` →
/// [`MetricGroup::Cases`].
///
/// `Headline` selects the headline fact table; every other group is stored
/// as time series.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MetricGroup {
  Headline,
  Cases,
  Deaths,
  Healthcare,
  Testing,
  Vaccinations,
  Syndromic,
}

impl MetricGroup {
  /// Derive the group from a metric name.
  ///
  /// `headline` wins over any other token so that e.g.
  /// `COVID-19_headline_cases_7DayTotals` is headline-shaped.
  pub fn from_metric(metric: &str) -> Result<Self> {
    let lowered = metric.to_lowercase();
    if lowered.contains(MetricGroup::Headline.as_ref()) {
      return Ok(MetricGroup::Headline);
    }
    MetricGroup::iter()
      .find(|group| lowered.contains(group.as_ref()))
      .ok_or_else(|| Error::InvalidMetric { metric: metric.to_owned() })
  }

  pub fn is_headline(self) -> bool { self == MetricGroup::Headline }

  pub fn is_timeseries(self) -> bool { !self.is_headline() }
}

// ─── Sex ─────────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Sex {
  M,
  F,
  All,
}

impl Sex {
  /// Normalise an inbound value: `male`/`m` → `m`, `female`/`f` → `f`,
  /// anything else → `all`.
  pub fn from_inbound(value: &str) -> Self {
    match value.trim().to_lowercase().as_str() {
      "m" | "male" => Sex::M,
      "f" | "female" => Sex::F,
      _ => Sex::All,
    }
  }

  /// Plural wording used in chart descriptions.
  pub fn describe(self) -> &'static str {
    match self {
      Sex::M => "males",
      Sex::F => "females",
      Sex::All => "all",
    }
  }
}

// ─── Metric frequency ────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
pub enum MetricFrequency {
  #[serde(rename = "D", alias = "daily")]
  #[strum(to_string = "D", serialize = "daily")]
  Daily,
  #[serde(rename = "W", alias = "weekly")]
  #[strum(to_string = "W", serialize = "weekly")]
  Weekly,
  #[serde(rename = "M", alias = "monthly")]
  #[strum(to_string = "M", serialize = "monthly")]
  Monthly,
  #[serde(rename = "Q", alias = "quarterly")]
  #[strum(to_string = "Q", serialize = "quarterly")]
  Quarterly,
  #[serde(rename = "Y", alias = "annual")]
  #[strum(to_string = "Y", serialize = "annual")]
  Annual,
}

impl MetricFrequency {
  /// Single-letter code persisted in the fact tables.
  pub fn code(self) -> &'static str {
    match self {
      MetricFrequency::Daily => "D",
      MetricFrequency::Weekly => "W",
      MetricFrequency::Monthly => "M",
      MetricFrequency::Quarterly => "Q",
      MetricFrequency::Annual => "Y",
    }
  }
}

// ─── Age bands ───────────────────────────────────────────────────────────────

pub const AGE_ALL: &str = "all";

/// Check that an age band is `all`, `NN-NN` with a strictly increasing range,
/// or `NN+`.
pub fn is_valid_age(age: &str) -> bool {
  if age == AGE_ALL {
    return true;
  }
  if let Some(lower) = age.strip_suffix('+') {
    return lower.len() == 2 && lower.bytes().all(|b| b.is_ascii_digit());
  }
  match age.split_once('-') {
    Some((left, right)) if age.len() == 5 => {
      match (left.parse::<u8>(), right.parse::<u8>()) {
        (Ok(l), Ok(r)) => l < r,
        _ => false,
      }
    }
    _ => false,
  }
}

/// Human-readable rendering of an age band for chart axes:
/// `00-04` → `0 - 4`, `90+` → `90+`, `all` → `all`.
pub fn age_display_name(age: &str) -> String {
  match age.split_once('-') {
    Some((left, right)) => {
      format!("{} - {}", strip_leading_zeros(left), strip_leading_zeros(right))
    }
    None => match age.strip_suffix('+') {
      Some(lower) => format!("{}+", strip_leading_zeros(lower)),
      None => age.to_owned(),
    },
  }
}

fn strip_leading_zeros(s: &str) -> &str {
  let trimmed = s.trim().trim_start_matches('0');
  if trimmed.is_empty() { "0" } else { trimmed }
}

/// Natural ordering for age bands (stored or display form): numeric bands by
/// their lower bound, then any non-numeric band (`all`) alphabetically.
pub fn compare_ages(a: &str, b: &str) -> Ordering { age_sort_key(a).cmp(&age_sort_key(b)) }

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum AgeKey {
  Band(u32, u32),
  Other(String),
}

fn age_sort_key(age: &str) -> AgeKey {
  let digits_from = |s: &str| -> Option<u32> {
    let digits: String = s.trim().chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
  };
  match age.split_once('-') {
    Some((l, r)) => match (digits_from(l), digits_from(r)) {
      (Some(l), Some(r)) => AgeKey::Band(l, r),
      _ => AgeKey::Other(age.to_lowercase()),
    },
    None => match digits_from(age) {
      Some(l) if age.trim_end().ends_with('+') => AgeKey::Band(l, u32::MAX),
      _ => AgeKey::Other(age.to_lowercase()),
    },
  }
}

// ─── Dimension path ──────────────────────────────────────────────────────────

/// The complete set of dimension names a fact row hangs off.
///
/// Used on the write path (get-or-create) and as the identifying tuple for
/// RBAC checks on individual rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionPath {
  pub theme:          String,
  pub sub_theme:      String,
  pub topic:          String,
  pub metric_group:   String,
  pub metric:         String,
  pub geography_type: String,
  pub geography:      String,
  pub geography_code: Option<String>,
  pub age:            String,
  pub stratum:        String,
}

impl fmt::Display for DimensionPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}/{}/{}/{} @ {} {}",
      self.theme, self.sub_theme, self.topic, self.metric, self.geography_type, self.geography
    )
  }
}
