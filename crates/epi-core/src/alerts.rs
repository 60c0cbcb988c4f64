//! Weather health alerts.
//!
//! An alert is stored as a `CoreHeadline` whose `metric_value` is a cell of
//! the 4×4 impact/likelihood matrix, numbered 1..=16. Everything here is a
//! pure mapping from that number (plus the topic) to what the dashboard
//! shows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::record::HeadlineRecord;

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum AlertStatus {
  Green,
  Yellow,
  Amber,
  Red,
}

/// The two alert topics. Path segments use the short form (`heat`), the
/// topic dimension uses the long form (`Heat-alert`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AlertTopic {
  Heat,
  Cold,
}

impl AlertTopic {
  pub fn topic_name(self) -> &'static str {
    match self {
      AlertTopic::Heat => "Heat-alert",
      AlertTopic::Cold => "Cold-alert",
    }
  }

  /// The headline metric holding the matrix number for this topic.
  pub fn metric_name(self) -> String { format!("{}_headline_matrixNumber", self.topic_name()) }
}

pub const GREEN_LEVEL_BOUNDARY: i64 = 6;
pub const YELLOW_LEVEL_BOUNDARY: i64 = 11;
pub const AMBER_LEVEL_BOUNDARY: i64 = 15;

const VERY_LOW: &str = "Very low";
const LOW: &str = "Low";
const MEDIUM: &str = "Medium";
const HIGH: &str = "High";

// ─── Mappings ────────────────────────────────────────────────────────────────

pub fn status(metric_value: i64) -> AlertStatus {
  match metric_value {
    ..=GREEN_LEVEL_BOUNDARY => AlertStatus::Green,
    ..=YELLOW_LEVEL_BOUNDARY => AlertStatus::Yellow,
    ..=AMBER_LEVEL_BOUNDARY => AlertStatus::Amber,
    _ => AlertStatus::Red,
  }
}

/// Row of the matrix. Empty outside 1..=16.
pub fn impact(metric_value: i64) -> &'static str {
  match metric_value {
    1..=4 => VERY_LOW,
    5..=8 => LOW,
    9..=12 => MEDIUM,
    13..=16 => HIGH,
    _ => "",
  }
}

/// Column of the matrix. Empty outside 1..=16.
pub fn likelihood(metric_value: i64) -> &'static str {
  if !(1..=16).contains(&metric_value) {
    return "";
  }
  match metric_value % 4 {
    1 => VERY_LOW,
    2 => LOW,
    3 => MEDIUM,
    _ => HIGH,
  }
}

/// Advisory text for a level. Levels 1 to 5 share wording across topics.
pub fn text(topic: AlertTopic, metric_value: i64) -> &'static str {
  match metric_value {
    1..=4 => advice::NO_ALERT,
    5 => advice::UNLIKELY_IMPACTS,
    6..=16 => {
      let index = (metric_value - 6) as usize;
      match topic {
        AlertTopic::Heat => advice::HEAT[index],
        AlertTopic::Cold => advice::COLD[index],
      }
    }
    _ => "",
  }
}

// ─── Current alert ───────────────────────────────────────────────────────────

/// Resolved alert state for one geography.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertState {
  pub topic:        AlertTopic,
  pub metric_value: i64,
  pub period_start: Option<DateTime<Utc>>,
  pub period_end:   Option<DateTime<Utc>>,
  pub refresh_date: Option<DateTime<Utc>>,
}

impl AlertState {
  /// Derive the current state from the latest headline, if any.
  ///
  /// No headline means there has never been an alert: green with null
  /// timestamps. An expired headline falls back to green and reports its
  /// `period_end` as the refresh time.
  pub fn current(topic: AlertTopic, latest: Option<&HeadlineRecord>, now: DateTime<Utc>) -> Self {
    let Some(headline) = latest else {
      return Self {
        topic,
        metric_value: 1,
        period_start: None,
        period_end: None,
        refresh_date: None,
      };
    };

    if headline.period_end <= now {
      return Self {
        topic,
        metric_value: 1,
        period_start: Some(headline.period_start),
        period_end: Some(headline.period_end),
        refresh_date: Some(headline.period_end),
      };
    }

    Self {
      topic,
      metric_value: headline.metric_value.round() as i64,
      period_start: Some(headline.period_start),
      period_end: Some(headline.period_end),
      refresh_date: Some(headline.refresh_date),
    }
  }

  pub fn status(&self) -> AlertStatus { status(self.metric_value) }

  pub fn detail(&self) -> AlertDetail {
    AlertDetail {
      status:       self.status(),
      text:         text(self.topic, self.metric_value).to_owned(),
      impact:       impact(self.metric_value).to_owned(),
      likelihood:   likelihood(self.metric_value).to_owned(),
      period_start: self.period_start,
      period_end:   self.period_end,
      refresh_date: self.refresh_date,
    }
  }

  pub fn summary(&self, geography_code: &str, geography_name: &str) -> AlertSummary {
    AlertSummary {
      status:         self.status(),
      geography_code: geography_code.to_owned(),
      geography_name: geography_name.to_owned(),
      refresh_date:   self.refresh_date,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDetail {
  pub status:       AlertStatus,
  pub text:         String,
  pub impact:       String,
  pub likelihood:   String,
  pub period_start: Option<DateTime<Utc>>,
  pub period_end:   Option<DateTime<Utc>>,
  pub refresh_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSummary {
  pub status:         AlertStatus,
  pub geography_code: String,
  pub geography_name: String,
  pub refresh_date:   Option<DateTime<Utc>>,
}

// ─── Text ────────────────────────────────────────────────────────────────────

pub mod advice {
  pub const NO_ALERT: &str = "<p>No alert is in force. Impacts on health are not expected.</p>";

  pub const UNLIKELY_IMPACTS: &str = "<p>Minor impacts on health are possible but unlikely. \
     Check the forecast and keep an eye on people who are vulnerable.</p>";

  /// Levels 6..=16.
  pub const HEAT: [&str; 11] = [
    "<p>Minor impacts on the health and social care sector are possible, including increased \
     use of healthcare services by vulnerable people.</p>",
    "<p>Minor impacts on the health and social care sector are probable, including a higher \
     risk to vulnerable people and warm indoor environments.</p>",
    "<p>Minor impacts on the health and social care sector are expected, including a higher \
     risk to vulnerable people and warm indoor environments.</p>",
    "<p>Significant impacts are possible due to high temperatures, including an increase in \
     mortality among those aged 65 and over or with health conditions.</p>",
    "<p>Significant impacts are probable due to high temperatures, including rising demand on \
     remote health services and an increase in mortality.</p>",
    "<p>Significant impacts are expected due to high temperatures, including rising demand on \
     health services and an increase in mortality across the population.</p>",
    "<p>Significant impacts are very likely due to high temperatures. Services should prepare \
     for increased demand and staff welfare concerns.</p>",
    "<p>Severe impacts are possible across the health and social care sector, including a \
     significant risk to life for the general population.</p>",
    "<p>Severe impacts are probable across the health and social care sector, including a \
     significant risk to life for the general population.</p>",
    "<p>Severe impacts are expected across the health and social care sector, including a \
     significant risk to life for the general population.</p>",
    "<p>Severe impacts are expected across all sectors, with a significant risk to life for \
     the healthy population as well as vulnerable groups.</p>",
  ];

  /// Levels 6..=16.
  pub const COLD: [&str; 11] = [
    "<p>Minor impacts on the health and social care sector are possible, including increased \
     use of healthcare services by vulnerable people.</p>",
    "<p>Minor impacts on the health and social care sector are probable, including a higher \
     risk to vulnerable people and cold indoor environments.</p>",
    "<p>Minor impacts on the health and social care sector are expected, including a higher \
     risk to vulnerable people and cold indoor environments.</p>",
    "<p>Significant impacts are possible due to low temperatures, including an increase in \
     deaths among those aged 65 and over or with health conditions.</p>",
    "<p>Significant impacts are probable due to low temperatures, including rising demand on \
     health services and difficulty keeping indoor temperatures safe.</p>",
    "<p>Significant impacts are expected due to low temperatures, including rising demand on \
     health services and an increase in deaths across the population.</p>",
    "<p>Significant impacts are very likely due to low temperatures. Services should prepare \
     for increased demand and disruption to staffing.</p>",
    "<p>Severe impacts are possible across the health and social care sector, including a \
     significant risk to life for the general population.</p>",
    "<p>Severe impacts are probable across the health and social care sector, including a \
     significant risk to life for the general population.</p>",
    "<p>Severe impacts are expected across the health and social care sector, including a \
     significant risk to life for the general population.</p>",
    "<p>Severe impacts are expected across all sectors, with a significant risk to life for \
     the healthy population as well as vulnerable groups.</p>",
  ];
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;

  fn headline(metric_value: f64, period_end: DateTime<Utc>) -> HeadlineRecord {
    let now = Utc::now();
    HeadlineRecord {
      id: 1,
      theme: "climate_and_environment".into(),
      sub_theme: "weather_alert".into(),
      topic: "Heat-alert".into(),
      metric: AlertTopic::Heat.metric_name(),
      geography_type: "Lower Tier Local Authority".into(),
      geography: "Crawley".into(),
      geography_code: Some("E07000115".into()),
      stratum: "default".into(),
      age: "all".into(),
      sex: "all".into(),
      period_start: now - Duration::days(1),
      period_end,
      metric_value,
      upper_confidence: None,
      lower_confidence: None,
      refresh_date: now - Duration::hours(2),
      embargo: None,
      is_public: true,
    }
  }

  #[test]
  fn status_boundaries() {
    assert_eq!(status(1), AlertStatus::Green);
    assert_eq!(status(6), AlertStatus::Green);
    assert_eq!(status(7), AlertStatus::Yellow);
    assert_eq!(status(11), AlertStatus::Yellow);
    assert_eq!(status(12), AlertStatus::Amber);
    assert_eq!(status(15), AlertStatus::Amber);
    assert_eq!(status(16), AlertStatus::Red);
  }

  #[test]
  fn impact_and_likelihood_cover_the_matrix() {
    let levels = [VERY_LOW, LOW, MEDIUM, HIGH];
    for v in 1..=16 {
      assert!(levels.contains(&impact(v)), "impact({v})");
      assert!(levels.contains(&likelihood(v)), "likelihood({v})");
    }
    assert_eq!(impact(13), HIGH);
    assert_eq!(likelihood(13), VERY_LOW);
    assert_eq!(likelihood(16), HIGH);
    for v in [-1, 0, 17, 100] {
      assert_eq!(impact(v), "");
      assert_eq!(likelihood(v), "");
    }
  }

  #[test]
  fn text_is_shared_below_six() {
    for v in 1..=5 {
      assert_eq!(text(AlertTopic::Heat, v), text(AlertTopic::Cold, v));
    }
    assert_ne!(text(AlertTopic::Heat, 10), text(AlertTopic::Cold, 10));
    assert_eq!(text(AlertTopic::Heat, 16), advice::HEAT[10]);
    assert_eq!(text(AlertTopic::Cold, 0), "");
  }

  #[test]
  fn missing_headline_defaults_to_green() {
    let state = AlertState::current(AlertTopic::Heat, None, Utc::now());
    let detail = state.detail();
    assert_eq!(detail.status, AlertStatus::Green);
    assert_eq!(detail.text, advice::NO_ALERT);
    assert_eq!(detail.period_start, None);
    assert_eq!(detail.period_end, None);
    assert_eq!(detail.refresh_date, None);
  }

  #[test]
  fn live_red_alert() {
    let now = Utc::now();
    let record = headline(16.0, now + Duration::days(14));
    let detail = AlertState::current(AlertTopic::Heat, Some(&record), now).detail();
    assert_eq!(detail.status, AlertStatus::Red);
    assert_eq!(detail.text, advice::HEAT[10]);
    assert_eq!(detail.period_end, Some(record.period_end));
    assert_eq!(detail.refresh_date, Some(record.refresh_date));
  }

  #[test]
  fn expired_alert_falls_back_to_green() {
    let now = Utc::now();
    let record = headline(16.0, now - Duration::days(7));
    let detail = AlertState::current(AlertTopic::Heat, Some(&record), now).detail();
    assert_eq!(detail.status, AlertStatus::Green);
    assert_eq!(detail.text, advice::NO_ALERT);
    assert_eq!(detail.refresh_date, Some(record.period_end));
    assert_eq!(detail.period_start, Some(record.period_start));
  }

  #[test]
  fn topic_naming() {
    assert_eq!("heat".parse::<AlertTopic>().unwrap(), AlertTopic::Heat);
    assert_eq!(AlertTopic::Cold.metric_name(), "Cold-alert_headline_matrixNumber");
  }
}
