//! Trend direction and colour.
//!
//! A trend pairs an absolute change metric with its percentage change. The
//! sign of the change gives the direction; whether that direction is good
//! news depends on the metric family, looked up in a [`MetricFamilyTable`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  Up,
  Neutral,
  Down,
}

impl Direction {
  pub fn of(metric_value: f64) -> Self {
    if metric_value > 0.0 {
      Direction::Up
    } else if metric_value < 0.0 {
      Direction::Down
    } else {
      Direction::Neutral
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendColour {
  Green,
  Neutral,
  Red,
}

/// Ordered `(substring, increase_is_improving)` rules. The first rule whose
/// substring occurs in the metric name wins; unmatched metrics use
/// `default_improving`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFamilyTable {
  pub rules:             Vec<(String, bool)>,
  pub default_improving: bool,
}

impl Default for MetricFamilyTable {
  fn default() -> Self {
    let rule = |s: &str, improving| (s.to_owned(), improving);
    Self {
      rules:             vec![
        rule("vaccin", true),
        rule("testing", true),
        rule("tests", true),
        rule("cases", false),
        rule("deaths", false),
        rule("admission", false),
        rule("healthcare", false),
        rule("positivity", false),
        rule("occupied", false),
      ],
      default_improving: false,
    }
  }
}

impl MetricFamilyTable {
  pub fn increase_is_improving(&self, metric: &str) -> bool {
    let lowered = metric.to_lowercase();
    self
      .rules
      .iter()
      .find(|(substring, _)| lowered.contains(&substring.to_lowercase()))
      .map_or(self.default_improving, |(_, improving)| *improving)
  }

  pub fn colour(&self, metric: &str, direction: Direction) -> TrendColour {
    let improving = self.increase_is_improving(metric);
    match (direction, improving) {
      (Direction::Neutral, _) => TrendColour::Neutral,
      (Direction::Up, true) | (Direction::Down, false) => TrendColour::Green,
      (Direction::Up, false) | (Direction::Down, true) => TrendColour::Red,
    }
  }
}

/// The payload returned by the trends endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
  pub metric_name:             String,
  pub metric_value:            f64,
  pub percentage_metric_name:  String,
  pub percentage_metric_value: f64,
  pub direction:               Direction,
  pub colour:                  TrendColour,
}

impl Trend {
  pub fn new(
    table: &MetricFamilyTable,
    metric_name: String,
    metric_value: f64,
    percentage_metric_name: String,
    percentage_metric_value: f64,
  ) -> Self {
    let direction = Direction::of(metric_value);
    let colour = table.colour(&metric_name, direction);
    Self {
      metric_name,
      metric_value,
      percentage_metric_name,
      percentage_metric_value,
      direction,
      colour,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rising_cases_are_red() {
    let trend = Trend::new(
      &MetricFamilyTable::default(),
      "COVID-19_headline_cases_7DayChange".into(),
      592.0,
      "COVID-19_headline_cases_7DayPercentChange".into(),
      3.1,
    );
    assert_eq!(trend.direction, Direction::Up);
    assert_eq!(trend.colour, TrendColour::Red);
  }

  #[test]
  fn falling_vaccinations_are_red_rising_are_green() {
    let table = MetricFamilyTable::default();
    let metric = "COVID-19_headline_vaccines_spring24Uptake";
    assert_eq!(table.colour(metric, Direction::Down), TrendColour::Red);
    assert_eq!(table.colour(metric, Direction::Up), TrendColour::Green);
  }

  #[test]
  fn zero_change_is_neutral() {
    let table = MetricFamilyTable::default();
    assert_eq!(Direction::of(0.0), Direction::Neutral);
    assert_eq!(table.colour("anything", Direction::Neutral), TrendColour::Neutral);
  }

  #[test]
  fn custom_rules_take_precedence_in_order() {
    let table = MetricFamilyTable {
      rules:             vec![("cases".into(), true), ("cases".into(), false)],
      default_improving: false,
    };
    assert!(table.increase_is_improving("x_cases_y"));
    assert!(!table.increase_is_improving("x_other_y"));
  }
}
