//! Tabular output: plots merged along their x values into one row per
//! reference.

use std::collections::BTreeMap;

use epi_core::plots::{ChartAxis, PlotGenerationData};
use serde::{Deserialize, Serialize};

/// One cell of a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableValue {
  pub label:                     String,
  pub value:                     Option<f64>,
  pub in_reporting_delay_period: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub upper_confidence:          Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub lower_confidence:          Option<f64>,
}

impl TableValue {
  /// The placeholder for a plot with no value at a reference.
  pub fn missing(label: impl Into<String>) -> Self {
    Self {
      label:                     label.into(),
      value:                     None,
      in_reporting_delay_period: false,
      upper_confidence:          None,
      lower_confidence:          None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
  pub reference: String,
  pub values:    Vec<TableValue>,
}

/// The column label of the plot at `index` (zero-based).
pub fn plot_label(plot: &PlotGenerationData, index: usize) -> String {
  plot.parameters.label.clone().unwrap_or_else(|| format!("Plot{}", index + 1))
}

/// Merge plots into rows keyed by the text of their x values.
///
/// Every row has one value per plot, in plot order; a plot with no point at
/// a reference contributes a null value. Rows are sorted by reference in
/// the x axis's key order.
pub fn generate_table(plots: &[PlotGenerationData]) -> Vec<TableRow> {
  let labels: Vec<String> = plots.iter().enumerate().map(|(i, p)| plot_label(p, i)).collect();
  let axis = plots.first().map(|p| p.parameters.x_axis_value()).unwrap_or(ChartAxis::DEFAULT_X);

  let mut combined: BTreeMap<String, Vec<Option<TableValue>>> = BTreeMap::new();
  for (index, plot) in plots.iter().enumerate() {
    for i in 0..plot.len() {
      let cells = combined.entry(plot.x_values[i].to_string()).or_insert_with(|| vec![None; plots.len()]);
      cells[index] = Some(TableValue {
        label:                     labels[index].clone(),
        value:                     Some(plot.y_values[i]),
        in_reporting_delay_period: plot.in_reporting_delay_period[i],
        upper_confidence:          plot.upper_confidence[i],
        lower_confidence:          plot.lower_confidence[i],
      });
    }
  }

  let mut rows: Vec<TableRow> = combined
    .into_iter()
    .map(|(reference, cells)| TableRow {
      reference,
      values: cells
        .into_iter()
        .zip(&labels)
        .map(|(cell, label)| cell.unwrap_or_else(|| TableValue::missing(label.as_str())))
        .collect(),
    })
    .collect();
  rows.sort_by(|a, b| axis.compare_keys(&a.reference, &b.reference));
  rows
}

// ─── Subplot tables ──────────────────────────────────────────────────────────

/// The data assembled for one group of a subplot table.
#[derive(Debug, Clone, PartialEq)]
pub struct SubplotTableGroup {
  pub reference: String,
  /// One cell per subplot, `None` where the subplot has no data.
  pub cells:     Vec<Option<PlotGenerationData>>,
}

/// One row per group with one value per subplot, in subplot order. A
/// subplot with no data for a group gets a null cell.
///
/// Cells are matched to subplots by position, so subplots may share a
/// title.
pub fn generate_subplot_table(subplot_titles: &[String], groups: Vec<SubplotTableGroup>) -> Vec<TableRow> {
  groups
    .into_iter()
    .map(|group| {
      let values = subplot_titles
        .iter()
        .enumerate()
        .map(|(index, title)| {
          group
            .cells
            .get(index)
            .and_then(Option::as_ref)
            .and_then(|plot| subplot_cell(plot, &group.reference))
            .map(|value| TableValue { label: title.clone(), ..value })
            .unwrap_or_else(|| TableValue::missing(title.as_str()))
        })
        .collect();
      TableRow { reference: group.reference, values }
    })
    .collect()
}

/// The value a plot contributes to a group: its point at the group
/// reference, else its first point.
fn subplot_cell(plot: &PlotGenerationData, reference: &str) -> Option<TableValue> {
  let rows = generate_table(std::slice::from_ref(plot));
  let row = rows.iter().find(|r| r.reference == reference).or_else(|| rows.first())?;
  row.values.first().filter(|v| v.value.is_some()).cloned()
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use epi_core::plots::{AxisValue, ChartType, PlotParameters, PlotPoint};

  use super::*;
  use crate::tests::series;

  fn by_age(label: &str, ages: &[(&str, f64)]) -> PlotGenerationData { keyed_by("age", label, ages) }

  fn keyed_by(axis: &str, label: &str, keys: &[(&str, f64)]) -> PlotGenerationData {
    let date = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
    let points = keys
      .iter()
      .map(|(key, y)| PlotPoint {
        x: AxisValue::Text((*key).into()),
        y: *y,
        in_reporting_delay_period: false,
        upper_confidence: None,
        lower_confidence: None,
        date,
      })
      .collect();
    let parameters = PlotParameters {
      chart_type: ChartType::Bar,
      topic: "COVID-19".into(),
      metric: "COVID-19_cases_rateRollingMean".into(),
      label: Some(label.into()),
      x_axis: Some(axis.into()),
      ..Default::default()
    };
    PlotGenerationData::from_points(parameters, points).unwrap()
  }

  #[test]
  fn rows_merge_plots_by_reference() {
    let rows = generate_table(&[series(ChartType::Bar, None, 3), series(ChartType::LineMultiColoured, Some("Rate"), 2)]);

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].reference, "2023-01-01");
    assert_eq!(rows[0].values[0].label, "Plot1");
    assert_eq!(rows[0].values[1].label, "Rate");
    assert_eq!(rows[2].values[0].value, Some(3.0));
    assert_eq!(rows[2].values[1], TableValue::missing("Rate"));
    assert_eq!(rows[0].values[0].upper_confidence, Some(1.0));
  }

  #[test]
  fn ages_sort_naturally() {
    let rows = generate_table(&[by_age("Cases", &[("85+", 1.0), ("05-09", 2.0), ("00-04", 3.0), ("10-14", 4.0)])]);
    let references: Vec<&str> = rows.iter().map(|r| r.reference.as_str()).collect();
    assert_eq!(references, vec!["00-04", "05-09", "10-14", "85+"]);
  }

  #[test]
  fn metric_references_sort_numerically() {
    let rows = generate_table(&[keyed_by("metric", "Value", &[("10", 10.0), ("9.5", 9.5), ("100", 100.0)])]);
    let references: Vec<&str> = rows.iter().map(|r| r.reference.as_str()).collect();
    assert_eq!(references, vec!["9.5", "10", "100"]);
  }

  #[test]
  fn subplot_cells_match_by_position() {
    let titles = vec!["Coverage".to_string(), "Coverage".to_string(), "Uptake".to_string()];
    let groups = vec![SubplotTableGroup {
      reference: "00-04".into(),
      cells:     vec![None, Some(by_age("Coverage", &[("00-04", 7.0)])), Some(by_age("Uptake", &[("00-04", 9.0)]))],
    }];

    let rows = generate_subplot_table(&titles, groups);

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].values[0], TableValue::missing("Coverage"));
    assert_eq!(rows[0].values[1].label, "Coverage");
    assert_eq!(rows[0].values[1].value, Some(7.0));
    assert_eq!(rows[0].values[2].value, Some(9.0));
  }

  #[test]
  fn subplot_groups_without_data_keep_their_row() {
    let titles = vec!["A".to_string(), "B".to_string()];
    let groups = vec![
      SubplotTableGroup { reference: "05-09".into(), cells: vec![Some(by_age("A", &[("05-09", 1.0)])), None] },
      SubplotTableGroup { reference: "10-14".into(), cells: vec![None, None] },
    ];

    let rows = generate_subplot_table(&titles, groups);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].reference, "10-14");
    assert_eq!(rows[1].values, vec![TableValue::missing("A"), TableValue::missing("B")]);
  }

  #[test]
  fn missing_cells_serialize_as_null() {
    let json = serde_json::to_value(TableValue::missing("Plot1")).unwrap();
    assert_eq!(json, serde_json::json!({"label": "Plot1", "value": null, "in_reporting_delay_period": false}));
  }
}
