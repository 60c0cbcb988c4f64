//! Dual-category charts: one trace per segment of the secondary category,
//! drawn across the values of the primary category.

use epi_core::plots::{DualCategoryChartRequestParams, PlotGenerationData};

use crate::{Result, common, figure::Figure, payload::ChartGenerationPayload};

/// Restrict and order a plot's points to `primary_values`. An empty list
/// keeps every point in its stored order.
pub fn order_by_primary_values(plot: &mut PlotGenerationData, primary_values: &[String]) {
  if primary_values.is_empty() {
    return;
  }
  plot.retain_x(primary_values);

  let rank = |x: &epi_core::plots::AxisValue| {
    let x = x.to_string();
    primary_values.iter().position(|v| *v == x).unwrap_or(usize::MAX)
  };
  let mut order: Vec<usize> = (0..plot.len()).collect();
  order.sort_by_key(|&i| rank(&plot.x_values[i]));

  plot.x_values = order.iter().map(|&i| plot.x_values[i].clone()).collect();
  plot.y_values = order.iter().map(|&i| plot.y_values[i]).collect();
  plot.in_reporting_delay_period = order.iter().map(|&i| plot.in_reporting_delay_period[i]).collect();
  plot.upper_confidence = order.iter().map(|&i| plot.upper_confidence[i]).collect();
  plot.lower_confidence = order.iter().map(|&i| plot.lower_confidence[i]).collect();
}

pub fn generate_chart_figure(
  request: &DualCategoryChartRequestParams,
  mut plots: Vec<PlotGenerationData>,
) -> Result<Figure> {
  for plot in &mut plots {
    order_by_primary_values(plot, &request.primary_field_values);
  }
  plots.retain(|p| !p.is_empty());
  let payload = ChartGenerationPayload::for_dual_category(request, plots);
  common::generate_chart_figure(&payload)
}

#[cfg(test)]
mod tests {
  use epi_core::plots::{AxisValue, ChartType, PlotParameters, PlotPoint};

  use super::*;

  fn by_sex() -> PlotGenerationData {
    let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
    let points = [("all", 9.0), ("f", 4.0), ("m", 5.0)]
      .into_iter()
      .map(|(sex, y)| PlotPoint {
        x: AxisValue::Text(sex.into()),
        y,
        in_reporting_delay_period: false,
        upper_confidence: None,
        lower_confidence: None,
        date,
      })
      .collect();
    let parameters = PlotParameters {
      chart_type: ChartType::Bar,
      topic: "COVID-19".into(),
      metric: "COVID-19_cases_casesByDay".into(),
      ..Default::default()
    };
    PlotGenerationData::from_points(parameters, points).unwrap()
  }

  #[test]
  fn primary_values_filter_and_order_points() {
    let mut plot = by_sex();
    order_by_primary_values(&mut plot, &["m".to_owned(), "f".to_owned()]);
    assert_eq!(plot.x_values, vec![AxisValue::Text("m".into()), AxisValue::Text("f".into())]);
    assert_eq!(plot.y_values, vec![5.0, 4.0]);
    assert_eq!(plot.in_reporting_delay_period.len(), 2);
  }

  #[test]
  fn no_primary_values_keeps_everything() {
    let mut plot = by_sex();
    order_by_primary_values(&mut plot, &[]);
    assert_eq!(plot.len(), 3);
  }
}
