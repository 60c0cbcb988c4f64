//! Inputs to the chart generators: assembled plot data plus the
//! presentation parameters of the request.

use epi_core::plots::{
  ChartRequestParams, DualCategoryChartRequestParams, PlotGenerationData, SubplotChartRequestParams,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ChartGenerationPayload {
  pub plots:                Vec<PlotGenerationData>,
  pub x_axis_title:         String,
  pub y_axis_title:         String,
  pub chart_width:          u32,
  pub chart_height:         u32,
  pub y_axis_minimum_value: f64,
  pub y_axis_maximum_value: Option<f64>,
  pub legend_title:         String,
  pub confidence_intervals: bool,
  pub confidence_colour:    Option<String>,
}

impl ChartGenerationPayload {
  pub fn new(request: &ChartRequestParams, plots: Vec<PlotGenerationData>) -> Self {
    Self {
      plots,
      x_axis_title: request.x_axis_title.clone(),
      y_axis_title: request.y_axis_title.clone(),
      chart_width: request.chart_width,
      chart_height: request.chart_height,
      y_axis_minimum_value: request.y_axis_minimum_value,
      y_axis_maximum_value: request.y_axis_maximum_value,
      legend_title: request.legend_title.clone(),
      confidence_intervals: request.confidence_intervals,
      confidence_colour: request.confidence_colour.clone(),
    }
  }

  pub fn for_dual_category(
    request: &DualCategoryChartRequestParams,
    plots: Vec<PlotGenerationData>,
  ) -> Self {
    Self::new(&request.to_chart_request(), plots)
  }

  /// Whether the plots are drawn from headline data.
  pub fn is_headline(&self) -> bool { self.plots.first().is_some_and(|p| p.parameters.is_headline()) }
}

/// One subplot's title and the data of its plots, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubplotGenerationData {
  pub subplot_title: String,
  pub plots:         Vec<PlotGenerationData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubplotChartGenerationPayload {
  pub subplots:               Vec<SubplotGenerationData>,
  pub x_axis_title:           String,
  pub y_axis_title:           String,
  pub chart_width:            u32,
  pub chart_height:           u32,
  pub y_axis_minimum_value:   f64,
  pub y_axis_maximum_value:   Option<f64>,
  pub target_threshold:       Option<f64>,
  pub target_threshold_label: String,
}

impl SubplotChartGenerationPayload {
  pub fn new(request: &SubplotChartRequestParams, subplots: Vec<SubplotGenerationData>) -> Self {
    Self {
      subplots,
      x_axis_title: request.x_axis_title.clone(),
      y_axis_title: request.y_axis_title.clone(),
      chart_width: request.chart_width,
      chart_height: request.chart_height,
      y_axis_minimum_value: request.y_axis_minimum_value,
      y_axis_maximum_value: request.y_axis_maximum_value,
      target_threshold: request.target_threshold,
      target_threshold_label: request.target_threshold_label.clone(),
    }
  }

  /// Every plot across every subplot, in order.
  pub fn all_plots(&self) -> impl Iterator<Item = &PlotGenerationData> {
    self.subplots.iter().flat_map(|s| &s.plots)
  }
}
