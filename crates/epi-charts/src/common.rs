//! Bar and multi-coloured line plots, alone or combined in one figure.

use epi_core::plots::{AxisValue, ChartType, PlotGenerationData};

use crate::{
  Error, Result,
  colour::{self, LineType, Rgba, plot_colour},
  figure::{Figure, Line, Marker, Trace, TraceKind},
  payload::ChartGenerationPayload,
  settings::ChartSettings,
};

const LINE_WIDTH: f64 = 2.0;
const CONFIDENCE_ALPHA: f32 = 0.2;

pub fn generate_chart_figure(payload: &ChartGenerationPayload) -> Result<Figure> {
  if payload.plots.is_empty() {
    return Err(Error::NoPlots);
  }

  let mut data = Vec::new();
  for plot in &payload.plots {
    if payload.confidence_intervals
      && plot.has_confidence_intervals()
      && let Some(band) = confidence_band(plot, payload.confidence_colour.as_deref())
    {
      data.push(band);
    }
    data.push(match plot.parameters.chart_type {
      ChartType::Bar | ChartType::Waffle => bar_trace(plot),
      _ => line_trace(plot),
    });
  }

  let settings = ChartSettings::new(payload);
  let mut layout = settings.common_chart_config();
  layout.showlegend = Some(payload.plots.iter().any(|p| p.parameters.label.is_some()));

  Ok(Figure { data, layout })
}

fn ys(plot: &PlotGenerationData) -> Vec<Option<f64>> { plot.y_values.iter().copied().map(Some).collect() }

pub fn bar_trace(plot: &PlotGenerationData) -> Trace {
  let colour = plot_colour(plot.parameters.line_colour.as_deref(), ChartType::Bar).stringified();
  Trace {
    kind: TraceKind::Bar,
    name: plot.parameters.label.clone(),
    x: plot.x_values.clone(),
    y: ys(plot),
    marker: Some(Marker {
      color: Some(colour.clone()),
      size:  None,
      line:  Some(Line { color: Some(colour), width: Some(1.0), dash: None }),
    }),
    showlegend: Some(plot.parameters.label.is_some()),
    ..Default::default()
  }
}

pub fn line_trace(plot: &PlotGenerationData) -> Trace {
  let p = &plot.parameters;
  let colour = plot_colour(p.line_colour.as_deref(), p.chart_type);
  let dash = LineType::from_name(p.line_type.as_deref());
  Trace {
    kind: TraceKind::Scatter,
    name: p.label.clone(),
    x: plot.x_values.clone(),
    y: ys(plot),
    mode: Some(if p.use_markers { "lines+markers" } else { "lines" }.into()),
    line: Some(Line {
      color: Some(colour.stringified()),
      width: Some(LINE_WIDTH),
      dash:  Some(dash.as_ref().to_owned()),
    }),
    line_shape: Some(if p.use_smooth_lines { "spline" } else { "linear" }.into()),
    marker: p.use_markers.then(|| Marker {
      color: Some(colour.stringified()),
      size:  Some(6.0),
      line:  None,
    }),
    showlegend: Some(p.label.is_some()),
    ..Default::default()
  }
}

/// A closed ribbon from `metric + upper_confidence` along the x values and
/// back along `metric + lower_confidence`. Points without an interval sit
/// on the metric value.
fn confidence_band(plot: &PlotGenerationData, colour_name: Option<&str>) -> Option<Trace> {
  if plot.is_empty() {
    return None;
  }
  let fill: Rgba = match colour_name {
    Some(name) => plot_colour(Some(name), plot.parameters.chart_type).with_alpha(CONFIDENCE_ALPHA),
    None => colour::CONFIDENCE_GREY,
  };

  let upper = plot.y_values.iter().zip(&plot.upper_confidence).map(|(y, u)| y + u.unwrap_or(0.0));
  let lower = plot.y_values.iter().zip(&plot.lower_confidence).map(|(y, l)| y + l.unwrap_or(0.0));

  let x: Vec<AxisValue> = plot.x_values.iter().chain(plot.x_values.iter().rev()).cloned().collect();
  let mut y: Vec<Option<f64>> = upper.map(Some).collect();
  let lower: Vec<Option<f64>> = lower.map(Some).collect();
  y.extend(lower.into_iter().rev());

  Some(Trace {
    kind: TraceKind::Scatter,
    name: plot.parameters.label.as_ref().map(|l| format!("{l} confidence interval")),
    x,
    y,
    mode: Some("lines".into()),
    line: Some(Line { color: Some(colour::WHITE.stringified()), width: Some(0.0), dash: None }),
    fill: Some("toself".into()),
    fillcolor: Some(fill.stringified()),
    showlegend: Some(false),
    legendgroup: plot.parameters.label.clone(),
    hoverinfo: Some("skip".into()),
    ..Default::default()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tests::{payload, series};

  #[test]
  fn one_trace_per_plot() {
    let figure = generate_chart_figure(&payload(vec![
      series(ChartType::Bar, Some("Cases"), 90),
      series(ChartType::LineMultiColoured, None, 90),
    ]))
    .unwrap();

    assert_eq!(figure.data.len(), 2);
    assert_eq!(figure.data[0].kind, TraceKind::Bar);
    assert_eq!(figure.data[1].line_shape.as_deref(), Some("spline"));
    assert_eq!(figure.layout.barmode.as_deref(), Some("group"));
    assert_eq!(figure.layout.showlegend, Some(true));
    assert_eq!(figure.layout.xaxis.kind.as_deref(), Some("date"));
    assert_eq!(figure.layout.xaxis.tickformat.as_deref(), Some("%d %b<br>%Y"));
  }

  #[test]
  fn confidence_band_wraps_the_series() {
    let mut request = payload(vec![series(ChartType::LineMultiColoured, Some("Rate"), 3)]);
    request.confidence_intervals = true;
    let figure = generate_chart_figure(&request).unwrap();

    let band = &figure.data[0];
    assert_eq!(band.fill.as_deref(), Some("toself"));
    assert_eq!(band.x.len(), 6);
    assert_eq!(band.y, vec![Some(2.0), Some(3.0), Some(4.0), Some(2.0), Some(1.0), Some(0.0)]);
    assert_eq!(band.showlegend, Some(false));
  }

  #[test]
  fn no_plots_is_an_error() {
    assert!(matches!(generate_chart_figure(&payload(vec![])), Err(Error::NoPlots)));
  }
}
