//! The single-plot simplified line chart: one line, and tick labels only at
//! the first and last value of each axis.

use epi_core::plots::{AxisValue, ChartType};
use serde_json::json;

use crate::{
  Error, Result,
  colour::{self, plot_colour},
  figure::{Figure, Line, Margin, Trace, TraceKind},
  payload::ChartGenerationPayload,
  settings::{ChartSettings, date_value},
};

const SUFFIXES: [&str; 3] = ["", "k", "m"];
const E_NOTATION: [f64; 4] = [1e0, 1e3, 1e6, 1e9];

/// Shorten a whole number: `1000 → 1k`, `2690 → 2k`, `100_000_000 → 100m`.
/// Values of a billion or more cannot be shortened.
pub fn short_number(number: f64) -> Result<String> {
  if number < E_NOTATION[1] {
    return Ok(format!("{}", number as i64));
  }
  for (window, suffix) in E_NOTATION.windows(2).zip(SUFFIXES) {
    if window[0] <= number && number < window[1] {
      return Ok(format!("{}{suffix}", (number / window[0]) as i64));
    }
  }
  Err(Error::NumberTooLarge(number))
}

/// Round to the nearest multiple of the leading place value:
/// `1412 → 1000`, `87 → 90`. Ties go to the even multiple.
pub fn round_to_leading_place(value: f64) -> f64 {
  let whole = value.round_ties_even();
  let digits = format!("{}", whole.abs() as i64).len() as i32;
  let scale = 10f64.powi(digits - 1);
  (whole / scale).round_ties_even() * scale
}

pub fn formatted_axis_value(value: f64) -> Result<String> { short_number(round_to_leading_place(value)) }

pub fn generate_chart_figure(payload: &ChartGenerationPayload) -> Result<Figure> {
  let plot = payload.plots.first().ok_or(Error::NoPlots)?;
  let settings = ChartSettings::new(payload);
  let (min, max) = settings.y_bounds().ok_or(Error::NoPlots)?;

  let colour = plot_colour(plot.parameters.line_colour.as_deref(), ChartType::LineSingleSimplified);
  let trace = Trace {
    kind: TraceKind::Scatter,
    name: plot.parameters.label.clone(),
    x: plot.x_values.clone(),
    y: plot.y_values.iter().copied().map(Some).collect(),
    mode: Some("lines".into()),
    line: Some(Line { color: Some(colour.stringified()), width: Some(2.0), dash: None }),
    line_shape: Some("linear".into()),
    showlegend: Some(false),
    ..Default::default()
  };

  let mut layout = settings.base_chart_config();
  layout.showlegend = Some(false);
  layout.margin = Margin { l: 25.0, r: 35.0, t: 12.0, b: 0.0, pad: Some(25.0) };

  let (first, last) = match (plot.x_values.first(), plot.x_values.last()) {
    (Some(first), Some(last)) => (first, last),
    _ => return Err(Error::NoPlots),
  };
  let tick = |x: &AxisValue| match x {
    AxisValue::Date(d) => (date_value(*d), d.format("%b, %Y").to_string()),
    AxisValue::Text(t) => (json!(t), t.clone()),
  };
  let (first_val, first_text) = tick(first);
  let (last_val, last_text) = tick(last);

  let x = &mut layout.xaxis;
  x.showgrid = Some(false);
  x.ticks = Some("outside".into());
  x.tickvals = Some(vec![first_val, last_val]);
  x.ticktext = Some(vec![first_text, last_text]);
  x.ticklen = Some(0.0);
  if let Some(font) = x.tickfont.as_mut() {
    font.color = Some(colour::LS_DARK_GREY.stringified());
  }

  let y = &mut layout.yaxis;
  y.zeroline = Some(false);
  y.ticks = Some("outside".into());
  y.tickvals = Some(vec![json!(min), json!(max)]);
  y.ticktext = Some(vec![formatted_axis_value(min)?, formatted_axis_value(max)?]);
  y.ticklen = Some(0.0);
  y.range = Some([json!(min), json!(max)]);
  y.rangemode = Some(if min == 0.0 { "tozero" } else { "normal" }.into());
  if let Some(font) = y.tickfont.as_mut() {
    font.color = Some(colour::LS_DARK_GREY.stringified());
  }

  Ok(Figure { data: vec![trace], layout })
}
