//! Side-by-side bar subplots sharing one y axis.

use std::collections::HashSet;

use serde_json::json;

use crate::{
  Error, Result,
  colour,
  common::bar_trace,
  figure::{Annotation, Axis, AxisTitle, Figure, Font, Layout, Legend, Line, Margin, Shape},
  payload::SubplotChartGenerationPayload,
  settings::{tick_font, y_axis_bounds},
};

const HORIZONTAL_SPACING: f64 = 0.03;
const LEGEND_FONT_SIZE: f64 = 14.0;

/// `(base y, multiplier)` of the legend offset for a chart width.
fn legend_size(width: u32) -> (f64, f64) {
  match width {
    ..=400 => (0.6, 2.0),
    ..=515 => (0.4, 2.0),
    ..=650 => (0.5, 2.0),
    ..=1100 => (0.3, 2.0),
    _ => (0.1, 2.0),
  }
}

/// Horizontal domains for `count` equal columns.
pub fn column_domains(count: usize) -> Vec<[f64; 2]> {
  if count == 0 {
    return vec![];
  }
  let gaps = HORIZONTAL_SPACING * (count - 1) as f64;
  let width = (1.0 - gaps) / count as f64;
  (0..count)
    .map(|i| {
      let start = i as f64 * (width + HORIZONTAL_SPACING);
      [start, (start + width).min(1.0)]
    })
    .collect()
}

fn axis_suffix(index: usize) -> String { if index == 0 { String::new() } else { (index + 1).to_string() } }

fn x_axis(domain: [f64; 2], anchor: String) -> Axis {
  Axis {
    domain: Some(domain),
    anchor: Some(anchor),
    kind: Some("-".into()),
    showgrid: Some(true),
    griddash: Some("dash".into()),
    gridcolor: Some("rgba(200,200,200,0.5)".into()),
    ticklen: Some(5.0),
    ticks: Some("outside".into()),
    tickfont: Some(tick_font()),
    ..Default::default()
  }
}

fn y_axis(primary: bool, anchor: String) -> Axis {
  Axis {
    anchor: Some(anchor),
    matches: (!primary).then(|| "y".into()),
    showticklabels: Some(primary),
    ticklen: Some(if primary { 5.0 } else { 0.0 }),
    ticks: Some("outside".into()),
    tickfont: Some(tick_font()),
    tickson: Some("boundaries".into()),
    showgrid: Some(true),
    gridcolor: Some("rgba(220, 220, 220, 0.7)".into()),
    griddash: Some("dash".into()),
    fixedrange: Some(true),
    ..Default::default()
  }
}

pub fn generate_chart_figure(payload: &SubplotChartGenerationPayload) -> Result<Figure> {
  if payload.all_plots().next().is_none() {
    return Err(Error::NoPlots);
  }

  let domains = column_domains(payload.subplots.len());
  let bounds = y_axis_bounds(
    payload.all_plots().flat_map(|p| p.y_values.iter().copied()),
    payload.y_axis_minimum_value,
    payload.y_axis_maximum_value,
  );

  let mut layout = Layout {
    width: Some(payload.chart_width),
    height: Some(payload.chart_height),
    autosize: Some(true),
    paper_bgcolor: Some(colour::WHITE.stringified()),
    plot_bgcolor: Some(colour::WHITE.stringified()),
    margin: Margin { l: 3.0, r: 0.0, t: 3.0, b: 3.0, pad: None },
    barmode: Some("group".into()),
    showlegend: Some(true),
    ..Default::default()
  };
  let (base_y, multiplier) = legend_size(payload.chart_width);
  layout.legend = Some(Legend {
    font: Some(Font { size: Some(LEGEND_FONT_SIZE), ..tick_font() }),
    orientation: Some("h".into()),
    x: Some(0.5),
    y: Some(-(base_y * multiplier)),
    xanchor: Some("center".into()),
    yanchor: Some("bottom".into()),
    ..Default::default()
  });

  let mut data = Vec::new();
  let mut seen_labels = HashSet::new();
  for (index, (subplot, domain)) in payload.subplots.iter().zip(&domains).enumerate() {
    let suffix = axis_suffix(index);
    let (x_ref, y_ref) = (format!("x{suffix}"), format!("y{suffix}"));

    for plot in &subplot.plots {
      let mut trace = bar_trace(plot);
      let label = plot.parameters.label.clone().unwrap_or_default();
      trace.showlegend = Some(!label.is_empty() && seen_labels.insert(label.clone()));
      trace.legendgroup = Some(label);
      trace.xaxis = (index > 0).then(|| x_ref.clone());
      trace.yaxis = (index > 0).then(|| y_ref.clone());
      data.push(trace);
    }

    let mut x = x_axis(*domain, y_ref.clone());
    if index == 0 && !payload.x_axis_title.is_empty() {
      x.title = Some(AxisTitle { text: payload.x_axis_title.clone(), font: Some(tick_font()) });
    }
    let mut y = y_axis(index == 0, x_ref);
    if let Some((min, max)) = bounds {
      y.range = Some([json!(min), json!(max)]);
    }
    if index == 0 && !payload.y_axis_title.is_empty() {
      y.title = Some(AxisTitle { text: payload.y_axis_title.clone(), font: Some(tick_font()) });
    }
    *layout.axis_mut(&format!("xaxis{suffix}")) = x;
    *layout.axis_mut(&format!("yaxis{suffix}")) = y;

    layout.annotations.push(Annotation {
      text:      subplot.subplot_title.clone(),
      x:         (domain[0] + domain[1]) / 2.0,
      y:         1.0,
      xref:      "paper".into(),
      yref:      "paper".into(),
      xanchor:   Some("center".into()),
      yanchor:   Some("bottom".into()),
      showarrow: false,
      font:      Some(tick_font()),
    });
  }

  if let Some(threshold) = payload.target_threshold {
    layout.shapes.push(Shape {
      kind: "line".into(),
      xref: "paper".into(),
      yref: "y".into(),
      x0:   json!(0),
      x1:   json!(1),
      y0:   json!(threshold),
      y1:   json!(threshold),
      line: Some(Line {
        color: Some(colour::LineColour::RED.rgba().stringified()),
        width: Some(2.0),
        dash:  Some("dash".into()),
      }),
    });
    if !payload.target_threshold_label.is_empty() {
      layout.annotations.push(Annotation {
        text:      payload.target_threshold_label.clone(),
        x:         1.0,
        y:         threshold,
        xref:      "paper".into(),
        yref:      "y".into(),
        xanchor:   Some("right".into()),
        yanchor:   Some("bottom".into()),
        showarrow: false,
        font:      Some(tick_font()),
      });
    }
  }

  Ok(Figure { data, layout })
}
