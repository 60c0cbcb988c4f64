//! A plotly-compatible figure: traces plus layout.
//!
//! The JSON form is what the frontend renders interactively; the same value
//! is drawn to SVG by [`crate::svg`]. Only the attributes this service sets
//! are modelled. Unset attributes are omitted from the JSON.

use std::collections::BTreeMap;

use epi_core::plots::AxisValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Figure {
  pub data:   Vec<Trace>,
  pub layout: Layout,
}

impl Figure {
  pub fn to_json(&self) -> crate::Result<Value> { Ok(serde_json::to_value(self)?) }
}

// ─── Traces ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
  #[default]
  Scatter,
  Bar,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
  #[serde(rename = "type")]
  pub kind:          TraceKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:          Option<String>,
  pub x:             Vec<AxisValue>,
  pub y:             Vec<Option<f64>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub mode:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line:          Option<Line>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line_shape:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub marker:        Option<Marker>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fill:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fillcolor:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub showlegend:    Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub legendgroup:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hoverinfo:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hovertemplate: Option<String>,
  /// Axis references for subplots (`x2`, `y2`, ...).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub xaxis:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub yaxis:         Option<String>,
}

impl Trace {
  /// The layout keys of the axes this trace is drawn against.
  pub fn axis_keys(&self) -> (String, String) {
    let key = |r: &Option<String>, base: &str| match r.as_deref() {
      Some(r) if r.len() > 1 => format!("{base}axis{}", &r[1..]),
      _ => format!("{base}axis"),
    };
    (key(&self.xaxis, "x"), key(&self.yaxis, "y"))
  }

  pub fn is_legend_entry(&self) -> bool {
    self.showlegend != Some(false) && self.name.as_deref().is_some_and(|n| !n.is_empty())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub width: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dash:  Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Marker {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub size:  Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line:  Option<Line>,
}

// ─── Layout ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub width:         Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub height:        Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub autosize:      Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub paper_bgcolor: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub plot_bgcolor:  Option<String>,
  #[serde(default)]
  pub margin:        Margin,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub showlegend:    Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub legend:        Option<Legend>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub barmode:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hoverlabel:    Option<HoverLabel>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub hovermode:     Option<String>,
  #[serde(default)]
  pub xaxis:         Axis,
  #[serde(default)]
  pub yaxis:         Axis,
  /// `xaxis2`, `yaxis2`, ... for subplots.
  #[serde(flatten)]
  pub extra_axes:    BTreeMap<String, Axis>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub annotations:   Vec<Annotation>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub shapes:        Vec<Shape>,
}

impl Layout {
  pub fn axis(&self, key: &str) -> Option<&Axis> {
    match key {
      "xaxis" => Some(&self.xaxis),
      "yaxis" => Some(&self.yaxis),
      other => self.extra_axes.get(other),
    }
  }

  pub fn axis_mut(&mut self, key: &str) -> &mut Axis {
    match key {
      "xaxis" => &mut self.xaxis,
      "yaxis" => &mut self.yaxis,
      other => self.extra_axes.entry(other.to_owned()).or_default(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Margin {
  #[serde(default)]
  pub l:   f64,
  #[serde(default)]
  pub r:   f64,
  #[serde(default)]
  pub t:   f64,
  #[serde(default)]
  pub b:   f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub pad: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Font {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub family: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub color:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub size:   Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Legend {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub font:            Option<Font>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub orientation:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub x:               Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub y:               Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub xanchor:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub yanchor:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:           Option<String>,
  /// `false` disables toggling traces from the legend.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub itemclick:       Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub itemdoubleclick: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoverLabel {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bgcolor: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub font:    Option<Font>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisTitle {
  pub text: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub font: Option<Font>,
}

/// An axis interval: a plotly duration string (`M1`, `D7`) or milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dtick {
  Millis(u64),
  Period(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Axis {
  /// `date`, `-` (auto/categorical) or `linear`.
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub kind:           Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub visible:        Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:          Option<AxisTitle>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub range:          Option<[Value; 2]>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub rangemode:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub domain:         Option<[f64; 2]>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub anchor:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub matches:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tick0:          Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub dtick:          Option<Dtick>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tickformat:     Option<String>,
  /// Number formats by tick spacing, as `{dtickrange, value}` objects.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tickformatstops: Option<Vec<Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tickvals:       Option<Vec<Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ticktext:       Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ticks:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ticklen:        Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tickson:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tickcolor:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tickfont:       Option<Font>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub showticklabels: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub showgrid:       Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub gridcolor:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub griddash:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub showline:       Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub zeroline:       Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub fixedrange:     Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub showspikes:     Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub spikecolor:     Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub spikemode:      Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
  pub text:      String,
  pub x:         f64,
  pub y:         f64,
  #[serde(default = "paper")]
  pub xref:      String,
  #[serde(default = "paper")]
  pub yref:      String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub xanchor:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub yanchor:   Option<String>,
  #[serde(default)]
  pub showarrow: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub font:      Option<Font>,
}

fn paper() -> String { "paper".into() }

/// A horizontal or vertical rule drawn on the plot, e.g. a target
/// threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
  #[serde(rename = "type")]
  pub kind: String,
  pub xref: String,
  pub yref: String,
  pub x0:   Value,
  pub x1:   Value,
  pub y0:   Value,
  pub y1:   Value,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub line: Option<Line>,
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use serde_json::json;

  use super::*;

  #[test]
  fn unset_attributes_are_omitted() {
    let trace = Trace {
      kind: TraceKind::Bar,
      x: vec![AxisValue::Date(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap())],
      y: vec![Some(4.0)],
      ..Default::default()
    };
    assert_eq!(
      serde_json::to_value(&trace).unwrap(),
      json!({"type": "bar", "x": ["2023-01-02"], "y": [4.0]})
    );
  }

  #[test]
  fn subplot_axes_flatten_into_layout() {
    let mut layout = Layout::default();
    layout.axis_mut("xaxis2").domain = Some([0.5, 1.0]);
    let value = serde_json::to_value(&layout).unwrap();
    assert_eq!(value["xaxis2"]["domain"], json!([0.5, 1.0]));

    let trace = Trace { xaxis: Some("x2".into()), yaxis: Some("y2".into()), ..Default::default() };
    assert_eq!(trace.axis_keys(), ("xaxis2".to_owned(), "yaxis2".to_owned()));
    assert_eq!(Trace::default().axis_keys(), ("xaxis".to_owned(), "yaxis".to_owned()));
  }
}
