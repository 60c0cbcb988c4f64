//! Layout presets shared by the single-category generators.

use chrono::{Datelike, Duration, NaiveDate};
use epi_core::plots::{AxisValue, DEFAULT_CHART_WIDTH, PlotGenerationData};
use serde_json::{Value, json};

use crate::{
  colour,
  figure::{Axis, AxisTitle, Dtick, Font, Layout, Legend, Margin},
  payload::ChartGenerationPayload,
};

/// Charts at or below this width wrap the year of date ticks onto a second
/// line.
pub const NARROW_CHART_WIDTH: u32 = DEFAULT_CHART_WIDTH;

const WEEK_IN_MILLISECONDS: u64 = 604_800_000;
const TWO_WEEKS_IN_MILLISECONDS: u64 = 1_209_600_000;

pub fn tick_font() -> Font {
  Font {
    family: Some("Arial".into()),
    color:  Some(colour::DARK_BLUE_GREY.stringified()),
    size:   None,
  }
}

pub fn date_value(date: NaiveDate) -> Value { Value::String(date.format("%Y-%m-%d").to_string()) }

/// Tick label format for a date axis.
pub fn date_tick_format(width: u32, weekly: bool) -> &'static str {
  match (width > NARROW_CHART_WIDTH, weekly) {
    (true, false) => "%b %Y",
    (false, false) => "%b<br>%Y",
    (true, true) => "%d %b %Y",
    (false, true) => "%d %b<br>%Y",
  }
}

/// Days and whole calendar months between two dates.
pub fn number_of_days_and_months(min: NaiveDate, max: NaiveDate) -> (i64, i32) {
  let days = (max - min).num_days();
  let months = (max.year() - min.year()) * 12 + (max.month() as i32 - min.month() as i32);
  (days, months)
}

/// The tick interval for a date range of the given length.
pub fn x_axis_interval(days: i64, months: i32) -> Dtick {
  match (days, months) {
    (..=7, _) => Dtick::Period("D7".into()),
    (..=61, _) => Dtick::Millis(WEEK_IN_MILLISECONDS),
    (..=92, _) => Dtick::Millis(TWO_WEEKS_IN_MILLISECONDS),
    (_, ..=12) => Dtick::Period("M1".into()),
    (_, ..=24) => Dtick::Period("M3".into()),
    (_, ..=36) => Dtick::Period("M6".into()),
    _ => Dtick::Period("M12".into()),
  }
}

/// Half an interval in days: how far the axis range is padded on each side
/// so the outermost points are not cropped.
pub fn timeseries_margin_days(interval: &Dtick) -> i64 {
  match interval {
    Dtick::Period(p) if p == "M1" => 15,
    Dtick::Period(p) if p == "M3" => 45,
    Dtick::Period(p) if p == "M6" => 90,
    Dtick::Period(p) if p == "M12" => 178,
    _ => 1,
  }
}

/// The y range of a chart: the data's extent, widened by the requested
/// minimum and maximum only where they lie beyond the data.
pub fn y_axis_bounds(
  values: impl IntoIterator<Item = f64>,
  minimum: f64,
  maximum: Option<f64>,
) -> Option<(f64, f64)> {
  let (lo, hi) = values
    .into_iter()
    .filter(|v| v.is_finite())
    .fold(None, |acc: Option<(f64, f64)>, v| match acc {
      None => Some((v, v)),
      Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })?;
  let min = if minimum < lo { minimum } else { lo };
  let max = match maximum {
    Some(m) if m > hi => m,
    _ => hi,
  };
  Some((min, max))
}

fn number(v: f64) -> Value { json!(v) }

// ─── Single-category settings ────────────────────────────────────────────────

pub struct ChartSettings<'a> {
  payload: &'a ChartGenerationPayload,
}

impl<'a> ChartSettings<'a> {
  pub fn new(payload: &'a ChartGenerationPayload) -> Self { Self { payload } }

  pub fn width(&self) -> u32 { self.payload.chart_width }

  pub fn height(&self) -> u32 { self.payload.chart_height }

  pub fn plots(&self) -> &'a [PlotGenerationData] { &self.payload.plots }

  pub fn is_date_type_x_axis(&self) -> bool {
    self
      .plots()
      .first()
      .and_then(|p| p.x_values.first())
      .is_some_and(|x| matches!(x, AxisValue::Date(_)))
  }

  /// Every plotted y value across every plot.
  pub fn y_values(&self) -> impl Iterator<Item = f64> + 'a {
    self.plots().iter().flat_map(|p| p.y_values.iter().copied())
  }

  pub fn y_bounds(&self) -> Option<(f64, f64)> {
    y_axis_bounds(
      self.y_values(),
      self.payload.y_axis_minimum_value,
      self.payload.y_axis_maximum_value,
    )
  }

  fn title(&self, text: &str) -> Option<AxisTitle> {
    (!text.is_empty()).then(|| AxisTitle { text: text.to_owned(), font: Some(tick_font()) })
  }

  fn x_axis_config(&self) -> Axis {
    let mut axis = Axis {
      kind: Some("date".into()),
      title: self.title(&self.payload.x_axis_title),
      dtick: Some(Dtick::Period("M1".into())),
      tickformat: Some("%b %Y".into()),
      ticks: Some("outside".into()),
      tickson: Some("boundaries".into()),
      tickcolor: Some("rgba(0,0,0,0)".into()),
      tickfont: Some(tick_font()),
      showgrid: Some(true),
      gridcolor: Some("rgba(0,0,0,0.05)".into()),
      showline: Some(false),
      zeroline: Some(false),
      fixedrange: Some(true),
      showspikes: Some(true),
      spikecolor: Some("#b1b4b6".into()),
      spikemode: Some("toaxis+across+marker".into()),
      ..Default::default()
    };
    if self.is_date_type_x_axis() {
      self.apply_x_axis_date_type(&mut axis);
    } else {
      apply_x_axis_text_type(&mut axis);
    }
    axis
  }

  fn y_axis_config(&self) -> Axis {
    let mut axis = Axis {
      title: self.title(&self.payload.y_axis_title),
      ticks: Some("outside".into()),
      tickson: Some("boundaries".into()),
      tickcolor: Some("rgba(0,0,0,0)".into()),
      tickformatstops: Some(vec![
        json!({"dtickrange": [null, 999], "value": ","}),
        json!({"dtickrange": [1000, 99999], "value": ",.0f"}),
        json!({"dtickrange": [100000, null], "value": ".0s"}),
      ]),
      showgrid: Some(false),
      showticklabels: Some(true),
      fixedrange: Some(true),
      gridcolor: Some("#000".into()),
      tickfont: Some(tick_font()),
      rangemode: Some("tozero".into()),
      ..Default::default()
    };
    if let Some((min, max)) = self.y_bounds() {
      axis.tick0 = Some(number(min));
      if self.payload.y_axis_maximum_value.is_some() {
        axis.range = Some([number(min), number(max)]);
      }
      axis.rangemode = Some(if min == 0.0 { "tozero" } else { "normal" }.into());
    }
    axis
  }

  fn x_date_extent(&self) -> Option<(NaiveDate, NaiveDate)> {
    let firsts = self.plots().iter().filter_map(|p| p.x_values.first());
    let lasts = self.plots().iter().filter_map(|p| p.x_values.last());
    let as_date = |x: &AxisValue| match x {
      AxisValue::Date(d) => Some(*d),
      AxisValue::Text(_) => None,
    };
    let min = firsts.filter_map(as_date).min()?;
    let max = lasts.filter_map(as_date).max()?;
    Some((min, max))
  }

  /// Date axis: interval chosen from the range length, ticks anchored on
  /// the first of the earliest month, range padded by half an interval.
  pub fn apply_x_axis_date_type(&self, axis: &mut Axis) {
    let Some((min, max)) = self.x_date_extent() else {
      return;
    };
    let tick0 = min.with_day(1).unwrap_or(min);
    let (days, months) = number_of_days_and_months(tick0, max);
    let dtick = x_axis_interval(days, months);
    let margin = Duration::days(timeseries_margin_days(&dtick));

    axis.kind = Some("date".into());
    axis.tick0 = Some(date_value(tick0));
    axis.tickformat = Some(date_tick_format(self.width(), days <= 92).into());
    axis.range = Some([date_value(tick0 - margin), date_value(max + margin)]);
    axis.dtick = Some(dtick);
  }

  pub fn legend_top_centre(&self) -> Legend {
    Legend {
      font: Some(tick_font()),
      orientation: Some("h".into()),
      x: Some(0.5),
      y: Some(1.0),
      xanchor: Some("center".into()),
      yanchor: Some("bottom".into()),
      title: (!self.payload.legend_title.is_empty())
        .then(|| format!("<b>{}</b>", self.payload.legend_title)),
      ..Default::default()
    }
  }

  pub fn base_chart_config(&self) -> Layout {
    Layout {
      width: Some(self.width()),
      height: Some(self.height()),
      autosize: Some(false),
      paper_bgcolor: Some(colour::WHITE.stringified()),
      plot_bgcolor: Some(colour::WHITE.stringified()),
      margin: Margin::default(),
      xaxis: self.x_axis_config(),
      yaxis: self.y_axis_config(),
      ..Default::default()
    }
  }

  /// Bars and lines sharing one figure.
  pub fn common_chart_config(&self) -> Layout {
    let mut layout = self.base_chart_config();
    layout.barmode = Some("group".into());
    layout.legend = Some(self.legend_top_centre());
    if self.is_date_type_x_axis() {
      layout.margin = Margin { l: 15.0, r: 15.0, ..Margin::default() };
    }
    layout
  }
}

/// Categorical x axis: no date interval or format.
pub fn apply_x_axis_text_type(axis: &mut Axis) {
  axis.kind = Some("-".into());
  axis.dtick = None;
  axis.tickformat = None;
  axis.tick0 = None;
  axis.range = None;
}
