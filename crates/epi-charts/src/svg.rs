//! Static SVG rendering of a [`Figure`].
//!
//! Draws the subset of the figure model the generators produce: bar and
//! scatter traces on date or categorical x axes, a linear y axis, grid lines,
//! tick labels, axis titles, a horizontal legend, annotations and line
//! shapes. Axis pairs with a `domain` are drawn side by side as subplots.

use std::{collections::HashMap, fmt::Write as _, io::Cursor};

use chrono::{Datelike, Duration, Months, NaiveDate};
use epi_core::plots::AxisValue;
use quick_xml::{
  Writer,
  events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use serde_json::Value;

use crate::{
  Result,
  figure::{Axis, Dtick, Figure, Font, Layout, Trace, TraceKind},
  settings::{number_of_days_and_months, x_axis_interval},
};

const DEFAULT_WIDTH: f64 = 700.0;
const DEFAULT_HEIGHT: f64 = 450.0;
const DEFAULT_FONT_SIZE: f64 = 12.0;
const DEFAULT_FONT_FAMILY: &str = "Arial";
const DEFAULT_TEXT_COLOUR: &str = "rgb(68,68,68)";
const DAY_IN_MILLISECONDS: u64 = 86_400_000;
const BAR_GROUP_FILL: f64 = 0.8;
const MAX_TICKS: usize = 200;
const LEGEND_SWATCH: f64 = 20.0;

/// Render a figure to a standalone SVG document.
pub fn render(figure: &Figure) -> Result<String> {
  let canvas = Canvas::new(&figure.layout);
  let legend = LegendLayout::new(figure, &canvas);
  let plot_area = canvas.plot_area(&figure.layout, &legend);
  let panels = Panel::collect(figure, plot_area);

  let mut svg = SvgWriter::new();
  svg.declaration()?;
  svg.open("svg", &[
    ("xmlns", "http://www.w3.org/2000/svg".into()),
    ("width", num(canvas.width)),
    ("height", num(canvas.height)),
    ("viewBox", format!("0 0 {} {}", num(canvas.width), num(canvas.height))),
  ])?;

  let mut background = rect_attrs(Rect::new(0.0, 0.0, canvas.width, canvas.height));
  push_paint(&mut background, "fill", figure.layout.paper_bgcolor.as_deref().unwrap_or("white"));
  svg.empty("rect", &background)?;

  svg.open("defs", &[])?;
  for (index, panel) in panels.iter().enumerate() {
    svg.open("clipPath", &[("id", format!("clip{index}"))])?;
    svg.empty("rect", &rect_attrs(panel.rect))?;
    svg.close("clipPath")?;
  }
  svg.close("defs")?;

  for (index, panel) in panels.iter().enumerate() {
    panel.draw_background(&mut svg, &figure.layout)?;
    panel.draw_grid(&mut svg)?;

    svg.open("g", &[("clip-path", format!("url(#clip{index})"))])?;
    panel.draw_traces(&mut svg, &figure.layout)?;
    svg.close("g")?;

    panel.draw_tick_labels(&mut svg)?;
    panel.draw_titles(&mut svg)?;
  }

  draw_shapes(&mut svg, &figure.layout, &panels, plot_area)?;
  draw_annotations(&mut svg, &figure.layout, &panels, plot_area)?;
  legend.draw(&mut svg)?;

  svg.close("svg")?;
  Ok(svg.finish())
}

// ─── Writer ──────────────────────────────────────────────────────────────────

type Attrs = Vec<(&'static str, String)>;

struct SvgWriter {
  writer: Writer<Cursor<Vec<u8>>>,
}

impl SvgWriter {
  fn new() -> Self { Self { writer: Writer::new(Cursor::new(Vec::new())) } }

  fn declaration(&mut self) -> Result<()> {
    self.writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    Ok(())
  }

  fn start<'a>(name: &'a str, attrs: &'a [(&'static str, String)]) -> BytesStart<'a> {
    let mut el = BytesStart::new(name);
    for (key, value) in attrs {
      el.push_attribute((*key, value.as_str()));
    }
    el
  }

  fn open(&mut self, name: &str, attrs: &[(&'static str, String)]) -> Result<()> {
    self.writer.write_event(Event::Start(Self::start(name, attrs)))?;
    Ok(())
  }

  fn close(&mut self, name: &str) -> Result<()> {
    self.writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
  }

  fn empty(&mut self, name: &str, attrs: &[(&'static str, String)]) -> Result<()> {
    self.writer.write_event(Event::Empty(Self::start(name, attrs)))?;
    Ok(())
  }

  /// A `<text>` element; each line after the first is a `<tspan>` one line
  /// height further down.
  fn text(&mut self, attrs: &[(&'static str, String)], lines: &[&str], line_height: f64) -> Result<()> {
    self.open("text", attrs)?;
    let x = attrs.iter().find(|(k, _)| *k == "x").map(|(_, v)| v.clone()).unwrap_or_default();
    for (index, line) in lines.iter().enumerate() {
      let dy = if index == 0 { 0.0 } else { line_height };
      self.open("tspan", &[("x", x.clone()), ("dy", num(dy))])?;
      self.writer.write_event(Event::Text(BytesText::new(line)))?;
      self.close("tspan")?;
    }
    self.close("text")
  }

  fn finish(self) -> String { String::from_utf8_lossy(&self.writer.into_inner().into_inner()).into_owned() }
}

/// Format a coordinate with at most two decimals.
fn num(value: f64) -> String {
  let s = format!("{value:.2}");
  let s = s.trim_end_matches('0').trim_end_matches('.');
  if s == "-0" || s.is_empty() { "0".into() } else { s.to_owned() }
}

/// Split a plotly colour into an SVG paint and opacity. `rgba(..)` becomes
/// `rgb(..)` plus an opacity; a zero alpha becomes `none`.
fn paint(colour: &str) -> (String, Option<String>) {
  let Some(inner) = colour.trim().strip_prefix("rgba(").and_then(|s| s.strip_suffix(')')) else {
    return (colour.to_owned(), None);
  };
  let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
  let [r, g, b, a] = parts.as_slice() else {
    return (colour.to_owned(), None);
  };
  let alpha: f64 = a.parse().unwrap_or(1.0);
  if alpha <= 0.0 {
    return ("none".into(), None);
  }
  let rgb = format!("rgb({r},{g},{b})");
  (rgb, (alpha < 1.0).then(|| num(alpha)))
}

fn push_paint(attrs: &mut Attrs, key: &'static str, colour: &str) {
  let (value, opacity) = paint(colour);
  attrs.push((key, value));
  if let Some(opacity) = opacity {
    attrs.push((if key == "fill" { "fill-opacity" } else { "stroke-opacity" }, opacity));
  }
}

fn dasharray(dash: Option<&str>, width: f64) -> Option<String> {
  let w = width.max(1.0);
  match dash {
    Some("dash") => Some(format!("{},{}", num(3.0 * w), num(3.0 * w))),
    Some("dot") => Some(format!("{},{}", num(w), num(w))),
    _ => None,
  }
}

fn strip_tags(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut in_tag = false;
  for c in text.chars() {
    match c {
      '<' => in_tag = true,
      '>' => in_tag = false,
      c if !in_tag => out.push(c),
      _ => {}
    }
  }
  out
}

fn text_width(text: &str, size: f64) -> f64 { text.chars().count() as f64 * size * 0.55 }

fn font_attrs(font: Option<&Font>, anchor: &str) -> Attrs {
  let size = font.and_then(|f| f.size).unwrap_or(DEFAULT_FONT_SIZE);
  let family = font.and_then(|f| f.family.clone()).unwrap_or_else(|| DEFAULT_FONT_FAMILY.into());
  let mut attrs: Attrs = vec![("font-family", family), ("font-size", num(size)), ("text-anchor", anchor.into())];
  push_paint(&mut attrs, "fill", font.and_then(|f| f.color.as_deref()).unwrap_or(DEFAULT_TEXT_COLOUR));
  attrs
}

fn font_size(font: Option<&Font>) -> f64 { font.and_then(|f| f.size).unwrap_or(DEFAULT_FONT_SIZE) }

// ─── Geometry ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Rect {
  x: f64,
  y: f64,
  w: f64,
  h: f64,
}

impl Rect {
  fn new(x: f64, y: f64, w: f64, h: f64) -> Self { Self { x, y, w: w.max(1.0), h: h.max(1.0) } }

  fn right(&self) -> f64 { self.x + self.w }

  fn bottom(&self) -> f64 { self.y + self.h }
}

fn rect_attrs(rect: Rect) -> Attrs {
  vec![("x", num(rect.x)), ("y", num(rect.y)), ("width", num(rect.w)), ("height", num(rect.h))]
}

struct Canvas {
  width:  f64,
  height: f64,
}

impl Canvas {
  fn new(layout: &Layout) -> Self {
    Self {
      width:  layout.width.map(f64::from).unwrap_or(DEFAULT_WIDTH),
      height: layout.height.map(f64::from).unwrap_or(DEFAULT_HEIGHT),
    }
  }

  /// The paper minus margins, tick label gutters and legend space.
  fn plot_area(&self, layout: &Layout, legend: &LegendLayout) -> Rect {
    let m = layout.margin;
    let pad = m.pad.unwrap_or(0.0);
    let x_lines = layout
      .xaxis
      .tickformat
      .as_deref()
      .map(|f| f.matches("<br>").count() + 1)
      .unwrap_or(1) as f64;
    let x_font = font_size(layout.xaxis.tickfont.as_ref());
    let y_font = font_size(layout.yaxis.tickfont.as_ref());

    let left = m.l + pad + if layout.yaxis.showticklabels == Some(false) { 4.0 } else { y_font * 3.5 };
    let left = left + if layout.yaxis.title.is_some() { y_font * 1.8 } else { 0.0 };
    let mut bottom = m.b + pad + x_lines * x_font * 1.3 + 6.0;
    bottom += if layout.xaxis.title.is_some() { x_font * 1.8 } else { 0.0 };
    let mut top = m.t.max(6.0);
    let right = m.r.max(6.0);

    match legend.placement {
      LegendPlacement::Above => top += legend.height,
      LegendPlacement::Below => bottom += legend.height,
      LegendPlacement::Hidden => {}
    }
    Rect::new(left, top, self.width - left - right, self.height - top - bottom)
  }
}

// ─── Scales ──────────────────────────────────────────────────────────────────

fn day_number(date: NaiveDate) -> f64 { date.num_days_from_ce() as f64 }

fn date_from_value(value: &Value) -> Option<NaiveDate> {
  let s = value.as_str()?;
  NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

enum XScale {
  Date { min: f64, max: f64 },
  Category { labels: Vec<String> },
}

impl XScale {
  fn build(axis: &Axis, traces: &[&Trace]) -> Self {
    let values = traces.iter().flat_map(|t| t.x.iter());
    let all_dates = traces.iter().flat_map(|t| &t.x).all(|x| matches!(x, AxisValue::Date(_)));
    let is_date = axis.kind.as_deref() == Some("date") && all_dates;

    if !is_date {
      let mut labels: Vec<String> = Vec::new();
      for x in values {
        let label = x.to_string();
        if !labels.contains(&label) {
          labels.push(label);
        }
      }
      return XScale::Category { labels };
    }

    let ranged = axis.range.as_ref().and_then(|[lo, hi]| Some((date_from_value(lo)?, date_from_value(hi)?)));
    if let Some((lo, hi)) = ranged {
      return XScale::Date { min: day_number(lo), max: day_number(hi).max(day_number(lo) + 1.0) };
    }
    let days: Vec<f64> = values
      .filter_map(|x| match x {
        AxisValue::Date(d) => Some(day_number(*d)),
        AxisValue::Text(_) => None,
      })
      .collect();
    let min = days.iter().copied().fold(f64::INFINITY, f64::min);
    let max = days.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min.is_finite() {
      XScale::Date { min: min - 0.5, max: max + 0.5 }
    } else {
      XScale::Category { labels: vec![] }
    }
  }

  fn position(&self, x: &AxisValue, rect: Rect) -> Option<f64> {
    match (self, x) {
      (XScale::Date { min, max }, AxisValue::Date(d)) => {
        Some(rect.x + (day_number(*d) - min) / (max - min) * rect.w)
      }
      (XScale::Category { labels }, x) => {
        let label = x.to_string();
        let index = labels.iter().position(|l| *l == label)?;
        Some(rect.x + (index as f64 + 0.5) * self.band(rect))
      }
      _ => None,
    }
  }

  fn position_of_value(&self, value: &Value, rect: Rect) -> Option<f64> {
    match self {
      XScale::Date { .. } => self.position(&AxisValue::Date(date_from_value(value)?), rect),
      XScale::Category { .. } => {
        let label = match value {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        self.position(&AxisValue::Text(label), rect)
      }
    }
  }

  /// Width of the slot one x value occupies.
  fn band(&self, rect: Rect) -> f64 {
    match self {
      XScale::Date { min, max } => rect.w / (max - min),
      XScale::Category { labels } => rect.w / labels.len().max(1) as f64,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct YScale {
  min: f64,
  max: f64,
}

impl YScale {
  fn build(axis: &Axis, values: &[f64], has_bars: bool) -> Self {
    if let Some([lo, hi]) = &axis.range
      && let (Some(lo), Some(hi)) = (lo.as_f64(), hi.as_f64())
      && hi > lo
    {
      return Self { min: lo, max: hi };
    }
    let mut min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let mut max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() {
      return Self { min: 0.0, max: 1.0 };
    }
    if (axis.rangemode.as_deref() == Some("tozero") || has_bars) && min > 0.0 {
      min = 0.0;
    }
    if max <= min {
      max = min + 1.0;
    }
    let pad = (max - min) * 0.05;
    Self { min: if min == 0.0 { 0.0 } else { min - pad }, max: max + pad }
  }

  fn position(&self, y: f64, rect: Rect) -> f64 { rect.bottom() - (y - self.min) / (self.max - self.min) * rect.h }

  fn ticks(&self) -> (f64, Vec<f64>) {
    let step = nice_step(self.max - self.min, 5);
    let mut ticks = Vec::new();
    let mut value = (self.min / step).ceil() * step;
    while value <= self.max + step * 1e-9 && ticks.len() < MAX_TICKS {
      ticks.push(if value.abs() < step * 1e-9 { 0.0 } else { value });
      value += step;
    }
    (step, ticks)
  }
}

fn nice_step(span: f64, target: usize) -> f64 {
  let raw = span / target as f64;
  if raw <= 0.0 || !raw.is_finite() {
    return 1.0;
  }
  let magnitude = 10f64.powf(raw.log10().floor());
  let normalised = raw / magnitude;
  let nice = match normalised {
    n if n <= 1.0 => 1.0,
    n if n <= 2.0 => 2.0,
    n if n <= 5.0 => 5.0,
    _ => 10.0,
  };
  nice * magnitude
}

// ─── Number formats ──────────────────────────────────────────────────────────

fn group_thousands(value: f64, decimals: usize) -> String {
  let formatted = format!("{:.*}", decimals, value.abs());
  let (int_part, frac_part) = match formatted.split_once('.') {
    Some((i, f)) => (i.to_owned(), Some(f.to_owned())),
    None => (formatted, None),
  };
  let mut grouped = String::new();
  for (i, c) in int_part.chars().enumerate() {
    if i > 0 && (int_part.len() - i) % 3 == 0 {
      grouped.push(',');
    }
    grouped.push(c);
  }
  let sign = if value < 0.0 && formatted_nonzero(&int_part, frac_part.as_deref()) { "-" } else { "" };
  match frac_part {
    Some(f) => format!("{sign}{grouped}.{f}"),
    None => format!("{sign}{grouped}"),
  }
}

fn formatted_nonzero(int_part: &str, frac: Option<&str>) -> bool {
  int_part.chars().chain(frac.unwrap_or("").chars()).any(|c| c != '0')
}

/// One significant digit with an SI suffix: `200000 → 200k`.
fn si_format(value: f64) -> String {
  if value == 0.0 {
    return "0".into();
  }
  let exponent = value.abs().log10().floor();
  let unit = 10f64.powf(exponent);
  let rounded = (value / unit).round() * unit;
  let prefixes = [(1e12, "T"), (1e9, "G"), (1e6, "M"), (1e3, "k")];
  for (scale, prefix) in prefixes {
    if rounded.abs() >= scale {
      return format!("{}{prefix}", num(rounded / scale));
    }
  }
  num(rounded)
}

fn decimals_for_step(step: f64) -> usize {
  if step >= 1.0 { 0 } else { (-step.log10().floor()) as usize }
}

/// Format a y tick according to the first `tickformatstops` entry whose
/// `dtickrange` contains `step`.
fn format_tick(value: f64, step: f64, stops: Option<&[Value]>) -> String {
  let format = stops
    .unwrap_or_default()
    .iter()
    .find(|stop| {
      let range = stop.get("dtickrange").and_then(Value::as_array);
      let bound = |i: usize| range.and_then(|r| r.get(i)).and_then(Value::as_f64);
      bound(0).is_none_or(|lo| step >= lo) && bound(1).is_none_or(|hi| step <= hi)
    })
    .and_then(|stop| stop.get("value").and_then(Value::as_str))
    .unwrap_or(",");
  match format {
    ".0s" => si_format(value),
    ",.0f" => group_thousands(value, 0),
    _ => group_thousands(value, decimals_for_step(step)),
  }
}

// ─── Date ticks ──────────────────────────────────────────────────────────────

enum DateStep {
  Days(i64),
  Months(u32),
}

fn date_step(dtick: &Dtick) -> DateStep {
  match dtick {
    Dtick::Millis(ms) => DateStep::Days(((ms / DAY_IN_MILLISECONDS) as i64).max(1)),
    Dtick::Period(p) => {
      let n = p.get(1..).and_then(|n| n.parse::<u32>().ok()).unwrap_or(1).max(1);
      if p.starts_with('M') { DateStep::Months(n) } else { DateStep::Days(i64::from(n)) }
    }
  }
}

fn date_ticks(axis: &Axis, min: NaiveDate, max: NaiveDate) -> Vec<NaiveDate> {
  let start = axis.tick0.as_ref().and_then(date_from_value).unwrap_or(min);
  let dtick = axis.dtick.clone().unwrap_or_else(|| {
    let (days, months) = number_of_days_and_months(min, max);
    x_axis_interval(days, months)
  });
  let step = date_step(&dtick);

  let mut ticks = Vec::new();
  for i in 0..MAX_TICKS as u32 {
    let tick = match step {
      DateStep::Days(n) => start.checked_add_signed(Duration::days(n * i64::from(i))),
      DateStep::Months(n) => start.checked_add_months(Months::new(n * i)),
    };
    let Some(tick) = tick else { break };
    if tick > max {
      break;
    }
    if tick >= min {
      ticks.push(tick);
    }
  }
  ticks
}

fn format_date(date: NaiveDate, format: &str) -> String {
  let mut out = String::new();
  if write!(out, "{}", date.format(format)).is_err() {
    return date.format("%Y-%m-%d").to_string();
  }
  out
}

fn date_of_day_number(days: f64) -> Option<NaiveDate> { NaiveDate::from_num_days_from_ce_opt(days.round() as i32) }

// ─── Panels ──────────────────────────────────────────────────────────────────

/// One x/y axis pair and the traces drawn against it.
struct Panel<'a> {
  x_key:   String,
  y_key:   String,
  x_axis:  &'a Axis,
  y_axis:  &'a Axis,
  traces:  Vec<&'a Trace>,
  rect:    Rect,
  x_scale: XScale,
  y_scale: YScale,
}

impl<'a> Panel<'a> {
  fn collect(figure: &'a Figure, area: Rect) -> Vec<Panel<'a>> {
    let mut keys: Vec<(String, String)> = Vec::new();
    for trace in &figure.data {
      let pair = trace.axis_keys();
      if !keys.contains(&pair) {
        keys.push(pair);
      }
    }
    if keys.is_empty() {
      keys.push(("xaxis".into(), "yaxis".into()));
    }

    let layout = &figure.layout;
    let y_group = |key: &str| -> String {
      layout
        .axis(key)
        .and_then(|a| a.matches.as_deref())
        .map(|m| format!("yaxis{}", m.get(1..).unwrap_or("")))
        .unwrap_or_else(|| key.to_owned())
    };
    let mut y_values: HashMap<String, (Vec<f64>, bool)> = HashMap::new();
    for trace in &figure.data {
      let (_, y_key) = trace.axis_keys();
      let entry = y_values.entry(y_group(&y_key)).or_default();
      entry.0.extend(trace.y.iter().flatten().copied().filter(|v| v.is_finite()));
      entry.1 |= trace.kind == TraceKind::Bar;
    }

    keys
      .into_iter()
      .map(|(x_key, y_key)| {
        let x_axis = layout.axis(&x_key).unwrap_or(&layout.xaxis);
        let y_axis = layout.axis(&y_key).unwrap_or(&layout.yaxis);
        let traces: Vec<&Trace> = figure.data.iter().filter(|t| t.axis_keys() == (x_key.clone(), y_key.clone())).collect();

        let [x0, x1] = x_axis.domain.unwrap_or([0.0, 1.0]);
        let [y0, y1] = y_axis.domain.unwrap_or([0.0, 1.0]);
        let rect = Rect::new(
          area.x + x0 * area.w,
          area.y + (1.0 - y1) * area.h,
          (x1 - x0) * area.w,
          (y1 - y0) * area.h,
        );

        let group = y_group(&y_key);
        let scale_axis = layout.axis(&group).unwrap_or(y_axis);
        let (values, has_bars) = y_values.get(&group).cloned().unwrap_or_default();
        let y_scale = YScale::build(scale_axis, &values, has_bars);
        let x_scale = XScale::build(x_axis, &traces);

        Panel { x_key, y_key, x_axis, y_axis, traces, rect, x_scale, y_scale }
      })
      .collect()
  }

  fn draw_background(&self, svg: &mut SvgWriter, layout: &Layout) -> Result<()> {
    let Some(colour) = layout.plot_bgcolor.as_deref() else {
      return Ok(());
    };
    let mut attrs = rect_attrs(self.rect);
    push_paint(&mut attrs, "fill", colour);
    svg.empty("rect", &attrs)
  }

  fn y_ticks(&self) -> Vec<(f64, String)> {
    if let Some(values) = &self.y_axis.tickvals {
      let texts = self.y_axis.ticktext.clone().unwrap_or_default();
      return values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
          let y = v.as_f64()?;
          let text = texts.get(i).cloned().unwrap_or_else(|| num(y));
          Some((y, text))
        })
        .collect();
    }
    let (step, ticks) = self.y_scale.ticks();
    let stops = self.y_axis.tickformatstops.as_deref();
    ticks.into_iter().map(|y| (y, format_tick(y, step, stops))).collect()
  }

  fn x_ticks(&self) -> Vec<(f64, String)> {
    let rect = self.rect;
    if let Some(values) = &self.x_axis.tickvals {
      let texts = self.x_axis.ticktext.clone().unwrap_or_default();
      return values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| {
          let x = self.x_scale.position_of_value(v, rect)?;
          let text = texts.get(i).cloned().unwrap_or_else(|| v.as_str().map(str::to_owned).unwrap_or_default());
          Some((x, text))
        })
        .collect();
    }
    match &self.x_scale {
      XScale::Date { min, max } => {
        let (Some(lo), Some(hi)) = (date_of_day_number(min.ceil()), date_of_day_number(max.floor())) else {
          return vec![];
        };
        let format = self.x_axis.tickformat.as_deref().unwrap_or("%b %Y");
        date_ticks(self.x_axis, lo, hi)
          .into_iter()
          .filter_map(|d| Some((self.x_scale.position(&AxisValue::Date(d), rect)?, format_date(d, format))))
          .collect()
      }
      XScale::Category { labels } => {
        let size = font_size(self.x_axis.tickfont.as_ref());
        let widest = labels.iter().map(|l| text_width(l, size)).fold(0.0, f64::max) + 6.0;
        let every = ((widest * labels.len() as f64) / rect.w).ceil().max(1.0) as usize;
        labels
          .iter()
          .enumerate()
          .filter(|(i, _)| i % every == 0)
          .filter_map(|(_, l)| Some((self.x_scale.position(&AxisValue::Text(l.clone()), rect)?, l.clone())))
          .collect()
      }
    }
  }

  fn draw_grid(&self, svg: &mut SvgWriter) -> Result<()> {
    let rect = self.rect;
    let mut lines: Vec<(f64, f64, f64, f64, &Axis)> = Vec::new();
    if self.x_axis.showgrid == Some(true) {
      for (x, _) in self.x_ticks() {
        lines.push((x, rect.y, x, rect.bottom(), self.x_axis));
      }
    }
    if self.y_axis.showgrid == Some(true) {
      for (y, _) in self.y_ticks() {
        let y = self.y_scale.position(y, rect);
        lines.push((rect.x, y, rect.right(), y, self.y_axis));
      }
    }
    for (x1, y1, x2, y2, axis) in lines {
      let mut attrs: Attrs = vec![("x1", num(x1)), ("y1", num(y1)), ("x2", num(x2)), ("y2", num(y2))];
      push_paint(&mut attrs, "stroke", axis.gridcolor.as_deref().unwrap_or("rgb(238,238,238)"));
      attrs.push(("stroke-width", "1".into()));
      if let Some(dash) = dasharray(axis.griddash.as_deref(), 1.0) {
        attrs.push(("stroke-dasharray", dash));
      }
      svg.empty("line", &attrs)?;
    }
    Ok(())
  }

  fn draw_traces(&self, svg: &mut SvgWriter, layout: &Layout) -> Result<()> {
    let bars: Vec<&&Trace> = self.traces.iter().filter(|t| t.kind == TraceKind::Bar).collect();
    let grouped = layout.barmode.as_deref() != Some("overlay") && bars.len() > 1;
    let group_width = self.bar_band() * BAR_GROUP_FILL;
    let bar_width = if grouped { group_width / bars.len() as f64 } else { group_width };

    let mut bar_index = 0;
    for trace in &self.traces {
      match trace.kind {
        TraceKind::Bar => {
          let offset = if grouped { -group_width / 2.0 + bar_width * bar_index as f64 } else { -bar_width / 2.0 };
          self.draw_bars(svg, trace, offset, bar_width)?;
          bar_index += 1;
        }
        TraceKind::Scatter => self.draw_scatter(svg, trace)?,
      }
    }
    Ok(())
  }

  /// Pixel width available to the bars at one x value: the category band,
  /// or the smallest gap between dates.
  fn bar_band(&self) -> f64 {
    let band = self.x_scale.band(self.rect);
    match self.x_scale {
      XScale::Category { .. } => band,
      XScale::Date { .. } => {
        let mut days: Vec<f64> = self
          .traces
          .iter()
          .filter(|t| t.kind == TraceKind::Bar)
          .flat_map(|t| &t.x)
          .filter_map(|x| match x {
            AxisValue::Date(d) => Some(day_number(*d)),
            AxisValue::Text(_) => None,
          })
          .collect();
        days.sort_by(f64::total_cmp);
        days.dedup();
        let gap = days.windows(2).map(|w| w[1] - w[0]).fold(f64::INFINITY, f64::min);
        if gap.is_finite() { band * gap } else { band }
      }
    }
  }

  fn draw_bars(&self, svg: &mut SvgWriter, trace: &Trace, offset: f64, width: f64) -> Result<()> {
    let colour = trace.marker.as_ref().and_then(|m| m.color.as_deref()).unwrap_or("rgb(31,119,180)");
    let baseline = self.y_scale.position(0.0_f64.clamp(self.y_scale.min, self.y_scale.max), self.rect);
    for (x, y) in trace.x.iter().zip(&trace.y) {
      let (Some(cx), Some(y)) = (self.x_scale.position(x, self.rect), y) else {
        continue;
      };
      let top = self.y_scale.position(*y, self.rect);
      let mut attrs = rect_attrs(Rect {
        x: cx + offset,
        y: top.min(baseline),
        w: width,
        h: (baseline - top).abs(),
      });
      push_paint(&mut attrs, "fill", colour);
      svg.empty("rect", &attrs)?;
    }
    Ok(())
  }

  fn points(&self, trace: &Trace) -> Vec<Vec<(f64, f64)>> {
    let mut segments: Vec<Vec<(f64, f64)>> = vec![vec![]];
    for (x, y) in trace.x.iter().zip(&trace.y) {
      match (self.x_scale.position(x, self.rect), y) {
        (Some(px), Some(y)) => {
          if let Some(segment) = segments.last_mut() {
            segment.push((px, self.y_scale.position(*y, self.rect)));
          }
        }
        _ => segments.push(vec![]),
      }
    }
    segments.retain(|s| !s.is_empty());
    segments
  }

  fn draw_scatter(&self, svg: &mut SvgWriter, trace: &Trace) -> Result<()> {
    let line = trace.line.clone().unwrap_or_default();
    let width = line.width.unwrap_or(2.0);
    let colour = line.color.clone().unwrap_or_else(|| "rgb(31,119,180)".into());
    let spline = trace.line_shape.as_deref() == Some("spline");
    let segments = self.points(trace);

    if trace.fill.as_deref() == Some("toself") {
      for segment in &segments {
        let mut d = path_data(segment, false);
        d.push('Z');
        let mut attrs: Attrs = vec![("d", d)];
        push_paint(&mut attrs, "fill", trace.fillcolor.as_deref().unwrap_or("rgba(0, 0, 0, 0.2)"));
        if width > 0.0 {
          push_paint(&mut attrs, "stroke", &colour);
          attrs.push(("stroke-width", num(width)));
        }
        svg.empty("path", &attrs)?;
      }
      return Ok(());
    }

    let mode = trace.mode.as_deref().unwrap_or("lines");
    if mode.contains("lines") {
      for segment in &segments {
        let mut attrs: Attrs = vec![("d", path_data(segment, spline)), ("fill", "none".into())];
        push_paint(&mut attrs, "stroke", &colour);
        attrs.push(("stroke-width", num(width)));
        attrs.push(("stroke-linejoin", "round".into()));
        if let Some(dash) = dasharray(line.dash.as_deref(), width) {
          attrs.push(("stroke-dasharray", dash));
        }
        svg.empty("path", &attrs)?;
      }
    }
    if mode.contains("markers") {
      let marker = trace.marker.clone().unwrap_or_default();
      let radius = marker.size.unwrap_or(6.0) / 2.0;
      let fill = marker.color.unwrap_or_else(|| colour.clone());
      for (x, y) in segments.iter().flatten() {
        let mut attrs: Attrs = vec![("cx", num(*x)), ("cy", num(*y)), ("r", num(radius))];
        push_paint(&mut attrs, "fill", &fill);
        svg.empty("circle", &attrs)?;
      }
    }
    Ok(())
  }

  fn draw_tick_labels(&self, svg: &mut SvgWriter) -> Result<()> {
    let rect = self.rect;
    if self.x_axis.visible != Some(false) && self.x_axis.showticklabels != Some(false) {
      let font = self.x_axis.tickfont.as_ref();
      let size = font_size(font);
      for (x, text) in self.x_ticks() {
        if x < rect.x - 1.0 || x > rect.right() + 1.0 {
          continue;
        }
        let mut attrs = font_attrs(font, "middle");
        attrs.push(("x", num(x)));
        attrs.push(("y", num(rect.bottom() + size * 1.3)));
        let lines: Vec<&str> = text.split("<br>").collect();
        svg.text(&attrs, &lines, size * 1.2)?;
      }
    }
    if self.y_axis.visible != Some(false) && self.y_axis.showticklabels != Some(false) {
      let font = self.y_axis.tickfont.as_ref();
      let size = font_size(font);
      for (y, text) in self.y_ticks() {
        if y < self.y_scale.min || y > self.y_scale.max {
          continue;
        }
        let mut attrs = font_attrs(font, "end");
        attrs.push(("x", num(rect.x - 6.0)));
        attrs.push(("y", num(self.y_scale.position(y, rect) + size * 0.35)));
        svg.text(&attrs, &[text.as_str()], size * 1.2)?;
      }
    }
    Ok(())
  }

  fn draw_titles(&self, svg: &mut SvgWriter) -> Result<()> {
    let rect = self.rect;
    if let Some(title) = self.x_axis.title.as_ref().filter(|t| !t.text.is_empty()) {
      let size = font_size(title.font.as_ref());
      let lines = self.x_axis.tickformat.as_deref().map(|f| f.matches("<br>").count() + 1).unwrap_or(1);
      let mut attrs = font_attrs(title.font.as_ref(), "middle");
      attrs.push(("x", num(rect.x + rect.w / 2.0)));
      attrs.push(("y", num(rect.bottom() + size * (1.3 * lines as f64 + 1.6))));
      svg.text(&attrs, &[strip_tags(&title.text).as_str()], size * 1.2)?;
    }
    if let Some(title) = self.y_axis.title.as_ref().filter(|t| !t.text.is_empty()) {
      let size = font_size(title.font.as_ref());
      let (x, y) = (rect.x - size * 4.0, rect.y + rect.h / 2.0);
      let mut attrs = font_attrs(title.font.as_ref(), "middle");
      attrs.push(("x", num(x)));
      attrs.push(("y", num(y)));
      attrs.push(("transform", format!("rotate(-90 {} {})", num(x), num(y))));
      svg.text(&attrs, &[strip_tags(&title.text).as_str()], size * 1.2)?;
    }
    Ok(())
  }
}

/// Path data through `points`; splines use Catmull-Rom curves.
fn path_data(points: &[(f64, f64)], spline: bool) -> String {
  let mut d = String::new();
  let Some(&(x0, y0)) = points.first() else {
    return d;
  };
  let _ = write!(d, "M{},{}", num(x0), num(y0));
  if !spline || points.len() < 3 {
    for (x, y) in &points[1..] {
      let _ = write!(d, "L{},{}", num(*x), num(*y));
    }
    return d;
  }
  for i in 0..points.len() - 1 {
    let p0 = points[i.saturating_sub(1)];
    let p1 = points[i];
    let p2 = points[i + 1];
    let p3 = points[(i + 2).min(points.len() - 1)];
    let c1 = (p1.0 + (p2.0 - p0.0) / 6.0, p1.1 + (p2.1 - p0.1) / 6.0);
    let c2 = (p2.0 - (p3.0 - p1.0) / 6.0, p2.1 - (p3.1 - p1.1) / 6.0);
    let _ = write!(
      d,
      "C{},{} {},{} {},{}",
      num(c1.0),
      num(c1.1),
      num(c2.0),
      num(c2.1),
      num(p2.0),
      num(p2.1)
    );
  }
  d
}

// ─── Shapes and annotations ──────────────────────────────────────────────────

fn panel_for_y<'p>(panels: &'p [Panel<'p>], yref: &str) -> Option<&'p Panel<'p>> {
  let key = format!("yaxis{}", yref.get(1..).unwrap_or(""));
  panels.iter().find(|p| p.y_key == key)
}

fn panel_for_x<'p>(panels: &'p [Panel<'p>], xref: &str) -> Option<&'p Panel<'p>> {
  let key = format!("xaxis{}", xref.get(1..).unwrap_or(""));
  panels.iter().find(|p| p.x_key == key)
}

fn resolve_x(xref: &str, value: &Value, panels: &[Panel<'_>], area: Rect) -> Option<f64> {
  if xref == "paper" {
    return Some(area.x + value.as_f64()? * area.w);
  }
  let panel = panel_for_x(panels, xref)?;
  panel.x_scale.position_of_value(value, panel.rect)
}

fn resolve_y(yref: &str, value: f64, panels: &[Panel<'_>], area: Rect) -> Option<f64> {
  if yref == "paper" {
    return Some(area.bottom() - value * area.h);
  }
  let panel = panel_for_y(panels, yref)?;
  Some(panel.y_scale.position(value, panel.rect))
}

fn draw_shapes(svg: &mut SvgWriter, layout: &Layout, panels: &[Panel<'_>], area: Rect) -> Result<()> {
  for shape in layout.shapes.iter().filter(|s| s.kind == "line") {
    let points = (
      resolve_x(&shape.xref, &shape.x0, panels, area),
      resolve_x(&shape.xref, &shape.x1, panels, area),
      shape.y0.as_f64().and_then(|y| resolve_y(&shape.yref, y, panels, area)),
      shape.y1.as_f64().and_then(|y| resolve_y(&shape.yref, y, panels, area)),
    );
    let (Some(x1), Some(x2), Some(y1), Some(y2)) = points else {
      continue;
    };
    let line = shape.line.clone().unwrap_or_default();
    let width = line.width.unwrap_or(1.0);
    let mut attrs: Attrs = vec![("x1", num(x1)), ("y1", num(y1)), ("x2", num(x2)), ("y2", num(y2))];
    push_paint(&mut attrs, "stroke", line.color.as_deref().unwrap_or("rgb(68,68,68)"));
    attrs.push(("stroke-width", num(width)));
    if let Some(dash) = dasharray(line.dash.as_deref(), width) {
      attrs.push(("stroke-dasharray", dash));
    }
    svg.empty("line", &attrs)?;
  }
  Ok(())
}

fn draw_annotations(svg: &mut SvgWriter, layout: &Layout, panels: &[Panel<'_>], area: Rect) -> Result<()> {
  for annotation in &layout.annotations {
    let x = resolve_x(&annotation.xref, &Value::from(annotation.x), panels, area);
    let y = resolve_y(&annotation.yref, annotation.y, panels, area);
    let (Some(x), Some(y)) = (x, y) else {
      continue;
    };
    let font = annotation.font.as_ref();
    let size = font_size(font);
    let anchor = match annotation.xanchor.as_deref() {
      Some("left") => "start",
      Some("right") => "end",
      _ => "middle",
    };
    let baseline = match annotation.yanchor.as_deref() {
      Some("top") => y + size,
      Some("middle") => y + size * 0.35,
      _ => y - 3.0,
    };
    let mut attrs = font_attrs(font, anchor);
    attrs.push(("x", num(x)));
    attrs.push(("y", num(baseline)));
    let text = strip_tags(&annotation.text);
    svg.text(&attrs, &[text.as_str()], size * 1.2)?;
  }
  Ok(())
}

// ─── Legend ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegendPlacement {
  Above,
  Below,
  Hidden,
}

struct LegendItem {
  name:   String,
  colour: String,
  kind:   TraceKind,
  dash:   Option<String>,
  width:  f64,
}

struct LegendLayout {
  placement: LegendPlacement,
  title:     Option<String>,
  font:      Option<Font>,
  rows:      Vec<Vec<LegendItem>>,
  height:    f64,
  canvas_w:  f64,
  canvas_h:  f64,
  x:         f64,
  xanchor:   String,
}

impl LegendLayout {
  fn new(figure: &Figure, canvas: &Canvas) -> Self {
    let legend = figure.layout.legend.clone().unwrap_or_default();
    let font = legend.font.clone();
    let size = font_size(font.as_ref());

    let mut items: Vec<LegendItem> = Vec::new();
    if figure.layout.showlegend != Some(false) {
      for trace in figure.data.iter().filter(|t| t.is_legend_entry()) {
        let name = trace.name.clone().unwrap_or_default();
        if items.iter().any(|i| i.name == name) {
          continue;
        }
        let (colour, width, dash) = match trace.kind {
          TraceKind::Bar => (trace.marker.as_ref().and_then(|m| m.color.clone()), 0.0, None),
          TraceKind::Scatter => {
            let line = trace.line.clone().unwrap_or_default();
            (line.color, line.width.unwrap_or(2.0), line.dash)
          }
        };
        items.push(LegendItem {
          name,
          colour: colour.unwrap_or_else(|| "rgb(31,119,180)".into()),
          kind: trace.kind,
          dash,
          width,
        });
      }
    }

    let title = legend.title.as_deref().map(strip_tags).filter(|t| !t.is_empty());
    let available = canvas.width - 10.0 - title.as_deref().map(|t| text_width(t, size) + 10.0).unwrap_or(0.0);
    let mut rows: Vec<Vec<LegendItem>> = Vec::new();
    let mut row_width = 0.0;
    for item in items {
      let w = item_width(&item, size);
      match rows.last_mut() {
        Some(row) if row_width + w <= available => {
          row_width += w;
          row.push(item);
        }
        _ => {
          row_width = w;
          rows.push(vec![item]);
        }
      }
    }

    let placement = match (rows.is_empty(), legend.y.unwrap_or(1.0)) {
      (true, _) => LegendPlacement::Hidden,
      (false, y) if y < 0.5 => LegendPlacement::Below,
      _ => LegendPlacement::Above,
    };
    let height = rows.len() as f64 * size * 1.6 + 4.0;
    Self {
      placement,
      title,
      font,
      rows,
      height,
      canvas_w: canvas.width,
      canvas_h: canvas.height,
      x: legend.x.unwrap_or(0.5),
      xanchor: legend.xanchor.unwrap_or_else(|| "center".into()),
    }
  }

  fn draw(&self, svg: &mut SvgWriter) -> Result<()> {
    if self.placement == LegendPlacement::Hidden {
      return Ok(());
    }
    let size = font_size(self.font.as_ref());
    let row_height = size * 1.6;
    let top = match self.placement {
      LegendPlacement::Above => 2.0,
      _ => self.canvas_h - self.height,
    };
    let title_width = self.title.as_deref().map(|t| text_width(t, size) + 10.0).unwrap_or(0.0);

    for (row_index, row) in self.rows.iter().enumerate() {
      let width: f64 = title_width + row.iter().map(|i| item_width(i, size)).sum::<f64>();
      let anchor_x = self.x * self.canvas_w;
      let mut x = match self.xanchor.as_str() {
        "left" => anchor_x,
        "right" => anchor_x - width,
        _ => anchor_x - width / 2.0,
      }
      .clamp(0.0, (self.canvas_w - width).max(0.0));
      let mid = top + row_height * (row_index as f64 + 0.5);

      if row_index == 0
        && let Some(title) = &self.title
      {
        let mut attrs = font_attrs(self.font.as_ref(), "start");
        attrs.push(("x", num(x)));
        attrs.push(("y", num(mid + size * 0.35)));
        svg.text(&attrs, &[title.as_str()], size * 1.2)?;
      }
      x += title_width;

      for item in row {
        match item.kind {
          TraceKind::Bar => {
            let mut attrs = rect_attrs(Rect::new(x + 4.0, mid - size / 2.0, LEGEND_SWATCH - 8.0, size));
            push_paint(&mut attrs, "fill", &item.colour);
            svg.empty("rect", &attrs)?;
          }
          TraceKind::Scatter => {
            let mut attrs: Attrs =
              vec![("x1", num(x)), ("y1", num(mid)), ("x2", num(x + LEGEND_SWATCH)), ("y2", num(mid))];
            push_paint(&mut attrs, "stroke", &item.colour);
            attrs.push(("stroke-width", num(item.width.max(1.0))));
            if let Some(dash) = dasharray(item.dash.as_deref(), item.width) {
              attrs.push(("stroke-dasharray", dash));
            }
            svg.empty("line", &attrs)?;
          }
        }
        let mut attrs = font_attrs(self.font.as_ref(), "start");
        attrs.push(("x", num(x + LEGEND_SWATCH + 4.0)));
        attrs.push(("y", num(mid + size * 0.35)));
        svg.text(&attrs, &[item.name.as_str()], size * 1.2)?;
        x += item_width(item, size);
      }
    }
    Ok(())
  }
}

fn item_width(item: &LegendItem, size: f64) -> f64 { LEGEND_SWATCH + 4.0 + text_width(&item.name, size) + 14.0 }

#[cfg(test)]
mod tests {
  use epi_core::plots::ChartType;
  use serde_json::json;

  use super::*;
  use crate::{
    common,
    tests::{payload, series},
  };

  #[test]
  fn rgba_colours_become_rgb_and_opacity() {
    assert_eq!(paint("rgba(177, 180, 182, 0.5)"), ("rgb(177,180,182)".into(), Some("0.5".into())));
    assert_eq!(paint("rgba(0, 0, 0, 1)"), ("rgb(0,0,0)".into(), None));
    assert_eq!(paint("rgba(0, 0, 0, 0)"), ("none".into(), None));
    assert_eq!(paint("#000"), ("#000".into(), None));
  }

  #[test]
  fn tick_formats_follow_the_stops() {
    let stops = vec![
      json!({"dtickrange": [null, 999], "value": ","}),
      json!({"dtickrange": [1000, 99999], "value": ",.0f"}),
      json!({"dtickrange": [100000, null], "value": ".0s"}),
    ];
    assert_eq!(format_tick(1500.0, 500.0, Some(&stops)), "1,500");
    assert_eq!(format_tick(0.5, 0.1, Some(&stops)), "0.5");
    assert_eq!(format_tick(25000.0, 5000.0, Some(&stops)), "25,000");
    assert_eq!(format_tick(200_000.0, 100_000.0, Some(&stops)), "200k");
    assert_eq!(format_tick(3_000_000.0, 1_000_000.0, Some(&stops)), "3M");
  }

  #[test]
  fn nice_steps() {
    assert_eq!(nice_step(90.0, 5), 20.0);
    assert_eq!(nice_step(1.0, 5), 0.2);
    assert_eq!(nice_step(7000.0, 5), 2000.0);
  }

  #[test]
  fn monthly_ticks_start_at_tick0() {
    let axis = Axis {
      tick0: Some(json!("2023-01-01")),
      dtick: Some(Dtick::Period("M1".into())),
      ..Default::default()
    };
    let day = |m, d| NaiveDate::from_ymd_opt(2023, m, d).unwrap();
    assert_eq!(date_ticks(&axis, day(1, 1), day(3, 31)), vec![day(1, 1), day(2, 1), day(3, 1)]);
  }

  #[test]
  fn spline_paths_use_curves() {
    let points = [(0.0, 0.0), (10.0, 5.0), (20.0, 0.0)];
    assert_eq!(path_data(&points, false), "M0,0L10,5L20,0");
    assert!(path_data(&points, true).contains('C'));
  }

  #[test]
  fn renders_a_common_chart() {
    let figure = common::generate_chart_figure(&payload(vec![
      series(ChartType::Bar, Some("Cases"), 30),
      series(ChartType::LineMultiColoured, Some("Average"), 30),
    ]))
    .unwrap();
    let svg = render(&figure).unwrap();

    assert!(svg.starts_with("<?xml"));
    assert!(svg.contains("<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"515\" height=\"220\""));
    assert_eq!(svg.matches("<path d=").count(), 1);
    assert!(svg.matches("<rect").count() > 30);
    assert!(svg.contains(">Cases</tspan>"));
    assert!(svg.contains(">Average</tspan>"));
  }
}
