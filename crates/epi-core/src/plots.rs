//! Chart and table request parameters, validation rules and the assembled
//! plot data handed to the renderer.
//!
//! Request DTOs deserialize leniently: empty strings are treated as absent
//! and unparseable dates fall back to their defaults, so that payloads
//! produced by the CMS (which always sends every key) are accepted as-is.

use std::{cmp::Ordering, fmt};

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result,
  dimension::{MetricGroup, compare_ages},
};

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChartType {
  SimpleLine,
  Waffle,
  LineWithShadedSection,
  Bar,
  #[default]
  LineMultiColoured,
  LineSingleSimplified,
}

impl ChartType {
  /// Common chart types can share a figure with each other.
  pub fn is_common(self) -> bool { matches!(self, ChartType::Bar | ChartType::LineMultiColoured) }

  /// Series chart types need more than one record to draw anything useful.
  pub fn is_series(self) -> bool { self != ChartType::Waffle }
}

/// Which family of generator a chart request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartFamily {
  Common,
  Uncommon(ChartType),
}

/// Decide the generator family for a set of plots.
///
/// All-common plots go to the common generator. A single uncommon plot goes
/// to its own generator. Anything else is an invalid combination, reported
/// with the uncommon types involved.
pub fn chart_family(plots: &[PlotParameters]) -> Result<ChartFamily> {
  let Some(first) = plots.first() else {
    return Err(Error::NoPlotsRequested);
  };
  if plots.iter().all(|p| p.chart_type.is_common()) {
    return Ok(ChartFamily::Common);
  }
  if plots.len() == 1 {
    return Ok(ChartFamily::Uncommon(first.chart_type));
  }

  let mut uncommon: Vec<String> = Vec::new();
  for plot in plots.iter().filter(|p| !p.chart_type.is_common()) {
    let name = plot.chart_type.to_string();
    if !uncommon.contains(&name) {
      uncommon.push(name);
    }
  }
  Err(Error::InvalidChartTypeCombination(uncommon))
}

/// Fields that can be put on a chart axis.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChartAxis {
  Date,
  Age,
  Stratum,
  Geography,
  Sex,
  Metric,
}

impl ChartAxis {
  pub const DEFAULT_X: ChartAxis = ChartAxis::Date;
  pub const DEFAULT_Y: ChartAxis = ChartAxis::Metric;

  /// Resolve a requested x axis, falling back to `date` for absent or
  /// unknown names.
  pub fn x_or_default(name: Option<&str>) -> Self {
    name.and_then(|n| n.parse().ok()).unwrap_or(Self::DEFAULT_X)
  }

  /// The y axis always plots `metric_value`; any other request falls back.
  pub fn y_or_default(_name: Option<&str>) -> Self { Self::DEFAULT_Y }

  /// Whether values on this axis are dimension names that a plot can pin.
  pub fn is_dimension(self) -> bool {
    matches!(self, ChartAxis::Age | ChartAxis::Stratum | ChartAxis::Geography | ChartAxis::Sex)
  }

  /// The order of two keys on this axis. Ages sort naturally and metric
  /// values numerically; every other key sorts by its text.
  pub fn compare_keys(self, a: &str, b: &str) -> Ordering {
    match self {
      ChartAxis::Age => compare_ages(a, b),
      ChartAxis::Metric => match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        _ => a.cmp(b),
      },
      _ => a.cmp(b),
    }
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileFormat {
  Png,
  #[default]
  Svg,
  Jpg,
  Jpeg,
}

// ─── Lenient deserializers ───────────────────────────────────────────────────

fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<String>::deserialize(deserializer)?;
  Ok(value.filter(|s| !s.trim().is_empty()))
}

fn default_true() -> bool { true }

// ─── Plot parameters ─────────────────────────────────────────────────────────

/// Everything needed to query and draw a single plot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotParameters {
  #[serde(default)]
  pub chart_type:       ChartType,
  pub topic:            String,
  pub metric:           String,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub stratum:          Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub geography:        Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub geography_type:   Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub sex:              Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub age:              Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub date_from:        Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub date_to:          Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub label:            Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub line_colour:      Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub line_type:        Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub x_axis:           Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub y_axis:           Option<String>,
  #[serde(default = "default_true")]
  pub use_smooth_lines: bool,
  #[serde(default)]
  pub use_markers:      bool,
}

impl PlotParameters {
  pub fn metric_group(&self) -> Result<MetricGroup> { MetricGroup::from_metric(&self.metric) }

  pub fn is_headline(&self) -> bool {
    self.metric_group().is_ok_and(MetricGroup::is_headline)
  }

  pub fn x_axis_value(&self) -> ChartAxis { ChartAxis::x_or_default(self.x_axis.as_deref()) }

  pub fn y_axis_value(&self) -> ChartAxis { ChartAxis::y_or_default(self.y_axis.as_deref()) }

  /// `date_from`, or the first of the month twelve months before `today`.
  pub fn date_from_value(&self, today: NaiveDate) -> NaiveDate {
    parse_date(self.date_from.as_deref()).unwrap_or_else(|| default_date_from(today))
  }

  /// `date_to`, or `today`.
  pub fn date_to_value(&self, today: NaiveDate) -> NaiveDate {
    parse_date(self.date_to.as_deref()).unwrap_or(today)
  }

  /// The value this plot pins for a dimension axis, if any.
  pub fn field(&self, axis: ChartAxis) -> Option<&str> {
    match axis {
      ChartAxis::Age => self.age.as_deref(),
      ChartAxis::Stratum => self.stratum.as_deref(),
      ChartAxis::Geography => self.geography.as_deref(),
      ChartAxis::Sex => self.sex.as_deref(),
      ChartAxis::Date | ChartAxis::Metric => None,
    }
  }

  pub fn set_field(&mut self, axis: ChartAxis, value: String) {
    match axis {
      ChartAxis::Age => self.age = Some(value),
      ChartAxis::Stratum => self.stratum = Some(value),
      ChartAxis::Geography => self.geography = Some(value),
      ChartAxis::Sex => self.sex = Some(value),
      ChartAxis::Date | ChartAxis::Metric => {}
    }
  }

  /// Request-independent checks: the metric names a known group and the
  /// date range is ordered.
  pub fn validate(&self, today: NaiveDate) -> Result<()> {
    self.metric_group()?;
    let (date_from, date_to) = (self.date_from_value(today), self.date_to_value(today));
    if date_to < date_from {
      return Err(Error::DatesNotInChronologicalOrder { date_from, date_to });
    }
    Ok(())
  }
}

fn with_default_axes(plots: &[PlotParameters], x_axis: Option<&str>, y_axis: Option<&str>) -> Vec<PlotParameters> {
  plots
    .iter()
    .cloned()
    .map(|mut plot| {
      if plot.x_axis.is_none() {
        plot.x_axis = x_axis.map(str::to_owned);
      }
      if plot.y_axis.is_none() {
        plot.y_axis = y_axis.map(str::to_owned);
      }
      plot
    })
    .collect()
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
  value.and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
}

/// The first day of the month twelve months before `today`.
pub fn default_date_from(today: NaiveDate) -> NaiveDate {
  let year_ago = today.checked_sub_months(Months::new(12)).unwrap_or(today);
  year_ago.with_day(1).unwrap_or(year_ago)
}

// ─── Chart requests ──────────────────────────────────────────────────────────

pub const DEFAULT_CHART_WIDTH: u32 = 515;
pub const DEFAULT_CHART_HEIGHT: u32 = 220;

fn default_chart_width() -> u32 { DEFAULT_CHART_WIDTH }

fn default_chart_height() -> u32 { DEFAULT_CHART_HEIGHT }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRequestParams {
  #[serde(default)]
  pub file_format:          FileFormat,
  #[serde(default = "default_chart_width")]
  pub chart_width:          u32,
  #[serde(default = "default_chart_height")]
  pub chart_height:         u32,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub x_axis:               Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub y_axis:               Option<String>,
  #[serde(default)]
  pub x_axis_title:         String,
  #[serde(default)]
  pub y_axis_title:         String,
  #[serde(default)]
  pub y_axis_minimum_value: f64,
  #[serde(default)]
  pub y_axis_maximum_value: Option<f64>,
  #[serde(default)]
  pub legend_title:         String,
  #[serde(default)]
  pub confidence_intervals: bool,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub confidence_colour:    Option<String>,
  pub plots:                Vec<PlotParameters>,
}

/// Tables are requested with the same shape as charts.
pub type TableRequestParams = ChartRequestParams;

impl ChartRequestParams {
  pub fn x_axis_value(&self) -> ChartAxis { ChartAxis::x_or_default(self.x_axis.as_deref()) }

  /// Plots with the request-level axes applied where a plot leaves them
  /// unset.
  pub fn resolved_plots(&self) -> Vec<PlotParameters> {
    with_default_axes(&self.plots, self.x_axis.as_deref(), self.y_axis.as_deref())
  }

  /// Checks that need no database: at least one plot, a valid chart type
  /// combination, known metric groups and ordered dates.
  pub fn validate(&self, today: NaiveDate) -> Result<ChartFamily> {
    let family = chart_family(&self.plots)?;
    for plot in &self.plots {
      plot.validate(today)?;
    }
    Ok(family)
  }
}

// ─── Subplots ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subplot {
  pub subplot_title: String,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub x_axis:        Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub y_axis:        Option<String>,
  pub plots:         Vec<PlotParameters>,
}

impl Subplot {
  pub fn x_axis_value(&self) -> ChartAxis { ChartAxis::x_or_default(self.x_axis.as_deref()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubplotChartRequestParams {
  #[serde(default)]
  pub file_format:            FileFormat,
  #[serde(default = "default_chart_width")]
  pub chart_width:            u32,
  #[serde(default = "default_chart_height")]
  pub chart_height:           u32,
  #[serde(default)]
  pub x_axis_title:           String,
  #[serde(default)]
  pub y_axis_title:           String,
  #[serde(default)]
  pub y_axis_minimum_value:   f64,
  #[serde(default)]
  pub y_axis_maximum_value:   Option<f64>,
  #[serde(default)]
  pub target_threshold:       Option<f64>,
  #[serde(default)]
  pub target_threshold_label: String,
  pub subplots:               Vec<Subplot>,
}

impl SubplotChartRequestParams {
  pub fn subplot_titles(&self) -> Vec<String> {
    self.subplots.iter().map(|s| s.subplot_title.clone()).collect()
  }

  pub fn validate(&self, today: NaiveDate) -> Result<()> { validate_subplots(&self.subplots, today) }

  pub fn output_payload_for_tables(&self) -> Vec<SubplotTableRequest> { subplot_table_requests(&self.subplots) }
}

fn validate_subplots(subplots: &[Subplot], today: NaiveDate) -> Result<()> {
  if subplots.iter().all(|s| s.plots.is_empty()) {
    return Err(Error::NoPlotsRequested);
  }
  for plot in subplots.iter().flat_map(|s| &s.plots) {
    plot.validate(today)?;
  }
  Ok(())
}

/// Flip the subplot structure into one table request per group value.
///
/// The grouping field is the first subplot's `x_axis`. Group values are
/// collected in first-seen order across all subplots. Every group holds
/// one slot per subplot, in subplot order: the matching plot relabelled
/// with the subplot title, or `None` when the subplot has no plot for
/// the group. Plots inherit the first subplot's axes when they set none.
fn subplot_table_requests(subplots: &[Subplot]) -> Vec<SubplotTableRequest> {
  let Some(first) = subplots.first() else {
    return vec![];
  };
  let group_by = first.x_axis_value();

  let mut group_values: Vec<&str> = Vec::new();
  for plot in subplots.iter().flat_map(|s| &s.plots) {
    if let Some(value) = plot.field(group_by)
      && !group_values.contains(&value)
    {
      group_values.push(value);
    }
  }

  group_values
    .into_iter()
    .map(|group_value| SubplotTableRequest {
      reference: group_value.to_owned(),
      plots:     subplots
        .iter()
        .map(|subplot| {
          subplot.plots.iter().find(|p| p.field(group_by) == Some(group_value)).map(|p| PlotParameters {
            label: Some(subplot.subplot_title.clone()),
            x_axis: p.x_axis.clone().or_else(|| first.x_axis.clone()),
            y_axis: p.y_axis.clone().or_else(|| first.y_axis.clone()),
            ..p.clone()
          })
        })
        .collect(),
    })
    .collect()
}

/// One row of a subplot table before any data is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct SubplotTableRequest {
  pub reference: String,
  /// Indexed like the request's subplots.
  pub plots:     Vec<Option<PlotParameters>>,
}

// ─── Downloads ───────────────────────────────────────────────────────────────

/// Output format of a data download.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DownloadFormat {
  #[default]
  Csv,
  Json,
}

impl DownloadFormat {
  pub fn content_type(self) -> &'static str {
    match self {
      DownloadFormat::Csv => "text/csv",
      DownloadFormat::Json => "application/json",
    }
  }

  pub fn extension(self) -> &'static str {
    match self {
      DownloadFormat::Csv => "csv",
      DownloadFormat::Json => "json",
    }
  }
}

/// The rows behind one chart, requested as a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequestParams {
  #[serde(default)]
  pub file_format: DownloadFormat,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub x_axis:      Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub y_axis:      Option<String>,
  pub plots:       Vec<PlotParameters>,
}

impl DownloadRequestParams {
  pub fn resolved_plots(&self) -> Vec<PlotParameters> {
    with_default_axes(&self.plots, self.x_axis.as_deref(), self.y_axis.as_deref())
  }

  /// At least one plot, every plot valid, and either all headline metrics
  /// or none. Returns whether the download is of headlines.
  pub fn validate(&self, today: NaiveDate) -> Result<bool> { validate_download(&self.plots, today) }
}

fn validate_download(plots: &[PlotParameters], today: NaiveDate) -> Result<bool> {
  let Some(first) = plots.first() else {
    return Err(Error::NoPlotsRequested);
  };
  for plot in plots {
    plot.validate(today)?;
  }
  let headline = first.is_headline();
  if plots.iter().any(|p| p.is_headline() != headline) {
    return Err(Error::InvalidRequest("headline and time series metrics cannot share a download".into()));
  }
  Ok(headline)
}

/// A subplot chart's rows, one group per value of the first subplot's x
/// axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubplotDownloadRequestParams {
  #[serde(default)]
  pub file_format: DownloadFormat,
  pub subplots:    Vec<Subplot>,
}

impl SubplotDownloadRequestParams {
  pub fn validate(&self, today: NaiveDate) -> Result<()> { validate_subplots(&self.subplots, today) }

  pub fn output_payload_for_tables(&self) -> Vec<SubplotTableRequest> { subplot_table_requests(&self.subplots) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDownloadChart {
  /// File name inside the archive, without extension.
  pub name:   String,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub x_axis: Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub y_axis: Option<String>,
  pub plots:  Vec<PlotParameters>,
}

impl BulkDownloadChart {
  pub fn resolved_plots(&self) -> Vec<PlotParameters> {
    with_default_axes(&self.plots, self.x_axis.as_deref(), self.y_axis.as_deref())
  }

  pub fn validate(&self, today: NaiveDate) -> Result<bool> { validate_download(&self.plots, today) }
}

/// Several charts' rows, delivered as one archive with a file per chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDownloadRequestParams {
  #[serde(default)]
  pub file_format: DownloadFormat,
  pub charts:      Vec<BulkDownloadChart>,
}

impl BulkDownloadRequestParams {
  pub fn validate(&self, today: NaiveDate) -> Result<()> {
    if self.charts.is_empty() {
      return Err(Error::NoPlotsRequested);
    }
    for chart in &self.charts {
      chart.validate(today)?;
    }
    Ok(())
  }
}

// ─── Dual category ───────────────────────────────────────────────────────────

/// Dimensions held constant across every segment of a dual-category chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticFields {
  pub topic:          String,
  pub metric:         String,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub stratum:        Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub geography:      Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub geography_type: Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub sex:            Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub age:            Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub date_from:      Option<String>,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub date_to:        Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
  pub secondary_field_value: String,
  pub colour:                String,
  #[serde(default, deserialize_with = "empty_as_none")]
  pub label:                 Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualCategoryChartRequestParams {
  #[serde(default)]
  pub file_format:          FileFormat,
  #[serde(default = "default_chart_width")]
  pub chart_width:          u32,
  #[serde(default = "default_chart_height")]
  pub chart_height:         u32,
  #[serde(default)]
  pub x_axis_title:         String,
  #[serde(default)]
  pub y_axis_title:         String,
  #[serde(default)]
  pub y_axis_minimum_value: f64,
  #[serde(default)]
  pub y_axis_maximum_value: Option<f64>,
  #[serde(default)]
  pub legend_title:         String,
  #[serde(default = "default_dual_chart_type")]
  pub chart_type:           ChartType,
  pub static_fields:        StaticFields,
  pub primary_field:        ChartAxis,
  pub secondary_field:      ChartAxis,
  #[serde(default)]
  pub primary_field_values: Vec<String>,
  pub segments:             Vec<Segment>,
}

fn default_dual_chart_type() -> ChartType { ChartType::Bar }

impl DualCategoryChartRequestParams {
  pub fn validate(&self, today: NaiveDate) -> Result<()> {
    if self.segments.is_empty() {
      return Err(Error::NoPlotsRequested);
    }
    if !self.chart_type.is_common() {
      return Err(Error::InvalidChartTypeCombination(vec![self.chart_type.to_string()]));
    }
    if !self.secondary_field.is_dimension() {
      return Err(Error::InvalidRequest(format!(
        "`{}` cannot be used as a secondary category",
        self.secondary_field
      )));
    }
    if self.primary_field == self.secondary_field || self.primary_field == ChartAxis::Metric {
      return Err(Error::InvalidRequest(format!(
        "`{}` cannot be used as the primary category",
        self.primary_field
      )));
    }
    if self.segments.iter().any(|s| s.secondary_field_value.trim().is_empty()) {
      return Err(Error::InvalidRequest("`secondary_field_value` must not be empty".into()));
    }
    self.to_chart_request().validate(today).map(|_| ())
  }

  /// One plot per segment: the static fields, the segment's secondary value
  /// pinned, and the primary field on the x axis.
  pub fn to_chart_request(&self) -> ChartRequestParams {
    let s = &self.static_fields;
    let plots = self
      .segments
      .iter()
      .map(|segment| {
        let mut plot = PlotParameters {
          chart_type: self.chart_type,
          topic: s.topic.clone(),
          metric: s.metric.clone(),
          stratum: s.stratum.clone(),
          geography: s.geography.clone(),
          geography_type: s.geography_type.clone(),
          sex: s.sex.clone(),
          age: s.age.clone(),
          date_from: s.date_from.clone(),
          date_to: s.date_to.clone(),
          label: segment.label.clone().or_else(|| Some(segment.secondary_field_value.clone())),
          line_colour: Some(segment.colour.clone()),
          x_axis: Some(self.primary_field.to_string()),
          y_axis: Some(ChartAxis::Metric.to_string()),
          use_smooth_lines: false,
          ..Default::default()
        };
        plot.set_field(self.secondary_field, segment.secondary_field_value.clone());
        plot
      })
      .collect();

    ChartRequestParams {
      file_format: self.file_format,
      chart_width: self.chart_width,
      chart_height: self.chart_height,
      x_axis: Some(self.primary_field.to_string()),
      y_axis: Some(ChartAxis::Metric.to_string()),
      x_axis_title: self.x_axis_title.clone(),
      y_axis_title: self.y_axis_title.clone(),
      y_axis_minimum_value: self.y_axis_minimum_value,
      y_axis_maximum_value: self.y_axis_maximum_value,
      legend_title: self.legend_title.clone(),
      confidence_intervals: false,
      confidence_colour: None,
      plots,
    }
  }
}

// ─── Assembled data ──────────────────────────────────────────────────────────

/// A value on the x axis of a plot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValue {
  Date(NaiveDate),
  Text(String),
}

impl fmt::Display for AxisValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      AxisValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
      AxisValue::Text(s) => f.write_str(s),
    }
  }
}

/// One point as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotPoint {
  pub x:                         AxisValue,
  pub y:                         f64,
  pub in_reporting_delay_period: bool,
  pub upper_confidence:          Option<f64>,
  pub lower_confidence:          Option<f64>,
  /// The record's own date (`date` or `period_end`), used for
  /// `latest_date` whatever the x axis is.
  pub date:                      NaiveDate,
}

/// Everything needed to draw one plot: its parameters and its data in
/// parallel columns of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotGenerationData {
  pub parameters:                PlotParameters,
  pub x_values:                  Vec<AxisValue>,
  pub y_values:                  Vec<f64>,
  pub in_reporting_delay_period: Vec<bool>,
  pub upper_confidence:          Vec<Option<f64>>,
  pub lower_confidence:          Vec<Option<f64>>,
  pub latest_date:               Option<NaiveDate>,
}

impl PlotGenerationData {
  /// Split points into columns. Returns `None` when there are no points.
  pub fn from_points(parameters: PlotParameters, points: Vec<PlotPoint>) -> Option<Self> {
    if points.is_empty() {
      return None;
    }
    let latest_date = points.iter().map(|p| p.date).max();
    let len = points.len();
    let mut data = Self {
      parameters,
      x_values: Vec::with_capacity(len),
      y_values: Vec::with_capacity(len),
      in_reporting_delay_period: Vec::with_capacity(len),
      upper_confidence: Vec::with_capacity(len),
      lower_confidence: Vec::with_capacity(len),
      latest_date,
    };
    for point in points {
      data.x_values.push(point.x);
      data.y_values.push(point.y);
      data.in_reporting_delay_period.push(point.in_reporting_delay_period);
      data.upper_confidence.push(point.upper_confidence);
      data.lower_confidence.push(point.lower_confidence);
    }
    Some(data)
  }

  pub fn len(&self) -> usize { self.x_values.len() }

  pub fn is_empty(&self) -> bool { self.x_values.is_empty() }

  /// Index of the first point inside the reporting delay period.
  pub fn start_of_reporting_delay_period(&self) -> Option<usize> {
    self.in_reporting_delay_period.iter().position(|&b| b)
  }

  pub fn has_confidence_intervals(&self) -> bool {
    self.upper_confidence.iter().chain(&self.lower_confidence).any(Option::is_some)
  }

  /// Keep only the points whose x value is in `allowed`.
  pub fn retain_x(&mut self, allowed: &[String]) {
    let keep: Vec<bool> =
      self.x_values.iter().map(|x| allowed.iter().any(|a| *a == x.to_string())).collect();
    retain_by(&mut self.x_values, &keep);
    retain_by(&mut self.y_values, &keep);
    retain_by(&mut self.in_reporting_delay_period, &keep);
    retain_by(&mut self.upper_confidence, &keep);
    retain_by(&mut self.lower_confidence, &keep);
  }
}

fn retain_by<T>(values: &mut Vec<T>, keep: &[bool]) {
  let mut flags = keep.iter();
  values.retain(|_| flags.next().copied().unwrap_or(false));
}

/// The maximum `latest_date` across plots: the chart's "last updated".
pub fn last_updated(plots: &[PlotGenerationData]) -> Option<NaiveDate> {
  plots.iter().filter_map(|p| p.latest_date).max()
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn plot(chart_type: ChartType) -> PlotParameters {
    PlotParameters {
      chart_type,
      topic: "COVID-19".into(),
      metric: "COVID-19_cases_casesByDay".into(),
      ..Default::default()
    }
  }

  fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  #[test]
  fn common_types_combine() {
    let plots = vec![plot(ChartType::Bar), plot(ChartType::LineMultiColoured)];
    assert_eq!(chart_family(&plots).unwrap(), ChartFamily::Common);
  }

  #[test]
  fn single_uncommon_plot_is_allowed() {
    let plots = vec![plot(ChartType::LineSingleSimplified)];
    assert_eq!(
      chart_family(&plots).unwrap(),
      ChartFamily::Uncommon(ChartType::LineSingleSimplified)
    );
  }

  #[test]
  fn mixed_types_list_the_uncommon_ones() {
    let plots = vec![
      plot(ChartType::Bar),
      plot(ChartType::LineSingleSimplified),
      plot(ChartType::Waffle),
      plot(ChartType::Waffle),
    ];
    let err = chart_family(&plots).unwrap_err();
    assert!(
      err.to_string().ends_with("line_single_simplified, waffle"),
      "{err}"
    );
  }

  #[test]
  fn default_dates() {
    let p = plot(ChartType::Bar);
    let today = day(2024, 3, 15);
    assert_eq!(p.date_from_value(today), day(2023, 3, 1));
    assert_eq!(p.date_to_value(today), today);
  }

  #[test]
  fn unordered_dates_are_rejected() {
    let p = PlotParameters {
      date_from: Some("2023-03-31".into()),
      date_to: Some("2023-01-01".into()),
      ..plot(ChartType::Bar)
    };
    assert!(matches!(
      p.validate(day(2024, 1, 1)),
      Err(Error::DatesNotInChronologicalOrder { .. })
    ));
  }

  #[test]
  fn lenient_deserialization() {
    let p: PlotParameters = serde_json::from_value(json!({
      "chart_type": "bar",
      "topic": "COVID-19",
      "metric": "COVID-19_cases_casesByDay",
      "geography": "",
      "date_from": "not-a-date",
      "x_axis": "",
    }))
    .unwrap();
    assert_eq!(p.geography, None);
    assert_eq!(p.x_axis_value(), ChartAxis::Date);
    assert_eq!(p.date_from_value(day(2024, 6, 30)), day(2023, 6, 1));
    assert!(p.use_smooth_lines);

    let request: ChartRequestParams = serde_json::from_value(json!({
      "plots": [{"topic": "COVID-19", "metric": "COVID-19_cases_casesByDay"}],
    }))
    .unwrap();
    assert_eq!(request.chart_width, 515);
    assert_eq!(request.chart_height, 220);
    assert_eq!(request.file_format, FileFormat::Svg);
  }

  #[test]
  fn unknown_axes_fall_back() {
    assert_eq!(ChartAxis::x_or_default(Some("age")), ChartAxis::Age);
    assert_eq!(ChartAxis::x_or_default(Some("nonsense")), ChartAxis::Date);
    assert_eq!(ChartAxis::y_or_default(Some("age")), ChartAxis::Metric);
  }

  #[test]
  fn subplot_payload_groups_by_first_x_axis() {
    let geo = |g: &str| PlotParameters { geography: Some(g.into()), ..plot(ChartType::Bar) };
    let request = SubplotChartRequestParams {
      file_format:            FileFormat::Svg,
      chart_width:            515,
      chart_height:           220,
      x_axis_title:           String::new(),
      y_axis_title:           String::new(),
      y_axis_minimum_value:   0.0,
      y_axis_maximum_value:   None,
      target_threshold:       None,
      target_threshold_label: String::new(),
      subplots:               vec![
        Subplot {
          subplot_title: "6-in-1".into(),
          x_axis:        Some("geography".into()),
          y_axis:        None,
          plots:         vec![geo("England"), geo("London"), geo("Leeds")],
        },
        Subplot {
          subplot_title: "MMR1".into(),
          x_axis:        Some("geography".into()),
          y_axis:        None,
          plots:         vec![geo("England"), geo("Leeds")],
        },
      ],
    };

    let groups = request.output_payload_for_tables();
    let names: Vec<&str> = groups.iter().map(|g| g.reference.as_str()).collect();
    assert_eq!(names, vec!["England", "London", "Leeds"]);

    let london = &groups[1];
    assert_eq!(london.plots.len(), 2);
    let first = london.plots[0].as_ref().unwrap();
    assert_eq!(first.label.as_deref(), Some("6-in-1"));
    assert_eq!(first.x_axis_value(), ChartAxis::Geography);
    assert_eq!(london.plots[1], None);
  }

  #[test]
  fn metric_keys_sort_numerically() {
    let mut keys = vec!["10", "9.5", "100", "-1"];
    keys.sort_by(|a, b| ChartAxis::Metric.compare_keys(a, b));
    assert_eq!(keys, vec!["-1", "9.5", "10", "100"]);

    let mut names = vec!["Leeds", "England", "London"];
    names.sort_by(|a, b| ChartAxis::Geography.compare_keys(a, b));
    assert_eq!(names, vec!["England", "Leeds", "London"]);
  }

  #[test]
  fn dual_category_pins_secondary_field() {
    let request: DualCategoryChartRequestParams = serde_json::from_value(json!({
      "static_fields": {
        "topic": "COVID-19",
        "metric": "COVID-19_cases_casesByDay",
        "geography": "England",
        "geography_type": "Nation",
      },
      "primary_field": "sex",
      "secondary_field": "age",
      "segments": [
        {"secondary_field_value": "00-04", "colour": "COLOUR_9_DEEP_PLUM", "label": "0 to 4 years"},
        {"secondary_field_value": "05-09", "colour": "COLOUR_10_PINK"},
      ],
    }))
    .unwrap();
    request.validate(day(2024, 1, 1)).unwrap();

    let chart = request.to_chart_request();
    assert_eq!(chart.plots.len(), 2);
    assert_eq!(chart.plots[0].age.as_deref(), Some("00-04"));
    assert_eq!(chart.plots[0].x_axis_value(), ChartAxis::Sex);
    assert_eq!(chart.plots[1].label.as_deref(), Some("05-09"));
    assert_eq!(chart.plots[0].chart_type, ChartType::Bar);
  }

  #[test]
  fn plot_data_columns_have_equal_length() {
    let points = (1..=3)
      .map(|d| PlotPoint {
        x:                         AxisValue::Date(day(2023, 1, d)),
        y:                         f64::from(d),
        in_reporting_delay_period: d == 3,
        upper_confidence:          None,
        lower_confidence:          None,
        date:                      day(2023, 1, d),
      })
      .collect();
    let data = PlotGenerationData::from_points(plot(ChartType::Bar), points).unwrap();
    assert_eq!(data.x_values.len(), data.y_values.len());
    assert_eq!(data.y_values.len(), data.in_reporting_delay_period.len());
    assert_eq!(data.latest_date, Some(day(2023, 1, 3)));
    assert_eq!(data.start_of_reporting_delay_period(), Some(2));
    assert!(PlotGenerationData::from_points(plot(ChartType::Bar), vec![]).is_none());
  }

  #[test]
  fn downloads_default_to_csv_and_reject_mixed_groups() {
    let request: DownloadRequestParams = serde_json::from_value(json!({
      "x_axis": "geography",
      "plots": [{"topic": "COVID-19", "metric": "COVID-19_cases_casesByDay", "x_axis": ""}],
    }))
    .unwrap();
    assert_eq!(request.file_format, DownloadFormat::Csv);
    assert!(!request.validate(day(2024, 1, 1)).unwrap());
    assert_eq!(request.resolved_plots()[0].x_axis_value(), ChartAxis::Geography);

    let headline = PlotParameters { metric: "COVID-19_headline_ONSdeaths_7DayChange".into(), ..plot(ChartType::Bar) };
    let mixed = DownloadRequestParams { plots: vec![plot(ChartType::Bar), headline.clone()], ..request.clone() };
    assert!(matches!(mixed.validate(day(2024, 1, 1)), Err(Error::InvalidRequest(_))));

    let headlines = DownloadRequestParams { plots: vec![headline], ..request.clone() };
    assert!(headlines.validate(day(2024, 1, 1)).unwrap());

    let empty = DownloadRequestParams { plots: vec![], ..request };
    assert!(matches!(empty.validate(day(2024, 1, 1)), Err(Error::NoPlotsRequested)));
  }

  #[test]
  fn bulk_downloads_need_a_chart() {
    let request: BulkDownloadRequestParams =
      serde_json::from_value(json!({"file_format": "json", "charts": []})).unwrap();
    assert_eq!(request.file_format.extension(), "json");
    assert!(matches!(request.validate(day(2024, 1, 1)), Err(Error::NoPlotsRequested)));
  }
}
