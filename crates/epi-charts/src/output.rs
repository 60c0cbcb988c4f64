//! Chart generation entry points and the two output shapes: raw image bytes
//! and the encoded response carrying SVG, alt text and the interactive
//! figure.

use chrono::NaiveDate;
use epi_core::plots::{
  ChartFamily, ChartType, DualCategoryChartRequestParams, FileFormat, PlotGenerationData, last_updated,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{
  Error, Result, alt_text, common, dual,
  figure::Figure,
  interactive::{HoverStyle, make_interactive},
  optimise::optimise,
  payload::{ChartGenerationPayload, SubplotChartGenerationPayload},
  raster, simplified, subplots, svg,
};

/// A generated chart ready to be written out.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartOutput {
  pub figure:       Figure,
  pub description:  String,
  pub last_updated: Option<NaiveDate>,
  pub hover:        HoverStyle,
}

/// The encoded chart response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartResult {
  pub last_updated: Option<NaiveDate>,
  /// Optimised SVG, URL-encoded.
  pub chart:        String,
  pub alt_text:     String,
  pub figure:       Value,
}

fn hover_style(plots: &[PlotGenerationData]) -> HoverStyle {
  if plots.first().is_some_and(|p| p.parameters.is_headline()) {
    HoverStyle::Headline
  } else {
    HoverStyle::Timeseries
  }
}

/// Draw single-category plots with the generator for their family.
pub fn generate_chart(payload: &ChartGenerationPayload, family: ChartFamily) -> Result<ChartOutput> {
  let figure = match family {
    ChartFamily::Uncommon(ChartType::LineSingleSimplified) => simplified::generate_chart_figure(payload)?,
    ChartFamily::Common | ChartFamily::Uncommon(_) => common::generate_chart_figure(payload)?,
  };
  debug!(plots = payload.plots.len(), traces = figure.data.len(), ?family, "generated chart figure");
  Ok(ChartOutput {
    figure,
    description: alt_text::describe(&payload.plots),
    last_updated: last_updated(&payload.plots),
    hover: hover_style(&payload.plots),
  })
}

pub fn generate_subplot_chart(payload: &SubplotChartGenerationPayload) -> Result<ChartOutput> {
  let figure = subplots::generate_chart_figure(payload)?;
  let plots: Vec<PlotGenerationData> = payload.all_plots().cloned().collect();
  Ok(ChartOutput {
    figure,
    description: alt_text::describe_subplots(&plots),
    last_updated: last_updated(&plots),
    hover: HoverStyle::Subplot,
  })
}

pub fn generate_dual_category_chart(
  request: &DualCategoryChartRequestParams,
  plots: Vec<PlotGenerationData>,
) -> Result<ChartOutput> {
  let description = alt_text::describe(&plots);
  let updated = last_updated(&plots);
  let hover = hover_style(&plots);
  let figure = dual::generate_chart_figure(request, plots)?;
  Ok(ChartOutput { figure, description, last_updated: updated, hover })
}

impl ChartOutput {
  pub fn to_svg(&self) -> Result<String> { svg::render(&self.figure) }

  /// Image bytes in `format`, without optimisation.
  pub fn write(&self, format: FileFormat) -> Result<Vec<u8>> { raster::encode(&self.to_svg()?, format) }

  /// The encoded response. Only SVG can be encoded.
  pub fn encode(&self, format: FileFormat) -> Result<ChartResult> {
    if format != FileFormat::Svg {
      return Err(Error::InvalidFileFormat);
    }
    let rendered = self.to_svg()?;
    let optimised = optimise(&rendered)?;
    debug!(rendered = rendered.len(), optimised = optimised.len(), "optimised chart svg");

    Ok(ChartResult {
      last_updated: self.last_updated,
      chart:        url::form_urlencoded::byte_serialize(optimised.as_bytes()).collect(),
      alt_text:     self.description.clone(),
      figure:       make_interactive(&self.figure, self.hover).to_json()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tests::{payload, series};

  #[test]
  fn simplified_family_uses_the_simplified_generator() {
    let request = payload(vec![series(ChartType::LineSingleSimplified, None, 30)]);
    let output = generate_chart(&request, ChartFamily::Uncommon(ChartType::LineSingleSimplified)).unwrap();
    assert!(output.figure.layout.yaxis.ticktext.is_some());
    assert_eq!(output.last_updated, NaiveDate::from_ymd_opt(2023, 1, 30));
  }

  #[test]
  fn only_svg_is_encoded() {
    let output = generate_chart(&payload(vec![series(ChartType::Bar, None, 5)]), ChartFamily::Common).unwrap();
    assert!(matches!(output.encode(FileFormat::Png), Err(Error::InvalidFileFormat)));
  }

  #[test]
  fn encoded_chart_is_url_encoded_svg() {
    let output = generate_chart(&payload(vec![series(ChartType::Bar, Some("Cases"), 5)]), ChartFamily::Common).unwrap();
    let result = output.encode(FileFormat::Svg).unwrap();

    assert!(result.chart.starts_with("%3Csvg+xmlns%3D"));
    let decoded: String = url::form_urlencoded::parse(format!("c={}", result.chart).as_bytes())
      .map(|(_, v)| v.into_owned())
      .collect();
    assert!(decoded.starts_with("<svg"));
    assert!(!decoded.contains("<?xml"));
    assert!(result.alt_text.starts_with("There is only 1 plot on this chart. "));
    assert_eq!(result.figure["layout"].get("width"), None);
    assert_eq!(result.figure["data"][0]["type"], "bar");
  }
}
