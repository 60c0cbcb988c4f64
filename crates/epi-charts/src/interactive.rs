//! Post-processing of figures sent to the frontend for interactive
//! rendering. Static image output never goes through here.

use serde_json::Value;

use crate::{
  colour,
  figure::{Figure, Font, HoverLabel, Legend},
};

const TIMESERIES_HOVER: &str = "%{y:,} (%{x|%d %b %Y})<extra></extra>";
const HEADLINE_HOVER: &str = "%{y:,} (%{x})<extra></extra>";
const SUBPLOT_HOVER: &str = "%{y} %{fullData.name}<extra></extra>";
const HOVER_FONT_SIZE: f64 = 16.0;

/// What the figure plots, which decides how hovering over a point reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverStyle {
  Timeseries,
  Headline,
  Subplot,
}

impl HoverStyle {
  fn template(self) -> &'static str {
    match self {
      HoverStyle::Timeseries => TIMESERIES_HOVER,
      HoverStyle::Headline => HEADLINE_HOVER,
      HoverStyle::Subplot => SUBPLOT_HOVER,
    }
  }
}

/// Make a copy of `figure` for interactive rendering: the width is left to
/// the browser, hover labels are set, and legend entries cannot toggle
/// traces.
pub fn make_interactive(figure: &Figure, style: HoverStyle) -> Figure {
  let mut figure = figure.clone();

  figure.layout.width = None;
  figure.layout.autosize = Some(true);
  figure.layout.hovermode = Some(if style == HoverStyle::Subplot { "closest" } else { "x" }.into());
  figure.layout.hoverlabel = Some(HoverLabel {
    bgcolor: Some(colour::BLACK.stringified()),
    font:    Some(Font {
      family: Some("Arial".into()),
      color:  Some("white".into()),
      size:   Some(HOVER_FONT_SIZE),
    }),
  });

  if let Some(legend) = figure.layout.legend.as_mut() {
    disable_toggling(legend);
  } else {
    let mut legend = Legend::default();
    disable_toggling(&mut legend);
    figure.layout.legend = Some(legend);
  }

  for trace in &mut figure.data {
    if trace.hoverinfo.as_deref() == Some("skip") {
      continue;
    }
    trace.hovertemplate = Some(style.template().into());
  }
  figure
}

fn disable_toggling(legend: &mut Legend) {
  legend.itemclick = Some(Value::Bool(false));
  legend.itemdoubleclick = Some(Value::Bool(false));
}

#[cfg(test)]
mod tests {
  use epi_core::plots::ChartType;

  use super::*;
  use crate::{
    common,
    tests::{payload, series},
  };

  #[test]
  fn static_figure_is_untouched() {
    let mut request = payload(vec![series(ChartType::LineMultiColoured, Some("Rate"), 10)]);
    request.confidence_intervals = true;
    let figure = common::generate_chart_figure(&request).unwrap();
    let interactive = make_interactive(&figure, HoverStyle::Timeseries);

    assert_eq!(figure.layout.width, Some(515));
    assert_eq!(interactive.layout.width, None);
    assert!(figure.data.iter().all(|t| t.hovertemplate.is_none()));

    // The confidence band stays out of hovering.
    assert_eq!(interactive.data[0].hovertemplate, None);
    assert_eq!(interactive.data[1].hovertemplate.as_deref(), Some(TIMESERIES_HOVER));

    let legend = interactive.layout.legend.unwrap();
    assert_eq!(legend.itemclick, Some(Value::Bool(false)));
    assert_eq!(interactive.layout.hoverlabel.unwrap().font.unwrap().size, Some(16.0));
  }
}
