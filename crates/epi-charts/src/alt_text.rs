//! Plain-English descriptions of charts for screen readers.

use std::fmt::Write;

use epi_core::plots::{ChartType, PlotGenerationData, PlotParameters};

fn chart_type_noun(chart_type: ChartType) -> &'static str {
  match chart_type {
    ChartType::Bar | ChartType::Waffle => "bar",
    _ => "line",
  }
}

fn sex_group(sex: Option<&str>) -> &'static str {
  match sex {
    Some("f") => "females",
    Some("m") => "males",
    _ => "all",
  }
}

fn default_colour_name(chart_type: ChartType) -> &'static str {
  match chart_type {
    ChartType::Bar => "blue",
    _ => "black",
  }
}

/// Describe every plot that has data. One introductory sentence, one about
/// the axes, then one block per plot.
pub fn describe(plots: &[PlotGenerationData]) -> String {
  let plots: Vec<&PlotGenerationData> = plots.iter().filter(|p| !p.is_empty()).collect();
  let mut text = String::new();

  match plots.as_slice() {
    [] => text.push_str("There is no data being shown for this chart."),
    [only] => {
      text.push_str("There is only 1 plot on this chart. ");
      describe_axes(&mut text, &only.parameters);
      describe_only_plot(&mut text, &only.parameters);
    }
    many => {
      let _ = write!(text, "There are {} plots on this chart. ", many.len());
      describe_axes(&mut text, &many[0].parameters);
      for (index, plot) in many.iter().enumerate() {
        describe_nth_plot(&mut text, index + 1, &plot.parameters);
      }
    }
  }
  text
}

fn describe_axes(text: &mut String, p: &PlotParameters) {
  let _ = write!(
    text,
    "The horizontal X-axis is labelled '{}'. Whilst the vertical Y-axis is labelled '{}'. ",
    p.x_axis_value(),
    p.y_axis_value(),
  );
}

fn describe_only_plot(text: &mut String, p: &PlotParameters) {
  if let (Some(line_type), Some(colour)) = (&p.line_type, &p.line_colour) {
    let _ = write!(
      text,
      "The only plot on this chart is a {} {} {} plot. ",
      colour.to_lowercase(),
      line_type.to_lowercase(),
      chart_type_noun(p.chart_type),
    );
  }
  describe_label(text, p);
  describe_parameters(text, p);
}

fn describe_nth_plot(text: &mut String, index: usize, p: &PlotParameters) {
  let colour = p.line_colour.as_deref().unwrap_or(default_colour_name(p.chart_type));
  let line_type = p.line_type.as_deref().unwrap_or("solid");
  let _ = write!(
    text,
    "Plot number {index} on this chart is a {} {} {} plot. ",
    colour.to_lowercase(),
    line_type.to_lowercase(),
    chart_type_noun(p.chart_type),
  );
  describe_label(text, p);
  describe_parameters(text, p);
}

fn describe_label(text: &mut String, p: &PlotParameters) {
  if let Some(label) = &p.label {
    let _ = write!(text, "The plot has a label of '{label}'. ");
  }
}

fn describe_parameters(text: &mut String, p: &PlotParameters) {
  let _ = write!(
    text,
    "This plot shows data for {}. Specifically the metric '{}' for the {} area, along with the \
     age banding of '{}' for the gender group of {}. ",
    p.topic,
    p.metric,
    p.geography.as_deref().unwrap_or("all"),
    p.age.as_deref().unwrap_or("all"),
    sex_group(p.sex.as_deref()),
  );
}

/// Subplots are always drawn as bars, so they are described as bars
/// whatever chart type their plots asked for.
pub fn describe_subplots<'a>(plots: impl IntoIterator<Item = &'a PlotGenerationData>) -> String {
  let plots: Vec<PlotGenerationData> = plots
    .into_iter()
    .cloned()
    .map(|mut p| {
      p.parameters.chart_type = ChartType::Bar;
      p
    })
    .collect();
  describe(&plots)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tests::series;

  #[test]
  fn no_plots() {
    assert_eq!(describe(&[]), "There is no data being shown for this chart.");
  }

  #[test]
  fn single_plot() {
    let mut plot = series(ChartType::LineMultiColoured, Some("Cases"), 3);
    plot.parameters.line_colour = Some("COLOUR_1_DARK_BLUE".into());
    plot.parameters.line_type = Some("SOLID".into());
    plot.parameters.geography = Some("England".into());
    plot.parameters.sex = Some("f".into());

    assert_eq!(
      describe(&[plot]),
      "There is only 1 plot on this chart. \
       The horizontal X-axis is labelled 'date'. \
       Whilst the vertical Y-axis is labelled 'metric'. \
       The only plot on this chart is a colour_1_dark_blue solid line plot. \
       The plot has a label of 'Cases'. \
       This plot shows data for COVID-19. \
       Specifically the metric 'COVID-19_cases_casesByDay' for the England area, \
       along with the age banding of 'all' for the gender group of females. "
    );
  }

  #[test]
  fn multiple_plots_are_numbered() {
    let text = describe(&[
      series(ChartType::Bar, None, 2),
      series(ChartType::LineMultiColoured, None, 2),
    ]);
    assert!(text.starts_with("There are 2 plots on this chart. "));
    assert!(text.contains("Plot number 1 on this chart is a blue solid bar plot. "));
    assert!(text.contains("Plot number 2 on this chart is a black solid line plot. "));
  }

  #[test]
  fn subplots_describe_bars() {
    let plots = [series(ChartType::LineMultiColoured, None, 2), series(ChartType::LineMultiColoured, None, 2)];
    let text = describe_subplots(&plots);
    assert!(text.contains("Plot number 2 on this chart is a blue solid bar plot. "));
  }
}
