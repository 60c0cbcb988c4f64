//! Plot validation against the store and assembly of plot data.

use std::collections::HashSet;

use chrono::NaiveDate;
use epi_core::{
  Error,
  plots::{ChartAxis, PlotGenerationData, PlotParameters},
  rbac::RbacPermission,
  record::{HeadlineRecord, TimeSeriesRecord},
  store::{HeadlineQuery, MetricsStore, TimeSeriesQuery},
};
use tracing::debug;

use crate::error::ApiError;

/// Queries the data of each plot in a request, as seen by one caller.
pub struct PlotAssembler<'a, S> {
  store:       &'a S,
  permissions: &'a [RbacPermission],
  today:       NaiveDate,
}

impl<'a, S: MetricsStore> PlotAssembler<'a, S> {
  pub fn new(store: &'a S, permissions: &'a [RbacPermission], today: NaiveDate) -> Self {
    Self { store, permissions, today }
  }

  // ── Validation ────────────────────────────────────────────────────────

  /// The metric belongs to the plot's topic.
  pub async fn check_topic(&self, plot: &PlotParameters) -> Result<(), ApiError> {
    let available = self
      .store
      .is_metric_available_for_topic(&plot.topic, &plot.metric)
      .await
      .map_err(ApiError::store)?;
    if available {
      Ok(())
    } else {
      Err(Error::MetricDoesNotSupportTopic { topic: plot.topic.clone(), metric: plot.metric.clone() }.into())
    }
  }

  /// Checks that need the database: the metric belongs to the topic, and
  /// series chart types get a metric with more than one record.
  pub async fn validate(&self, plot: &PlotParameters) -> Result<(), ApiError> {
    self.check_topic(plot).await?;

    if !plot.chart_type.is_series() {
      return Ok(());
    }
    let compatible = if plot.is_headline() {
      plot.x_axis_value() != ChartAxis::Date
    } else {
      self.store.count_time_series(&plot.topic, &plot.metric).await.map_err(ApiError::store)? > 1
    };
    if compatible {
      Ok(())
    } else {
      Err(
        Error::ChartTypeDoesNotSupportMetric {
          metric:     plot.metric.clone(),
          chart_type: plot.chart_type.to_string(),
        }
        .into(),
      )
    }
  }

  // ── Assembly ──────────────────────────────────────────────────────────

  /// The data of one plot, or `None` when nothing visible matched.
  pub async fn plot_data(&self, plot: &PlotParameters) -> Result<Option<PlotGenerationData>, ApiError> {
    let x_axis = plot.x_axis_value();
    let points = if plot.is_headline() {
      self.store.query_headline_series(&self.headline_query(plot), x_axis).await
    } else {
      self.store.query_time_series(&self.time_series_query(plot)).await
    }
    .map_err(ApiError::store)?;

    debug!(metric = %plot.metric, %x_axis, points = points.len(), "assembled plot");
    Ok(PlotGenerationData::from_points(plot.clone(), points))
  }

  fn headline_query(&self, plot: &PlotParameters) -> HeadlineQuery {
    HeadlineQuery {
      topic:          plot.topic.clone(),
      metric:         plot.metric.clone(),
      geography:      plot.geography.clone(),
      geography_code: None,
      geography_type: plot.geography_type.clone(),
      age:            plot.age.clone(),
      sex:            plot.sex.clone(),
      stratum:        plot.stratum.clone(),
      permissions:    self.permissions.to_vec(),
      as_of:          None,
    }
  }

  fn time_series_query(&self, plot: &PlotParameters) -> TimeSeriesQuery {
    TimeSeriesQuery {
      topic:          plot.topic.clone(),
      metric:         plot.metric.clone(),
      geography:      plot.geography.clone(),
      geography_type: plot.geography_type.clone(),
      age:            plot.age.clone(),
      sex:            plot.sex.clone(),
      stratum:        plot.stratum.clone(),
      date_from:      plot.date_from_value(self.today),
      date_to:        plot.date_to_value(self.today),
      x_axis:         plot.x_axis_value(),
      permissions:    self.permissions.to_vec(),
      as_of:          None,
    }
  }

  /// Validate every plot, then assemble those with data in request order.
  /// Empty plots are dropped; if every plot is empty the request fails.
  pub async fn assemble(&self, plots: &[PlotParameters]) -> Result<Vec<PlotGenerationData>, ApiError> {
    let found = self.assemble_lenient(plots).await?;
    match (found.is_empty(), plots.len()) {
      (false, _) => Ok(found),
      (true, 1) => Err(Error::DataNotFoundForPlot.into()),
      (true, _) => Err(Error::DataNotFoundForAnyPlot.into()),
    }
  }

  /// As [`Self::assemble`], but an all-empty result is not an error.
  pub async fn assemble_lenient(&self, plots: &[PlotParameters]) -> Result<Vec<PlotGenerationData>, ApiError> {
    for plot in plots {
      self.validate(plot).await?;
    }
    let mut found = Vec::with_capacity(plots.len());
    for plot in plots {
      if let Some(data) = self.plot_data(plot).await? {
        found.push(data);
      }
    }
    Ok(found)
  }

  // ── Downloads ─────────────────────────────────────────────────────────

  /// Every visible row behind the time-series `plots`, merged without
  /// duplicates, newest first.
  pub async fn time_series_rows(&self, plots: &[PlotParameters]) -> Result<Vec<TimeSeriesRecord>, ApiError> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for plot in plots {
      self.check_topic(plot).await?;
      let found = self.store.download_time_series(&self.time_series_query(plot)).await.map_err(ApiError::store)?;
      rows.extend(found.into_iter().filter(|r| seen.insert(r.id)));
    }
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    Ok(rows)
  }

  /// The latest headline of each plot, in plot order. Plots with no
  /// visible headline are skipped.
  pub async fn headline_rows(&self, plots: &[PlotParameters]) -> Result<Vec<HeadlineRecord>, ApiError> {
    let mut rows = Vec::with_capacity(plots.len());
    for plot in plots {
      self.check_topic(plot).await?;
      if let Some(row) = self.store.latest_headline(&self.headline_query(plot)).await.map_err(ApiError::store)? {
        rows.push(row);
      }
    }
    Ok(rows)
  }
}
