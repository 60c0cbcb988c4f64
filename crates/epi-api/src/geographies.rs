//! `GET /api/geographies/v2/{topic}`: the geographies holding time-series
//! data for a topic, grouped by geography type.

use axum::{
  extract::State,
  response::{IntoResponse, Response},
};
use epi_core::{
  Error,
  store::{GeographySummary, MetricsStore},
};
use serde::{Deserialize, Serialize};

use crate::{
  ApiState,
  cache::{CacheKey, CachedResponse, cached},
  error::ApiError,
  extract::{ApiPath, CacheDirectives},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicPath {
  pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographyEntry {
  pub name:           String,
  pub geography_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeographyTypeGroup {
  pub geography_type: String,
  pub geographies:    Vec<GeographyEntry>,
}

/// Fold rows ordered by type then name into one group per type.
pub fn group_by_type(rows: Vec<GeographySummary>) -> Vec<GeographyTypeGroup> {
  let mut groups: Vec<GeographyTypeGroup> = Vec::new();
  for row in rows {
    let entry = GeographyEntry { name: row.geography, geography_code: row.geography_code };
    match groups.last_mut() {
      Some(group) if group.geography_type == row.geography_type => group.geographies.push(entry),
      _ => groups.push(GeographyTypeGroup { geography_type: row.geography_type, geographies: vec![entry] }),
    }
  }
  groups
}

pub async fn for_topic<S>(
  State(state): State<ApiState<S>>,
  directives: CacheDirectives,
  ApiPath(path): ApiPath<TopicPath>,
) -> Result<Response, ApiError>
where
  S: MetricsStore + 'static,
{
  let key = CacheKey::new("geographies/v2", &path, None)?;
  let (store, topic) = (state.store.as_ref(), path.topic.as_str());
  let response = cached(&state.cache, &key, directives, move || async move {
    if !store.topic_exists(topic).await.map_err(ApiError::store)? {
      return Err(Error::InvalidRequest(format!("Please enter a valid topic name, got `{topic}`")).into());
    }
    let rows = store.geographies_for_topic(topic).await.map_err(ApiError::store)?;
    CachedResponse::json(&group_by_type(rows))
  })
  .await?;
  Ok(response.into_response())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn summary(geography_type: &str, geography: &str) -> GeographySummary {
    GeographySummary { geography_type: geography_type.into(), geography: geography.into(), geography_code: None }
  }

  #[test]
  fn rows_fold_into_type_groups() {
    let groups = group_by_type(vec![
      summary("Lower Tier Local Authority", "Arun"),
      summary("Lower Tier Local Authority", "Bexley"),
      summary("Nation", "England"),
    ]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].geographies.iter().map(|g| g.name.as_str()).collect::<Vec<_>>(), ["Arun", "Bexley"]);
    assert_eq!(groups[1].geography_type, "Nation");
    assert!(group_by_type(vec![]).is_empty());
  }
}
