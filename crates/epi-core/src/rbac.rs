//! Role-based access control over dimension tuples.
//!
//! A [`RbacPermission`] names a subset of the dimension hierarchy. Any field
//! left as `None` is a wildcard at that level. Permissions are evaluated in
//! two places:
//!
//! - the store turns a permission set into an OR-of-AND SQL predicate (see
//!   [`PermissionFilter`]) so that non-public rows are only read when some
//!   permission covers them;
//! - serializers call [`any_permission_allows`] per row before emitting it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{ApiTimeSeriesRecord, HeadlineRecord, TimeSeriesRecord};

// ─── Permission ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RbacPermission {
  pub name:           String,
  pub theme:          Option<String>,
  pub sub_theme:      Option<String>,
  pub topic:          Option<String>,
  pub metric:         Option<String>,
  pub geography_type: Option<String>,
  pub geography:      Option<String>,
}

impl RbacPermission {
  /// The dimension fields in hierarchy order. Used for both evaluation and
  /// predicate building.
  pub fn fields(&self) -> [(PermissionField, Option<&str>); 6] {
    [
      (PermissionField::Theme, self.theme.as_deref()),
      (PermissionField::SubTheme, self.sub_theme.as_deref()),
      (PermissionField::Topic, self.topic.as_deref()),
      (PermissionField::Metric, self.metric.as_deref()),
      (PermissionField::GeographyType, self.geography_type.as_deref()),
      (PermissionField::Geography, self.geography.as_deref()),
    ]
  }

  /// True when every dimension field is a wildcard.
  pub fn is_blanket(&self) -> bool { self.fields().iter().all(|(_, v)| v.is_none()) }

  /// Two permissions are duplicates when their dimension tuples are equal,
  /// regardless of name.
  pub fn same_tuple(&self, other: &RbacPermission) -> bool { self.fields() == other.fields() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionField {
  Theme,
  SubTheme,
  Topic,
  Metric,
  GeographyType,
  Geography,
}

impl PermissionField {
  pub fn as_str(self) -> &'static str {
    match self {
      PermissionField::Theme => "theme",
      PermissionField::SubTheme => "sub_theme",
      PermissionField::Topic => "topic",
      PermissionField::Metric => "metric",
      PermissionField::GeographyType => "geography_type",
      PermissionField::Geography => "geography",
    }
  }
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// The identifying tuple of a record (or of a fully-specified query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest<'a> {
  pub theme:          &'a str,
  pub sub_theme:      &'a str,
  pub topic:          &'a str,
  pub metric:         &'a str,
  pub geography_type: &'a str,
  pub geography:      &'a str,
  pub age:            &'a str,
  pub stratum:        &'a str,
}

impl AccessRequest<'_> {
  fn field(&self, field: PermissionField) -> &str {
    match field {
      PermissionField::Theme => self.theme,
      PermissionField::SubTheme => self.sub_theme,
      PermissionField::Topic => self.topic,
      PermissionField::Metric => self.metric,
      PermissionField::GeographyType => self.geography_type,
      PermissionField::Geography => self.geography,
    }
  }
}

/// A record that carries its own identifying tuple and public flag.
pub trait Restricted {
  fn access_request(&self) -> AccessRequest<'_>;
  fn is_public(&self) -> bool;
}

macro_rules! restricted_record {
  ($record:ty) => {
    impl Restricted for $record {
      fn access_request(&self) -> AccessRequest<'_> {
        AccessRequest {
          theme:          &self.theme,
          sub_theme:      &self.sub_theme,
          topic:          &self.topic,
          metric:         &self.metric,
          geography_type: &self.geography_type,
          geography:      &self.geography,
          age:            &self.age,
          stratum:        &self.stratum,
        }
      }

      fn is_public(&self) -> bool { self.is_public }
    }
  };
}

restricted_record!(TimeSeriesRecord);
restricted_record!(HeadlineRecord);
restricted_record!(ApiTimeSeriesRecord);

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Every non-wildcard field on `permission` must equal the request's value.
pub fn permission_allows(permission: &RbacPermission, request: &AccessRequest<'_>) -> bool {
  permission
    .fields()
    .iter()
    .all(|(field, value)| value.is_none_or(|v| v == request.field(*field)))
}

pub fn any_permission_allows(permissions: &[RbacPermission], request: &AccessRequest<'_>) -> bool {
  permissions.iter().any(|p| permission_allows(p, request))
}

/// Serializer-side filter: keep public records, and non-public records that
/// some permission authorises.
pub fn filter_visible<R: Restricted>(records: Vec<R>, permissions: &[RbacPermission]) -> Vec<R> {
  records
    .into_iter()
    .filter(|r| r.is_public() || any_permission_allows(permissions, &r.access_request()))
    .collect()
}

// ─── SQL predicate ───────────────────────────────────────────────────────────

/// An OR-of-AND predicate authorising every row some permission covers.
///
/// Column names are supplied by the caller so the same filter can target
/// joined dimension tables or the flat public table.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionFilter {
  pub sql:    String,
  pub params: Vec<String>,
}

impl PermissionFilter {
  /// Build the predicate. `column` maps a field to its qualified column.
  /// An empty permission set yields `0` (nothing is authorised); a
  /// permission whose fields are all wildcards yields `1`.
  pub fn build(permissions: &[RbacPermission], column: impl Fn(PermissionField) -> &'static str) -> Self {
    if permissions.is_empty() {
      return Self { sql: "0".into(), params: vec![] };
    }

    let mut params = Vec::new();
    let clauses: Vec<String> = permissions
      .iter()
      .map(|p| {
        let conds: Vec<String> = p
          .fields()
          .iter()
          .filter_map(|(field, value)| {
            value.map(|v| {
              params.push(v.to_owned());
              format!("{} = ?", column(*field))
            })
          })
          .collect();
        if conds.is_empty() { "1".to_owned() } else { format!("({})", conds.join(" AND ")) }
      })
      .collect();

    Self { sql: format!("({})", clauses.join(" OR ")), params }
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionError {
  #[error("You must select a theme.")]
  ThemeRequired,

  #[error("You must select a valid subtheme that belongs to the selected theme.")]
  SubThemeNotInTheme,

  #[error("The selected topic's subtheme must have an associated theme.")]
  TopicNotInTheme,

  #[error("The selected subtheme must have an associated topic.")]
  TopicNotInSubTheme,

  #[error("The selected metric must belong to the selected topic.")]
  MetricNotInTopic,

  #[error("The selected geography must belong to the selected geography type.")]
  GeographyNotInGeographyType,

  #[error("A permission with these values already exists.")]
  Duplicate,
}

/// The actual parents of the dimensions a candidate permission names, as
/// found in the dimension tables. `None` means the child was not named or
/// does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionLineage {
  pub sub_theme_theme:          Option<String>,
  pub topic_sub_theme:          Option<String>,
  pub topic_theme:              Option<String>,
  pub metric_topic:             Option<String>,
  pub geography_geography_type: Option<String>,
}

/// Check a permission before it is persisted.
///
/// The theme is mandatory, which also rules out a blanket wildcard. Any
/// populated parent/child pair must agree with `lineage`. A permission whose
/// tuple matches one in `existing` is rejected.
pub fn validate_permission(
  candidate: &RbacPermission,
  lineage: &PermissionLineage,
  existing: &[RbacPermission],
) -> Result<(), PermissionError> {
  let Some(theme) = candidate.theme.as_deref() else {
    return Err(PermissionError::ThemeRequired);
  };

  if candidate.sub_theme.is_some() && lineage.sub_theme_theme.as_deref() != Some(theme) {
    return Err(PermissionError::SubThemeNotInTheme);
  }

  if candidate.topic.is_some() {
    if lineage.topic_theme.as_deref() != Some(theme) {
      return Err(PermissionError::TopicNotInTheme);
    }
    if let Some(sub_theme) = candidate.sub_theme.as_deref()
      && lineage.topic_sub_theme.as_deref() != Some(sub_theme)
    {
      return Err(PermissionError::TopicNotInSubTheme);
    }
  }

  if candidate.metric.is_some()
    && let Some(topic) = candidate.topic.as_deref()
    && lineage.metric_topic.as_deref() != Some(topic)
  {
    return Err(PermissionError::MetricNotInTopic);
  }

  if candidate.geography.is_some()
    && let Some(geography_type) = candidate.geography_type.as_deref()
    && lineage.geography_geography_type.as_deref() != Some(geography_type)
  {
    return Err(PermissionError::GeographyNotInGeographyType);
  }

  if existing.iter().any(|p| p.same_tuple(candidate)) {
    return Err(PermissionError::Duplicate);
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn theme_only(theme: &str) -> RbacPermission {
    RbacPermission {
      name: format!("{theme}-all"),
      theme: Some(theme.into()),
      ..Default::default()
    }
  }

  fn covid_request(theme: &str) -> AccessRequest<'_> {
    AccessRequest {
      theme,
      sub_theme: "respiratory",
      topic: "COVID-19",
      metric: "COVID-19_cases_casesByDay",
      geography_type: "Nation",
      geography: "England",
      age: "all",
      stratum: "default",
    }
  }

  #[test]
  fn wildcard_fields_match_anything() {
    let permission = theme_only("infectious_disease");
    assert!(permission_allows(&permission, &covid_request("infectious_disease")));
    assert!(!permission_allows(&permission, &covid_request("extreme_event")));
  }

  #[test]
  fn every_populated_field_must_match() {
    let permission = RbacPermission {
      name: "covid-england".into(),
      theme: Some("infectious_disease".into()),
      topic: Some("COVID-19".into()),
      geography: Some("Wales".into()),
      ..Default::default()
    };
    assert!(!permission_allows(&permission, &covid_request("infectious_disease")));
  }

  #[test]
  fn adding_permissions_never_hides_rows() {
    let request = covid_request("infectious_disease");
    let mut permissions = vec![];
    let mut previously_allowed = any_permission_allows(&permissions, &request);
    assert!(!previously_allowed);

    for p in [
      theme_only("extreme_event"),
      theme_only("infectious_disease"),
      RbacPermission { name: "x".into(), theme: Some("other".into()), ..Default::default() },
    ] {
      permissions.push(p);
      let allowed = any_permission_allows(&permissions, &request);
      assert!(allowed || !previously_allowed);
      previously_allowed = allowed;
    }
    assert!(previously_allowed);
  }

  #[test]
  fn predicate_is_or_of_and() {
    let permissions = vec![
      theme_only("infectious_disease"),
      RbacPermission {
        name: "heat".into(),
        theme: Some("climate".into()),
        topic: Some("Heat-alert".into()),
        ..Default::default()
      },
    ];
    let filter = PermissionFilter::build(&permissions, |f| match f {
      PermissionField::Theme => "t.name",
      PermissionField::Topic => "tp.name",
      _ => "x",
    });
    assert_eq!(filter.sql, "((t.name = ?) OR (t.name = ? AND tp.name = ?))");
    assert_eq!(filter.params, vec!["infectious_disease", "climate", "Heat-alert"]);

    let none = PermissionFilter::build(&[], |_| "x");
    assert_eq!(none.sql, "0");
  }

  #[test]
  fn validation_rejects_missing_theme_and_bad_chains() {
    let lineage = PermissionLineage {
      sub_theme_theme: Some("infectious_disease".into()),
      topic_sub_theme: Some("respiratory".into()),
      topic_theme: Some("infectious_disease".into()),
      ..Default::default()
    };

    let blanket = RbacPermission { name: "all".into(), ..Default::default() };
    assert_eq!(
      validate_permission(&blanket, &lineage, &[]),
      Err(PermissionError::ThemeRequired)
    );

    let wrong_theme = RbacPermission {
      name: "bad".into(),
      theme: Some("extreme_event".into()),
      sub_theme: Some("respiratory".into()),
      ..Default::default()
    };
    assert_eq!(
      validate_permission(&wrong_theme, &lineage, &[]),
      Err(PermissionError::SubThemeNotInTheme)
    );

    let wrong_sub_theme = RbacPermission {
      name: "bad".into(),
      theme: Some("infectious_disease".into()),
      sub_theme: Some("respiratory".into()),
      topic: Some("COVID-19".into()),
      ..Default::default()
    };
    let lineage_other_sub = PermissionLineage {
      topic_sub_theme: Some("vaccine_preventable".into()),
      ..lineage.clone()
    };
    assert_eq!(
      validate_permission(&wrong_sub_theme, &lineage_other_sub, &[]),
      Err(PermissionError::TopicNotInSubTheme)
    );
    assert_eq!(validate_permission(&wrong_sub_theme, &lineage, &[]), Ok(()));
  }

  #[test]
  fn validation_rejects_duplicate_tuple() {
    let existing = theme_only("infectious_disease");
    let candidate = RbacPermission { name: "another-name".into(), ..existing.clone() };
    assert_eq!(
      validate_permission(&candidate, &PermissionLineage::default(), &[existing]),
      Err(PermissionError::Duplicate)
    );
  }
}
