//! Dynamic `WHERE` clause assembly.
//!
//! Every bound value is text: names, `YYYY-MM-DD` dates and fixed-width
//! RFC 3339 timestamps all compare correctly as strings.

use epi_core::rbac::{PermissionField, PermissionFilter, RbacPermission};

#[derive(Debug, Default)]
pub struct Filter {
  conds:  Vec<String>,
  params: Vec<String>,
}

impl Filter {
  pub fn new() -> Self { Self::default() }

  /// `column = ?`, always applied.
  pub fn eq(&mut self, column: &str, value: impl Into<String>) -> &mut Self {
    self.conds.push(format!("{column} = ?"));
    self.params.push(value.into());
    self
  }

  /// `column = ?` when `value` is set; no-op otherwise.
  pub fn eq_opt(&mut self, column: &str, value: Option<&str>) -> &mut Self {
    if let Some(v) = value {
      self.eq(column, v);
    }
    self
  }

  pub fn between(&mut self, column: &str, from: String, to: String) -> &mut Self {
    self.conds.push(format!("{column} BETWEEN ? AND ?"));
    self.params.push(from);
    self.params.push(to);
    self
  }

  /// Hide rows still under embargo at `now`.
  pub fn not_embargoed(&mut self, column: &str, now: String) -> &mut Self {
    self.conds.push(format!("({column} IS NULL OR {column} <= ?)"));
    self.params.push(now);
    self
  }

  /// Public rows, or rows some permission authorises.
  pub fn visible(
    &mut self,
    is_public_column: &str,
    permissions: &[RbacPermission],
    column: impl Fn(PermissionField) -> &'static str,
  ) -> &mut Self {
    let permitted = PermissionFilter::build(permissions, column);
    self.conds.push(format!("({is_public_column} = 1 OR {})", permitted.sql));
    self.params.extend(permitted.params);
    self
  }

  pub fn where_clause(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }

  pub fn params(&self) -> Vec<String> { self.params.clone() }
}

/// Columns of the joined dimension tables in fact queries.
pub fn joined_column(field: PermissionField) -> &'static str {
  match field {
    PermissionField::Theme => "th.name",
    PermissionField::SubTheme => "sth.name",
    PermissionField::Topic => "tp.name",
    PermissionField::Metric => "m.name",
    PermissionField::GeographyType => "gt.name",
    PermissionField::Geography => "g.name",
  }
}

/// Columns of the flat `api_time_series` table.
pub fn flat_column(field: PermissionField) -> &'static str {
  match field {
    PermissionField::Theme => "a.theme",
    PermissionField::SubTheme => "a.sub_theme",
    PermissionField::Topic => "a.topic",
    PermissionField::Metric => "a.metric",
    PermissionField::GeographyType => "a.geography_type",
    PermissionField::Geography => "a.geography",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builds_where_clause_in_order() {
    let mut f = Filter::new();
    f.eq("tp.name", "COVID-19")
      .eq_opt("g.name", None)
      .eq_opt("gt.name", Some("Nation"))
      .not_embargoed("ts.embargo", "2024-01-01T00:00:00.000000Z".into())
      .visible("ts.is_public", &[], joined_column);
    assert_eq!(
      f.where_clause(),
      "WHERE tp.name = ? AND gt.name = ? AND (ts.embargo IS NULL OR ts.embargo <= ?) \
       AND (ts.is_public = 1 OR 0)"
    );
    assert_eq!(f.params().len(), 3);
  }
}
