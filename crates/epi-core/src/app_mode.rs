use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Which role this process plays. Decides the mounted routes and which
/// dependencies the internal health check covers.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AppMode {
  #[default]
  PrivateApi,
  PublicApi,
  CmsAdmin,
  Ingestion,
  FeedbackApi,
}

impl AppMode {
  pub fn requires_database(self) -> bool { !matches!(self, AppMode::FeedbackApi) }

  pub fn requires_cache(self) -> bool { matches!(self, AppMode::PrivateApi) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn dependency_table() {
    let table = [
      (AppMode::PrivateApi, true, true),
      (AppMode::PublicApi, true, false),
      (AppMode::CmsAdmin, true, false),
      (AppMode::Ingestion, true, false),
      (AppMode::FeedbackApi, false, false),
    ];
    for (mode, db, cache) in table {
      assert_eq!(mode.requires_database(), db, "{mode}");
      assert_eq!(mode.requires_cache(), cache, "{mode}");
    }
  }

  #[test]
  fn parses_env_form() {
    assert_eq!("CMS_ADMIN".parse::<AppMode>().unwrap(), AppMode::CmsAdmin);
    assert_eq!(AppMode::PrivateApi.to_string(), "PRIVATE_API");
  }
}
