use std::fmt;

use serde::{Deserialize, Serialize};

/// One (account, region) deployment destination.
///
/// Targets order by account id, then region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
  pub account_id: String,
  pub region: String,
  pub account_logical_id: String,
}

impl Target {
  pub fn new(
    account_id: impl Into<String>,
    region: impl Into<String>,
    account_logical_id: impl Into<String>,
  ) -> Self {
    Self {
      account_id: account_id.into(),
      region: region.into(),
      account_logical_id: account_logical_id.into(),
    }
  }

  /// Key used in persisted state: `account_id/region`.
  pub fn key(&self) -> String {
    target_key(&self.account_id, &self.region)
  }
}

/// Build the `account_id/region` key for a target.
pub fn target_key(account_id: &str, region: &str) -> String {
  format!("{}/{}", account_id, region)
}

impl fmt::Display for Target {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "account {} ({}) in {}",
      self.account_logical_id, self.account_id, self.region
    )
  }
}
