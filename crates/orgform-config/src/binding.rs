use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Declarative selector that expands to a set of (account, region) targets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationBinding {
  /// Accounts to deploy to: `"*"`, a single logical id, or a list of selectors.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub accounts: Option<AccountSelection>,
  /// Logical ids removed from the selection after expansion.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub exclude_accounts: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub regions: Option<Regions>,
  /// Add the master account to the selection.
  #[serde(default)]
  pub include_master_account: bool,
}

/// Account part of a binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSelection", into = "RawSelection")]
pub enum AccountSelection {
  /// Every account of the organization except the master account.
  All,
  List(Vec<AccountSelector>),
}

/// A single account selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountSelector {
  /// Logical id of an account, the master account or an organizational unit.
  LogicalId(String),
  /// Tag equality selector; every pair must match.
  Tags(BTreeMap<String, String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSelection {
  Text(String),
  List(Vec<AccountSelector>),
}

impl From<RawSelection> for AccountSelection {
  fn from(raw: RawSelection) -> Self {
    match raw {
      RawSelection::Text(text) if text == "*" => AccountSelection::All,
      RawSelection::Text(text) => AccountSelection::List(vec![AccountSelector::LogicalId(text)]),
      RawSelection::List(selectors) => AccountSelection::List(selectors),
    }
  }
}

impl From<AccountSelection> for RawSelection {
  fn from(selection: AccountSelection) -> Self {
    match selection {
      AccountSelection::All => RawSelection::Text("*".to_string()),
      AccountSelection::List(selectors) => RawSelection::List(selectors),
    }
  }
}

/// Region list of a binding; a single string is accepted as a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawRegions", into = "RawRegions")]
pub struct Regions(Vec<String>);

impl Regions {
  pub fn new(regions: Vec<String>) -> Self {
    Self(regions)
  }

  pub fn as_slice(&self) -> &[String] {
    &self.0
  }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawRegions {
  One(String),
  Many(Vec<String>),
}

impl From<RawRegions> for Regions {
  fn from(raw: RawRegions) -> Self {
    match raw {
      RawRegions::One(region) => Regions(vec![region]),
      RawRegions::Many(regions) => Regions(regions),
    }
  }
}

impl From<Regions> for RawRegions {
  fn from(regions: Regions) -> Self {
    RawRegions::Many(regions.0)
  }
}
