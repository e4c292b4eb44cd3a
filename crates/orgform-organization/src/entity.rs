use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role name assumed when an account does not declare one.
pub const DEFAULT_ACCESS_ROLE_NAME: &str = "OrganizationAccountAccessRole";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  #[default]
  Account,
  OrganizationalUnit,
  MasterAccount,
}

/// An account, organizational unit or the master account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationEntity {
  pub logical_id: String,
  /// Cloud account id; absent until the entity is bound.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub physical_id: Option<String>,
  #[serde(default)]
  pub kind: EntityKind,
  #[serde(default)]
  pub account_name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub root_email: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub alias: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub tags: BTreeMap<String, String>,
  #[serde(default = "default_role_name")]
  pub organization_access_role_name: String,
  #[serde(default = "default_role_name")]
  pub build_access_role_name: String,
  /// Member account logical ids (organizational units only).
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub accounts: Vec<String>,
}

fn default_role_name() -> String {
  DEFAULT_ACCESS_ROLE_NAME.to_string()
}

/// Outcome of looking up an attribute by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeLookup {
  Value(String),
  /// The attribute is known but has no value for this entity.
  Missing,
  /// The attribute name is not an organization attribute.
  Unknown,
}

impl OrganizationEntity {
  pub fn new(logical_id: impl Into<String>, kind: EntityKind) -> Self {
    Self {
      logical_id: logical_id.into(),
      physical_id: None,
      kind,
      account_name: String::new(),
      root_email: None,
      alias: None,
      tags: BTreeMap::new(),
      organization_access_role_name: default_role_name(),
      build_access_role_name: default_role_name(),
      accounts: Vec::new(),
    }
  }

  pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
    self.physical_id = Some(physical_id.into());
    self
  }

  pub fn with_account_name(mut self, name: impl Into<String>) -> Self {
    self.account_name = name.into();
    self
  }

  pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
    self.alias = Some(alias.into());
    self
  }

  pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.tags.insert(key.into(), value.into());
    self
  }

  pub fn is_account(&self) -> bool {
    matches!(self.kind, EntityKind::Account | EntityKind::MasterAccount)
  }

  /// True when every pair of `selector` is present in the entity's tags.
  pub fn matches_tags(&self, selector: &BTreeMap<String, String>) -> bool {
    selector
      .iter()
      .all(|(key, value)| self.tags.get(key) == Some(value))
  }

  /// Look up an attribute such as `AccountName`, `Alias` or `Tags.env`.
  pub fn attribute(&self, name: &str) -> AttributeLookup {
    let value = match name {
      "AccountName" => Some(self.account_name.as_str()).filter(|n| !n.is_empty()),
      "AccountId" => self.physical_id.as_deref(),
      "RootEmail" => self.root_email.as_deref(),
      "Alias" => self.alias.as_deref(),
      "OrganizationAccessRoleName" => Some(self.organization_access_role_name.as_str()),
      "BuildAccessRoleName" => Some(self.build_access_role_name.as_str()),
      _ => match name.strip_prefix("Tags.") {
        Some(key) => self.tags.get(key).map(String::as_str),
        None => return AttributeLookup::Unknown,
      },
    };

    match value {
      Some(v) => AttributeLookup::Value(v.to_string()),
      None => AttributeLookup::Missing,
    }
  }
}
