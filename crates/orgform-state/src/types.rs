use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use orgform_config::UnitDef;
use orgform_organization::{EntityKind, Organization, Target, target_key};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Physical identity of an organization entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierBinding {
  pub kind: EntityKind,
  pub physical_id: String,
}

/// What was last deployed for one unit at one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
  pub last_committed_hash: String,
  pub account_id: String,
  pub region: String,
  pub account_logical_id: String,
  /// Outputs exposed by the deployment, available to cross-target imports.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub outputs: BTreeMap<String, String>,
  pub deployed_at: DateTime<Utc>,
}

impl DeploymentRecord {
  pub fn target(&self) -> Target {
    Target::new(&self.account_id, &self.region, &self.account_logical_id)
  }

  pub fn key(&self) -> String {
    target_key(&self.account_id, &self.region)
  }
}

/// The durable record of prior deployments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub master_account_id: Option<String>,
  #[serde(default)]
  bindings: BTreeMap<String, IdentifierBinding>,
  /// unit name -> target key -> record
  #[serde(default)]
  deployments: BTreeMap<String, BTreeMap<String, DeploymentRecord>>,
  /// Last applied definition of every unit with deployment records.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  definitions: BTreeMap<String, UnitDef>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  previous_template: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub committed_at: Option<DateTime<Utc>>,
}

impl PersistedState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn binding(&self, logical_id: &str) -> Option<&IdentifierBinding> {
    self.bindings.get(logical_id)
  }

  pub fn physical_id(&self, logical_id: &str) -> Option<&str> {
    self.bindings.get(logical_id).map(|b| b.physical_id.as_str())
  }

  pub fn bindings(&self) -> impl Iterator<Item = (&str, &IdentifierBinding)> {
    self.bindings.iter().map(|(k, v)| (k.as_str(), v))
  }

  /// Record a binding. Existing bindings are never replaced; a conflicting
  /// binding is rejected and `false` returned.
  pub fn set_binding(
    &mut self,
    logical_id: impl Into<String>,
    kind: EntityKind,
    physical_id: impl Into<String>,
  ) -> bool {
    let logical_id = logical_id.into();
    let physical_id = physical_id.into();
    match self.bindings.get(&logical_id) {
      Some(existing) if existing.physical_id == physical_id => true,
      Some(existing) => {
        warn!(
          logical_id = %logical_id,
          bound = %existing.physical_id,
          rejected = %physical_id,
          "binding_conflict"
        );
        false
      }
      None => {
        self
          .bindings
          .insert(logical_id, IdentifierBinding { kind, physical_id });
        true
      }
    }
  }

  /// Exchange identities with the organization: entities with a physical id
  /// are recorded as bindings, unbound entities pick up recorded bindings.
  pub fn bind_organization(&mut self, organization: &mut Organization) {
    organization.bind_physical_ids(|logical_id| self.physical_id(logical_id).map(str::to_string));

    for entity in organization.entities() {
      if let Some(physical_id) = &entity.physical_id {
        self.set_binding(&entity.logical_id, entity.kind, physical_id);
      }
    }

    if let Some(master_id) = organization
      .master_account()
      .and_then(|m| m.physical_id.clone())
    {
      self.master_account_id = Some(master_id);
    }
  }

  pub fn record(&self, unit: &str, account_id: &str, region: &str) -> Option<&DeploymentRecord> {
    self
      .deployments
      .get(unit)
      .and_then(|targets| targets.get(&target_key(account_id, region)))
  }

  /// Records of one unit ordered by target key.
  pub fn records(&self, unit: &str) -> impl Iterator<Item = &DeploymentRecord> {
    self.deployments.get(unit).into_iter().flat_map(|t| t.values())
  }

  /// Names of units that have at least one deployment record.
  pub fn unit_names(&self) -> impl Iterator<Item = &str> {
    self.deployments.keys().map(String::as_str)
  }

  pub fn set_record(&mut self, unit: impl Into<String>, record: DeploymentRecord) {
    self
      .deployments
      .entry(unit.into())
      .or_default()
      .insert(record.key(), record);
  }

  pub fn remove_record(
    &mut self,
    unit: &str,
    account_id: &str,
    region: &str,
  ) -> Option<DeploymentRecord> {
    let targets = self.deployments.get_mut(unit)?;
    let removed = targets.remove(&target_key(account_id, region));
    if targets.is_empty() {
      self.deployments.remove(unit);
      self.definitions.remove(unit);
    }
    removed
  }

  /// Definition the unit was last applied with.
  pub fn definition(&self, unit: &str) -> Option<&UnitDef> {
    self.definitions.get(unit)
  }

  pub fn set_definition(&mut self, unit: UnitDef) {
    self.definitions.insert(unit.name.clone(), unit);
  }

  /// Output `name` exposed by `unit` at the given target.
  pub fn output(&self, unit: &str, account_id: &str, region: &str, name: &str) -> Option<&str> {
    self
      .record(unit, account_id, region)
      .and_then(|r| r.outputs.get(name))
      .map(String::as_str)
  }

  pub fn previous_template(&self) -> Option<&str> {
    self.previous_template.as_deref()
  }

  pub fn set_previous_template(&mut self, template: impl Into<String>) {
    self.previous_template = Some(template.into());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use orgform_organization::OrganizationEntity;

  fn record(account_id: &str, region: &str) -> DeploymentRecord {
    DeploymentRecord {
      last_committed_hash: "sha256:abc".to_string(),
      account_id: account_id.to_string(),
      region: region.to_string(),
      account_logical_id: "Dev".to_string(),
      outputs: BTreeMap::from([("BucketArn".to_string(), "arn:bucket".to_string())]),
      deployed_at: Utc::now(),
    }
  }

  #[test]
  fn test_bindings_are_append_only() {
    let mut state = PersistedState::new();

    assert!(state.set_binding("Dev", EntityKind::Account, "111"));
    assert!(state.set_binding("Dev", EntityKind::Account, "111"));
    assert!(!state.set_binding("Dev", EntityKind::Account, "222"));
    assert_eq!(state.physical_id("Dev"), Some("111"));
  }

  #[test]
  fn test_record_lifecycle() {
    let mut state = PersistedState::new();
    state.set_record("bucket", record("111", "eu-west-1"));
    state.set_record("bucket", record("111", "us-east-1"));

    assert_eq!(state.records("bucket").count(), 2);
    assert_eq!(
      state.output("bucket", "111", "eu-west-1", "BucketArn"),
      Some("arn:bucket")
    );
    assert_eq!(state.output("bucket", "111", "eu-west-1", "Other"), None);

    assert!(state.remove_record("bucket", "111", "eu-west-1").is_some());
    assert_eq!(state.records("bucket").count(), 1);

    state.remove_record("bucket", "111", "us-east-1");
    assert_eq!(state.unit_names().count(), 0);
  }

  #[test]
  fn test_definition_follows_records() {
    let unit: UnitDef = serde_json::from_value(serde_json::json!({
      "name": "readme",
      "type": "plugin",
      "plugin": "copy-file",
      "organization_binding": { "accounts": ["Dev"], "regions": "eu-west-1" },
      "config": { "local_path": "README.md", "remote_path": "README.md" }
    }))
    .unwrap();

    let mut state = PersistedState::new();
    state.set_record("readme", record("111", "eu-west-1"));
    state.set_definition(unit.clone());
    assert_eq!(state.definition("readme"), Some(&unit));

    let back: PersistedState =
      serde_json::from_value(serde_json::to_value(&state).unwrap()).unwrap();
    assert_eq!(back.definition("readme"), Some(&unit));

    state.remove_record("readme", "111", "eu-west-1");
    assert!(state.definition("readme").is_none());
  }

  #[test]
  fn test_bind_organization() {
    let mut org = Organization::new(
      Some(OrganizationEntity::new("Master", EntityKind::Account).with_physical_id("1000")),
      vec![
        OrganizationEntity::new("Dev", EntityKind::Account).with_physical_id("2000"),
        OrganizationEntity::new("Prod", EntityKind::Account),
      ],
      vec![],
    )
    .unwrap();

    let mut state = PersistedState::new();
    state.set_binding("Prod", EntityKind::Account, "3000");
    state.bind_organization(&mut org);

    assert_eq!(state.master_account_id.as_deref(), Some("1000"));
    assert_eq!(state.physical_id("Dev"), Some("2000"));
    assert_eq!(
      state.binding("Master").unwrap().kind,
      EntityKind::MasterAccount
    );
    assert_eq!(org.get("Prod").unwrap().physical_id.as_deref(), Some("3000"));
  }

  #[test]
  fn test_serialized_layout() {
    let mut state = PersistedState::new();
    state.set_record("bucket", record("111", "eu-west-1"));
    state.set_previous_template("{}");

    let value = serde_json::to_value(&state).unwrap();
    assert_eq!(
      value["deployments"]["bucket"]["111/eu-west-1"]["outputs"]["BucketArn"],
      "arn:bucket"
    );
    assert_eq!(value["previous_template"], "{}");

    let back: PersistedState = serde_json::from_value(value).unwrap();
    assert_eq!(back, state);
  }
}
