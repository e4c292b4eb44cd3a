use std::collections::HashSet;

use crate::entity::{EntityKind, OrganizationEntity};
use crate::error::OrganizationError;

/// Pseudo identifiers that denote the account of the target being rendered.
pub const CURRENT_ACCOUNT_IDS: [&str; 2] = ["CurrentAccount", "AWSAccount"];

/// The accounts and organizational units a template is deployed into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Organization {
  master_account: Option<OrganizationEntity>,
  accounts: Vec<OrganizationEntity>,
  organizational_units: Vec<OrganizationEntity>,
}

impl Organization {
  /// Build an organization, fixing entity kinds and checking references.
  pub fn new(
    master_account: Option<OrganizationEntity>,
    accounts: Vec<OrganizationEntity>,
    organizational_units: Vec<OrganizationEntity>,
  ) -> Result<Self, OrganizationError> {
    let master_account = master_account.map(|mut m| {
      m.kind = EntityKind::MasterAccount;
      m
    });
    let accounts: Vec<_> = accounts
      .into_iter()
      .map(|mut a| {
        a.kind = EntityKind::Account;
        a
      })
      .collect();
    let organizational_units: Vec<_> = organizational_units
      .into_iter()
      .map(|mut ou| {
        ou.kind = EntityKind::OrganizationalUnit;
        ou
      })
      .collect();

    let mut seen = HashSet::new();
    let all = master_account
      .iter()
      .chain(accounts.iter())
      .chain(organizational_units.iter());
    for entity in all {
      if !seen.insert(entity.logical_id.as_str()) {
        return Err(OrganizationError::DuplicateLogicalId {
          logical_id: entity.logical_id.clone(),
        });
      }
    }

    let account_ids: HashSet<&str> = master_account
      .iter()
      .chain(accounts.iter())
      .map(|a| a.logical_id.as_str())
      .collect();
    for ou in &organizational_units {
      if let Some(missing) = ou.accounts.iter().find(|a| !account_ids.contains(a.as_str())) {
        return Err(OrganizationError::UnknownMember {
          unit: ou.logical_id.clone(),
          account: missing.clone(),
        });
      }
    }

    Ok(Self {
      master_account,
      accounts,
      organizational_units,
    })
  }

  pub fn master_account(&self) -> Option<&OrganizationEntity> {
    self.master_account.as_ref()
  }

  /// Member accounts, excluding the master account.
  pub fn accounts(&self) -> &[OrganizationEntity] {
    &self.accounts
  }

  pub fn organizational_units(&self) -> &[OrganizationEntity] {
    &self.organizational_units
  }

  /// Every entity: master account, accounts, then organizational units.
  pub fn entities(&self) -> impl Iterator<Item = &OrganizationEntity> {
    self
      .master_account
      .iter()
      .chain(self.accounts.iter())
      .chain(self.organizational_units.iter())
  }

  /// Look up any entity by logical id.
  pub fn get(&self, logical_id: &str) -> Option<&OrganizationEntity> {
    self.entities().find(|e| e.logical_id == logical_id)
  }

  /// Look up an account (master included) by its physical id.
  pub fn find_account_by_physical_id(&self, physical_id: &str) -> Option<&OrganizationEntity> {
    self
      .master_account
      .iter()
      .chain(self.accounts.iter())
      .find(|e| e.physical_id.as_deref() == Some(physical_id))
  }

  pub fn is_current_account_id(id: &str) -> bool {
    CURRENT_ACCOUNT_IDS.contains(&id)
  }

  /// Fill physical ids of unbound entities from `lookup` (keyed by logical id).
  pub fn bind_physical_ids<F>(&mut self, lookup: F)
  where
    F: Fn(&str) -> Option<String>,
  {
    let entities = self
      .master_account
      .iter_mut()
      .chain(self.accounts.iter_mut())
      .chain(self.organizational_units.iter_mut());
    for entity in entities {
      if entity.physical_id.is_none() {
        entity.physical_id = lookup(&entity.logical_id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn organization() -> Organization {
    Organization::new(
      Some(OrganizationEntity::new("Master", EntityKind::Account).with_physical_id("1000")),
      vec![
        OrganizationEntity::new("Dev", EntityKind::Account).with_physical_id("2000"),
        OrganizationEntity::new("Prod", EntityKind::Account),
      ],
      vec![{
        let mut ou = OrganizationEntity::new("Workloads", EntityKind::Account);
        ou.accounts = vec!["Dev".to_string(), "Prod".to_string()];
        ou
      }],
    )
    .unwrap()
  }

  #[test]
  fn test_kinds_are_normalized() {
    let org = organization();

    assert_eq!(org.master_account().unwrap().kind, EntityKind::MasterAccount);
    assert_eq!(org.get("Dev").unwrap().kind, EntityKind::Account);
    assert_eq!(
      org.get("Workloads").unwrap().kind,
      EntityKind::OrganizationalUnit
    );
    assert_eq!(org.entities().count(), 4);
  }

  #[test]
  fn test_find_by_physical_id() {
    let org = organization();

    assert_eq!(
      org.find_account_by_physical_id("1000").unwrap().logical_id,
      "Master"
    );
    assert!(org.find_account_by_physical_id("9999").is_none());
  }

  #[test]
  fn test_bind_physical_ids_only_fills_unbound() {
    let mut org = organization();
    org.bind_physical_ids(|logical_id| Some(format!("bound-{}", logical_id)));

    assert_eq!(org.get("Dev").unwrap().physical_id.as_deref(), Some("2000"));
    assert_eq!(
      org.get("Prod").unwrap().physical_id.as_deref(),
      Some("bound-Prod")
    );
  }

  #[test]
  fn test_duplicate_logical_id() {
    let result = Organization::new(
      None,
      vec![
        OrganizationEntity::new("Dev", EntityKind::Account),
        OrganizationEntity::new("Dev", EntityKind::Account),
      ],
      vec![],
    );

    assert!(matches!(
      result,
      Err(OrganizationError::DuplicateLogicalId { logical_id }) if logical_id == "Dev"
    ));
  }

  #[test]
  fn test_unknown_ou_member() {
    let mut ou = OrganizationEntity::new("Workloads", EntityKind::OrganizationalUnit);
    ou.accounts = vec!["Ghost".to_string()];

    let result = Organization::new(None, vec![], vec![ou]);
    assert!(matches!(result, Err(OrganizationError::UnknownMember { .. })));
  }

  #[test]
  fn test_current_account_ids() {
    assert!(Organization::is_current_account_id("CurrentAccount"));
    assert!(Organization::is_current_account_id("AWSAccount"));
    assert!(!Organization::is_current_account_id("Dev"));
  }
}
