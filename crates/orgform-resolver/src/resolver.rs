use std::collections::{BTreeMap, BTreeSet};

use orgform_config::{AccountSelection, AccountSelector, OrganizationBinding};
use orgform_organization::{EntityKind, Organization, OrganizationEntity, Target};
use tracing::warn;

use crate::error::ResolveError;

/// Resolves bindings against one organization.
pub struct BindingResolver<'a> {
  organization: &'a Organization,
  region_override: Option<&'a [String]>,
}

impl<'a> BindingResolver<'a> {
  pub fn new(organization: &'a Organization) -> Self {
    Self {
      organization,
      region_override: None,
    }
  }

  /// Replace the regions of every binding with `regions`.
  pub fn with_region_override(mut self, regions: Option<&'a [String]>) -> Self {
    self.region_override = regions;
    self
  }

  /// Expand `binding` into targets ordered by account id, then region.
  pub fn resolve(&self, binding: &OrganizationBinding) -> Result<Vec<Target>, ResolveError> {
    let regions = self.regions(binding)?;
    let mut accounts = self.select_accounts(binding)?;

    for logical_id in &binding.exclude_accounts {
      let entity = self.lookup(logical_id)?;
      for account in self.expand(entity)? {
        accounts.remove(account.logical_id.as_str());
      }
    }

    let mut targets: BTreeMap<(&str, &str), Target> = BTreeMap::new();
    for account in accounts.values() {
      let Some(account_id) = account.physical_id.as_deref() else {
        warn!(logical_id = %account.logical_id, "skipping_unbound_account");
        continue;
      };
      for region in &regions {
        targets
          .entry((account_id, region.as_str()))
          .or_insert_with(|| Target::new(account_id, region, &account.logical_id));
      }
    }

    Ok(targets.into_values().collect())
  }

  fn regions(&self, binding: &OrganizationBinding) -> Result<BTreeSet<String>, ResolveError> {
    let regions = match self.region_override {
      Some(regions) => regions,
      None => binding
        .regions
        .as_ref()
        .map(|r| r.as_slice())
        .unwrap_or_default(),
    };
    let regions: BTreeSet<String> = regions
      .iter()
      .filter(|r| !r.trim().is_empty())
      .cloned()
      .collect();

    if regions.is_empty() {
      return Err(ResolveError::MissingRegion);
    }
    Ok(regions)
  }

  fn select_accounts(
    &self,
    binding: &OrganizationBinding,
  ) -> Result<BTreeMap<&'a str, &'a OrganizationEntity>, ResolveError> {
    let mut selected = BTreeMap::new();

    match &binding.accounts {
      None => {}
      Some(AccountSelection::All) => {
        for account in self.organization.accounts() {
          selected.insert(account.logical_id.as_str(), account);
        }
      }
      Some(AccountSelection::List(selectors)) => {
        for selector in selectors {
          match selector {
            AccountSelector::LogicalId(logical_id) => {
              let entity = self.lookup(logical_id)?;
              for account in self.expand(entity)? {
                selected.insert(account.logical_id.as_str(), account);
              }
            }
            AccountSelector::Tags(tags) => {
              let matching = self
                .organization
                .master_account()
                .into_iter()
                .chain(self.organization.accounts())
                .filter(|a| a.matches_tags(tags));
              for account in matching {
                selected.insert(account.logical_id.as_str(), account);
              }
            }
          }
        }
      }
    }

    if binding.include_master_account {
      match self.organization.master_account() {
        Some(master) => {
          selected.insert(master.logical_id.as_str(), master);
        }
        None => warn!("binding_includes_master_account_but_none_is_known"),
      }
    }

    Ok(selected)
  }

  fn lookup(&self, logical_id: &str) -> Result<&'a OrganizationEntity, ResolveError> {
    self
      .organization
      .get(logical_id)
      .ok_or_else(|| ResolveError::UnresolvableAccount {
        logical_id: logical_id.to_string(),
      })
  }

  /// Accounts denoted by an entity: itself, or the members of an organizational unit.
  fn expand(
    &self,
    entity: &'a OrganizationEntity,
  ) -> Result<Vec<&'a OrganizationEntity>, ResolveError> {
    match entity.kind {
      EntityKind::OrganizationalUnit => entity
        .accounts
        .iter()
        .map(|member| self.lookup(member))
        .collect(),
      EntityKind::Account | EntityKind::MasterAccount => Ok(vec![entity]),
    }
  }
}
