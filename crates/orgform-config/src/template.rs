use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::unit::{UnitDef, UnitKind};

/// A deployment template: the ordered list of units to deploy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateDef {
  #[serde(default)]
  pub units: Vec<UnitDef>,
}

impl TemplateDef {
  /// Parse and validate a template from JSON text.
  pub fn parse(text: &str) -> Result<Self, ConfigError> {
    let template: TemplateDef = serde_json::from_str(text)?;
    template.validate()?;
    Ok(template)
  }

  /// Check unit names and plugin declarations.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, unit) in self.units.iter().enumerate() {
      if unit.name.trim().is_empty() {
        return Err(ConfigError::EmptyUnitName { index });
      }
      if !seen.insert(unit.name.as_str()) {
        return Err(ConfigError::DuplicateUnit {
          name: unit.name.clone(),
        });
      }
      if let UnitKind::Plugin { plugin, .. } = &unit.kind
        && plugin.trim().is_empty()
      {
        return Err(ConfigError::MissingPlugin {
          name: unit.name.clone(),
        });
      }
    }
    Ok(())
  }

  pub fn unit(&self, name: &str) -> Option<&UnitDef> {
    self.units.iter().find(|u| u.name == name)
  }

  pub fn unit_names(&self) -> impl Iterator<Item = &str> {
    self.units.iter().map(|u| u.name.as_str())
  }
}
