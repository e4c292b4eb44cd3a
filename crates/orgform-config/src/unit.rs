use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::binding::OrganizationBinding;

/// One deployable declaration of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDef {
  pub name: String,
  pub organization_binding: OrganizationBinding,
  #[serde(flatten)]
  pub kind: UnitKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitKind {
  /// A template stack rendered per target and handed to the deployment backend.
  Stack {
    template: serde_json::Value,
    /// Stack parameters; values are coerced to strings when rendered.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    parameters: BTreeMap<String, serde_json::Value>,
  },
  /// A task executed by a registered plugin.
  Plugin {
    #[serde(default)]
    plugin: String,
    #[serde(default)]
    config: serde_json::Value,
  },
}

impl UnitDef {
  /// Name of the plugin running this unit, if it is a plugin unit.
  pub fn plugin(&self) -> Option<&str> {
    match &self.kind {
      UnitKind::Plugin { plugin, .. } => Some(plugin),
      UnitKind::Stack { .. } => None,
    }
  }
}
