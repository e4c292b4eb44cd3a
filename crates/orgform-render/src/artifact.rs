use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A cross-target value import: output `output` of `unit` deployed at
/// `account_id`/`region`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportRef {
  pub unit: String,
  pub account_id: String,
  pub region: String,
  pub output: String,
}

impl fmt::Display for ImportRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}.{} ({}/{})",
      self.unit, self.output, self.account_id, self.region
    )
  }
}

/// A unit rendered for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedArtifact {
  /// Rendered template (stacks) or plugin configuration.
  pub body: serde_json::Value,
  /// Stack parameters, coerced to strings.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub parameters: BTreeMap<String, String>,
  /// Imports the render performed.
  #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
  pub imports: BTreeSet<ImportRef>,
}

impl RenderedArtifact {
  pub fn new(body: serde_json::Value) -> Self {
    Self {
      body,
      parameters: BTreeMap::new(),
      imports: BTreeSet::new(),
    }
  }

  /// The artifact text handed to the deployment backend.
  pub fn text(&self) -> String {
    serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| self.body.to_string())
  }

  /// Content digest over the body and parameters.
  pub fn digest(&self) -> String {
    let canonical = serde_json::json!({
      "body": self.body,
      "parameters": self.parameters,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    format!("sha256:{:x}", hasher.finalize())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_digest_is_stable_and_content_sensitive() {
    let mut a = RenderedArtifact::new(json!({ "Resources": { "B": 1, "A": 2 } }));
    let b = RenderedArtifact::new(json!({ "Resources": { "A": 2, "B": 1 } }));

    assert_eq!(a.digest(), b.digest());
    assert!(a.digest().starts_with("sha256:"));

    a.parameters.insert("p".to_string(), "1".to_string());
    assert_ne!(a.digest(), b.digest());
  }

  #[test]
  fn test_digest_ignores_imports() {
    let a = RenderedArtifact::new(json!({}));
    let mut b = a.clone();
    b.imports.insert(ImportRef {
      unit: "u".to_string(),
      account_id: "1".to_string(),
      region: "r".to_string(),
      output: "o".to_string(),
    });

    assert_eq!(a.digest(), b.digest());
  }
}
