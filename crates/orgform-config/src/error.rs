use thiserror::Error;

/// Errors raised while loading a deployment template.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The template is not valid JSON or does not match the template schema.
  #[error("invalid template: {0}")]
  Parse(#[from] serde_json::Error),

  /// A unit was declared without a name.
  #[error("unit at position {index} has an empty name")]
  EmptyUnitName { index: usize },

  /// Two units share the same name.
  #[error("duplicate unit name: {name}")]
  DuplicateUnit { name: String },

  /// A plugin unit does not name the plugin that runs it.
  #[error("plugin unit '{name}' does not name a plugin")]
  MissingPlugin { name: String },
}
