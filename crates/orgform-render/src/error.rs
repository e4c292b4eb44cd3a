use thiserror::Error;

use crate::artifact::ImportRef;

/// Errors that can occur while rendering a unit for a target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
  /// One or more imported outputs have not been recorded.
  #[error("unit '{unit}' at {target} imports unavailable outputs: {}", describe(.missing))]
  UnresolvedExport {
    unit: String,
    target: String,
    missing: Vec<ImportRef>,
  },

  /// A recognised function was given malformed arguments.
  #[error("invalid {function} in unit '{unit}': {message}")]
  InvalidExpression {
    unit: String,
    function: String,
    message: String,
  },
}

impl RenderError {
  /// Imports whose outputs were not available.
  pub fn missing_imports(&self) -> &[ImportRef] {
    match self {
      RenderError::UnresolvedExport { missing, .. } => missing,
      RenderError::InvalidExpression { .. } => &[],
    }
  }
}

fn describe(imports: &[ImportRef]) -> String {
  imports
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join(", ")
}
