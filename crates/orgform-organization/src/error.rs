use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrganizationError {
  /// The organization file could not be read.
  #[error("failed to read organization file {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The organization file is not valid JSON.
  #[error("invalid organization file: {0}")]
  Parse(#[from] serde_json::Error),

  /// Two entities share a logical id.
  #[error("duplicate logical id in organization: {logical_id}")]
  DuplicateLogicalId { logical_id: String },

  /// An organizational unit lists an account that does not exist.
  #[error("organizational unit '{unit}' references unknown account '{account}'")]
  UnknownMember { unit: String, account: String },
}
