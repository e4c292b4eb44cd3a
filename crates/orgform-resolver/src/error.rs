use thiserror::Error;

/// Errors that can occur while resolving a binding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
  /// The binding references a logical id that is not in the organization.
  #[error("account '{logical_id}' is not part of the organization")]
  UnresolvableAccount { logical_id: String },

  /// Neither the binding nor the caller supplied any region.
  #[error("binding does not declare any region")]
  MissingRegion,
}
