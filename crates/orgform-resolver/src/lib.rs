//! Orgform Resolver
//!
//! Expands an [`OrganizationBinding`](orgform_config::OrganizationBinding)
//! into the concrete set of (account, region) targets a unit is deployed to.
//!
//! ```text
//! accounts ("*" | ids | tags | OUs) ──▶ + master? ──▶ - excluded ──┐
//!                                                                  ├──▶ accounts × regions
//! region override ?? binding regions ──────────────────────────────┘     dedup + sort
//! ```

mod error;
mod resolver;

pub use error::ResolveError;
pub use resolver::BindingResolver;
