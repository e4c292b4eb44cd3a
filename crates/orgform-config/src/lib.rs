//! Orgform Config
//!
//! This crate contains the serializable deployment template types for orgform.
//! A template is a list of units, each carrying an organization binding that
//! declares which accounts and regions the unit is deployed to.
//!
//! Templates are loaded from JSON (via CLI with `orgform deploy template.json`)
//! and also persisted whole in the deployment state as the previous template,
//! so deletions of removed units can be computed on the next run.
//!
//! The engine takes these types, resolves bindings against the organization
//! and renders one artifact per target.

mod binding;
mod error;
mod template;
mod unit;

pub use binding::{AccountSelection, AccountSelector, OrganizationBinding, Regions};
pub use error::ConfigError;
pub use template::TemplateDef;
pub use unit::{UnitDef, UnitKind};
