//! Orgform Organization
//!
//! The organization model is the read-only view of the accounts a template is
//! deployed into. It is loaded once per run from an [`OrganizationDirectory`]
//! and never mutated while tasks execute.
//!
//! ```text
//! OrganizationDirectory ──load──▶ Organization ──resolve──▶ Vec<Target>
//!   (JSON file, tests)            master account             (account, region)
//!                                 accounts
//!                                 organizational units
//! ```

mod directory;
mod entity;
mod error;
mod organization;
mod target;

pub use directory::{FileOrganizationDirectory, OrganizationDirectory, OrganizationFile};
pub use entity::{AttributeLookup, DEFAULT_ACCESS_ROLE_NAME, EntityKind, OrganizationEntity};
pub use error::OrganizationError;
pub use organization::{CURRENT_ACCOUNT_IDS, Organization};
pub use target::{Target, target_key};
