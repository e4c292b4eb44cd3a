//! Orgform Engine
//!
//! Wires a deployment run together:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      DeploymentEngine                         │
//! │  load state ─▶ load organization ─▶ bind identifiers          │
//! └───────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  per unit: resolve binding ─▶ render targets ─▶ plan_unit     │
//! │  removed units: delete recorded targets                       │
//! │  assemble ─▶ TaskGraph                                        │
//! └───────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        TaskRunner                             │
//! │  StackUnit ─▶ DeploymentBackend     PluginUnit ─▶ Plugin      │
//! │  EngineHooks: late resolution, records outputs and hashes     │
//! └───────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//!                       StateStore::save (once)
//! ```

mod backend;
mod config;
mod engine;
mod error;
mod hooks;
mod plugin;
mod units;

pub use backend::{BackendConfig, BackendError, DeploymentBackend, FsBackend, stack_outputs};
pub use config::EngineConfig;
pub use engine::{DeployReport, DeploymentEngine};
pub use error::EngineError;
pub use hooks::EngineHooks;
pub use plugin::{CopyFileConfig, CopyFilePlugin, Plugin, PluginError, PluginRegistry};
pub use units::{PluginUnit, StackUnit};
