//! Orgform Render
//!
//! Renders a unit's shared template for one target. Organization-aware
//! references are resolved at render time; every other expression is passed
//! through untouched for the downstream deployment engine.
//!
//! Recognised references:
//!
//! | Form | Resolves to |
//! |------|-------------|
//! | `{"Ref": "Dev"}` | physical id of the `Dev` account |
//! | `{"Ref": "CurrentAccount"}` | account id of the target |
//! | `{"Fn::GetAtt": ["Dev", "Alias"]}` | an account attribute |
//! | `{"Fn::Sub": "x-${Dev.Alias}"}` | interpolated string |
//! | `{"Fn::CopyValue": ["unit", "Output"]}` | output of another unit's deployment |
//!
//! Stack parameters are additionally coerced to strings.

mod artifact;
mod coerce;
mod error;
mod interpolate;
mod renderer;

pub use artifact::{ImportRef, RenderedArtifact};
pub use error::RenderError;
pub use renderer::TemplateRenderer;
