//! Ruleset definition schema with serde deserialization.
//!
//! Defines the declarative format uploaded artifacts and built-in files use:
//! - `DefinitionEnvelope`: lightweight first-pass header (apiVersion, kind)
//! - `RulesetDefinition`: one named ruleset with its rules and startup seed
//! - `RegistrationLimits`: bounds every interpreted artifact must respect

mod definition;
mod envelope;
mod kind;
mod limits;

pub use definition::*;
pub use envelope::*;
pub use kind::*;
pub use limits::*;
