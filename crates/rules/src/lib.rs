//! Ruleset definitions, the live host, and the hot-reload bridge.
//!
//! This crate provides:
//! - Declarative ruleset artifacts (YAML/JSON) with bounded validation
//! - An artifact loader with upload checks, filename sanitizing and staging
//! - The reference engine host (per-session state, events, facts)
//! - A registry bridge that swaps hosts atomically on every registry change
//! - Promise-aware JSON encoding of engine values

pub mod bridge;
pub mod error;
pub mod host;
pub mod loader;
pub mod registry;
pub mod schema;
pub mod store;
pub mod value;

pub use bridge::{BridgeError, LoadMode, LoadOutcome, RulesetBridge};
pub use error::EngineError;
pub use host::{validate_message, Host, StartHook, DEFAULT_SID};
pub use loader::{ArtifactLoader, LoadError};
pub use registry::DefinitionRegistry;
pub use store::{SharedStateStore, StateStore};
pub use value::{EncodeError, EngineValue};
