//! HTTP gateway for a stateful ruleset host.
//!
//! Routes requests naming a ruleset (and optionally a session) to the live
//! host held by [`rulegate_rules::RulesetBridge`], gating registry mutations
//! and password changes behind HTTP Basic authorization.

pub mod api;
pub mod app_config;
pub mod auth;
pub mod cli;
pub mod error;
pub mod router;
pub mod startup;
pub mod state;
