//! Core library for devrun
//!
//! This crate contains the devfile document model, the command graph resolver,
//! the plan execution engine, platform backends and clients, the component
//! adapter and its factory, settings, logging and error handling.

pub mod adapter;
pub mod backend;
pub mod devfile;
pub mod errors;
pub mod executor;
pub mod factory;
pub mod logging;
pub mod output;
pub mod plan;
pub mod platform;
pub mod resolver;
pub mod settings;

// Re-export IndexMap for use by dependent crates (preserves insertion order for ordered maps)
pub use indexmap::IndexMap;

pub use adapter::{AdapterContext, ComponentAdapter, PushParameters, PushReport};
pub use errors::{DevrunError, Result};
pub use executor::{RunOptions, RunReport};
pub use factory::{new_component_adapter, ClusterContext, PlatformContext};

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
