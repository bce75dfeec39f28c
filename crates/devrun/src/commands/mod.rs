//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod lifecycle;
pub mod plan;
pub mod run;
pub mod shared;
