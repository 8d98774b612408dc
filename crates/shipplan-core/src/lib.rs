#![forbid(unsafe_code)]
//! shipplan-core: value types shared by the optimizer crates.
//!
//! - strongly typed ids for every arena
//! - field lists/sets and global (partitioning/ordering) properties
//! - the logical DAG the optimizer consumes, plus its validation
//! - optimizer configuration, errors, and stable hashing
//!
//! No optimization logic lives here.

pub mod config;
pub mod dag;
pub mod error;
pub mod fields;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod properties;

pub use error::{Error, Result};

/// Version string stamped into optimized plans.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
