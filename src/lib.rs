#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

/// Core data structures
pub mod core;

/// Service lookup table and broadcast job
pub mod lookup;

/// Replica down batch coordination
pub mod down;

/// Per-partition serialized dispatch
pub mod dispatch;

/// Consumer-side cache and matching
pub mod resolver;

/// Wire message bodies and codec
pub mod message;

/// Collaborator interfaces
pub mod store;

/// Configuration
pub mod config;

/// Utilities for easier development
pub mod utils;

pub use uuid;
