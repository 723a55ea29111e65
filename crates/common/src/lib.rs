//! Recast Common Utilities
//!
//! Shared infrastructure for all Recast crates:
//! - Error types, the capture failure taxonomy, and result aliases
//! - Clock utilities for recording timing
//! - Tracing/logging initialization
//! - Configuration loading (including the persisted microphone choice)

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
