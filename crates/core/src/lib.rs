//! Core utilities for streak.
//!
//! This crate provides foundational types and utilities used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Pausable frame timer
//! - Configuration management

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::Timer;
