//! Shared library for the bridge services
//!
//! Provides basic functions shared by all services, including:
//! - logging (console + append-only file, injectable writers)
//! - hex formatting for wire traffic
//! - graceful shutdown signal handling

pub mod hex;
pub mod logging;
pub mod shutdown;

pub use logging::{LogConfig, LogHandle, LoggingError};
