//! Configuration management for zone-receiver
//!
//! This crate handles:
//! - Configuration loading, layering and validation
//! - Logging initialization

pub mod config;
pub mod logging;

// Re-export error types from core
pub use zone_receiver_core::{Error, Result};

// Re-export main types
pub use config::{Config, ConfigFile, HookSection, LogSection, ServerSection, StorageSection};
pub use logging::{LogFormat, LogLevel};
