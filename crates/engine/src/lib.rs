//! # Zone Receiver Engine
//!
//! Filesystem and process side of the receiver:
//!
//! - **Store**: atomic publication of uploaded zone files
//! - **Hooks**: the optional post-commit command with a bounded lifetime
//!
//! Everything here is blocking; async callers run it on a blocking pool.

pub mod hooks;
pub mod store;

// Re-export error types from core
pub use zone_receiver_core::{Error, Result, ZoneName};

// Re-export commonly used types
pub use hooks::{HookCommand, HookError, HookOutcome, HookRunner};
pub use store::ZoneStore;
