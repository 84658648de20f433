//! Core types and utilities for zone-receiver
//!
//! This is the foundation crate (Layer 0) that all other zone-receiver crates depend on.
//! It provides:
//! - Base error types
//! - The validated [`ZoneName`] type used as a storage path segment
//!
//! This crate has no dependencies on other zone-receiver crates.

pub mod error;
pub mod zone;

pub use error::{Error, Result};
pub use zone::ZoneName;
