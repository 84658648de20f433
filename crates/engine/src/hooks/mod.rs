//! Post-commit hook
//!
//! After a zone file is published the receiver may run one external command
//! so that a DNS server can reload. The hook is best-effort: its failures are
//! logged and never change the response sent to the uploader.
//!
//! ## Module Organization
//!
//! - `command`: command line parsing and the zone name environment variable
//! - `executor`: process spawning, output forwarding and timeout enforcement

pub mod command;
pub mod executor;

// Re-export main types for convenience
pub use command::{HookCommand, ZONE_NAME_ENV};
pub use executor::{HookError, HookOutcome, HookRunner, run_hook};
