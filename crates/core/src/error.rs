//! Base error types for zone-receiver
//!
//! Storage variants always carry the path that was being operated on, so a
//! logged error is enough to locate the failure on disk.

use std::path::PathBuf;
use thiserror::Error;

/// Base error type for shared functionality
#[derive(Error, Debug)]
pub enum Error {
    /// Zone identifier cannot be used as a path segment
    #[error("Invalid zone name {name:?}: {reason}")]
    InvalidZoneName {
        /// The rejected name as received
        name: String,
        /// Which rule the name broke
        reason: &'static str,
    },

    /// Error creating a directory (temp directory or zone directory)
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreate {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Error creating the staging file
    #[error("Failed to create staging file in {}: {source}", dir.display())]
    StagingCreate {
        /// Temp directory the staging file was created in
        dir: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Error copying the upload into the staging file
    #[error("Failed to save zone file to {}: {source}", path.display())]
    Copy {
        /// Staging file being written
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Upload exceeded the configured size limit
    #[error("Upload exceeds the limit of {limit} bytes")]
    UploadTooLarge {
        /// Configured limit in bytes
        limit: u64,
    },

    /// Error renaming the staging file onto the canonical path
    #[error("Failed to rename {} to {}: {source}", from.display(), to.display())]
    Rename {
        /// Staging file
        from: PathBuf,
        /// Canonical zone file path
        to: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Error normalizing the permissions of a committed file
    #[error("Failed to change permissions of {}: {source}", path.display())]
    Permissions {
        /// Committed zone file
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Error flushing a directory after the rename
    #[error("Failed to sync directory {}: {source}", path.display())]
    DirectorySync {
        /// Directory whose entries were being flushed
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_storage_errors_mention_path() {
        let err = Error::Rename {
            from: PathBuf::from("/tmp/dns-zone-receiver-abc"),
            to: PathBuf::from("/srv/zones/example.com/all.zone"),
            source: std::io::Error::other("cross-device link"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/dns-zone-receiver-abc"));
        assert!(msg.contains("/srv/zones/example.com/all.zone"));
        assert!(msg.contains("cross-device link"));
    }

    #[test]
    fn test_directory_sync_error_mentions_path() {
        let err = Error::DirectorySync {
            path: PathBuf::from("/srv/zones/example.com"),
            source: std::io::Error::other("input/output error"),
        };
        assert_eq!(
            err.to_string(),
            "Failed to sync directory /srv/zones/example.com: input/output error"
        );
    }

    #[test]
    fn test_invalid_zone_name_message() {
        let err = Error::InvalidZoneName {
            name: "..".into(),
            reason: "is a relative path component",
        };
        assert_eq!(
            err.to_string(),
            "Invalid zone name \"..\": is a relative path component"
        );
    }
}
