//! Validated zone identifiers
//!
//! A zone name arrives as an opaque path segment from the upload URL and is
//! used verbatim as a directory name under the storage base directory.
//! [`ZoneName`] is the only way to get from the former to the latter, so
//! anything that could escape the base directory is rejected up front.
//!
//! # Examples
//!
//! ```
//! use zone_receiver_core::ZoneName;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let zone = ZoneName::new("example.com")?;
//! assert_eq!(zone.as_str(), "example.com");
//!
//! assert!(ZoneName::new("../etc").is_err());
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::path::Path;

/// Longest accepted zone identifier, in bytes (the wire limit of a domain name)
pub const MAX_ZONE_NAME_LEN: usize = 255;

/// A zone identifier that is safe to use as a single path segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneName(String);

impl ZoneName {
    /// Validate and wrap a zone identifier
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidZoneName`] if the name is empty, too long,
    /// a relative path component (`.` or `..`), or contains a path
    /// separator or NUL byte.
    ///
    /// # Examples
    ///
    /// ```
    /// use zone_receiver_core::ZoneName;
    ///
    /// assert!(ZoneName::new("0.168.192.in-addr.arpa").is_ok());
    /// assert!(ZoneName::new("").is_err());
    /// assert!(ZoneName::new("..").is_err());
    /// assert!(ZoneName::new("a/b").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if let Some(reason) = Self::rejection_reason(&name) {
            return Err(Error::InvalidZoneName { name, reason });
        }
        Ok(ZoneName(name))
    }

    fn rejection_reason(name: &str) -> Option<&'static str> {
        if name.is_empty() {
            return Some("must not be empty");
        }
        if name.len() > MAX_ZONE_NAME_LEN {
            return Some("longer than 255 bytes");
        }
        if name == "." || name == ".." {
            return Some("relative path component");
        }
        if name.contains(['/', '\\']) {
            return Some("contains a path separator");
        }
        if name.contains('\0') {
            return Some("contains a NUL byte");
        }
        None
    }

    /// Get the zone name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the zone name as a relative path (always a single component)
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl std::fmt::Display for ZoneName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ZoneName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ZoneName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
