//! Configuration management
//!
//! Configuration is assembled once at startup from three layers, highest
//! precedence first: command-line flags / environment variables, an optional
//! TOML file, and built-in defaults. The result is an immutable [`Config`]
//! that is shared with every request handler.
//!
//! ```toml
//! [server]
//! listen_addr = "127.0.0.1:8080"
//!
//! [storage]
//! base_dir = "/var/lib/dns-zone-receiver"
//! tmp_dir = "/var/lib/dns-zone-receiver/.tmp"
//! max_upload_bytes = 268435456
//!
//! [log]
//! level = "info"
//! format = "json"
//!
//! [hook]
//! command = "/usr/sbin/rndc reload"
//! timeout = 10
//! ```

use crate::Result;
use crate::logging::{LogFormat, LogLevel};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zone_receiver_core::Error;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// Default directory for staging files
pub const DEFAULT_TMP_DIR: &str = "/tmp";

/// Default hook timeout in seconds
pub const DEFAULT_HOOK_TIMEOUT_SECS: u64 = 10;

/// Default upload size limit (256 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 256 * 1024 * 1024;

/// `[server]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Address the HTTP listener binds to
    pub listen_addr: Option<String>,
}

/// `[storage]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// Directory under which `{zone}/all.zone` files are written
    pub base_dir: Option<PathBuf>,
    /// Directory for in-flight staging files
    pub tmp_dir: Option<PathBuf>,
    /// Upper bound on the size of one uploaded zone file
    pub max_upload_bytes: Option<u64>,
}

/// `[log]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Verbosity (`trace`, `debug`, `info`, `warn`, `error`)
    pub level: Option<String>,
    /// Output format (`json` or `compact`)
    pub format: Option<String>,
}

/// `[hook]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSection {
    /// Command line run after each successful upload
    pub command: Option<String>,
    /// Timeout in seconds
    pub timeout: Option<u64>,
}

/// Unresolved configuration layer
///
/// Every field is optional so layers can be overlaid with [`ConfigFile::merge`]
/// before defaults are applied by [`Config::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Listener settings
    #[serde(default)]
    pub server: ServerSection,
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSection,
    /// Logging settings
    #[serde(default)]
    pub log: LogSection,
    /// Post-commit hook settings
    #[serde(default)]
    pub hook: HookSection,
}

impl ConfigFile {
    /// Load a configuration layer from a TOML file
    ///
    /// Relative storage paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or TOML parsing fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let mut config = Self::from_toml_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file {}: {e}", path.display()))
        })?;

        if let Some(parent) = path.parent() {
            config.resolve_relative_paths(parent);
        }

        Ok(config)
    }

    /// Parse a configuration layer from a TOML string
    ///
    /// # Errors
    ///
    /// Returns error if TOML parsing fails
    pub fn from_toml_str(toml_content: &str) -> Result<Self> {
        toml::from_str(toml_content)
            .map_err(|e| Error::Config(format!("Failed to parse config TOML: {e}")))
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    #[must_use]
    pub fn merge(self, other: ConfigFile) -> Self {
        Self {
            server: ServerSection {
                listen_addr: other.server.listen_addr.or(self.server.listen_addr),
            },
            storage: StorageSection {
                base_dir: other.storage.base_dir.or(self.storage.base_dir),
                tmp_dir: other.storage.tmp_dir.or(self.storage.tmp_dir),
                max_upload_bytes: other
                    .storage
                    .max_upload_bytes
                    .or(self.storage.max_upload_bytes),
            },
            log: LogSection {
                level: other.log.level.or(self.log.level),
                format: other.log.format.or(self.log.format),
            },
            hook: HookSection {
                command: other.hook.command.or(self.hook.command),
                timeout: other.hook.timeout.or(self.hook.timeout),
            },
        }
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        if let Some(dir) = self.storage.base_dir.as_mut()
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
        if let Some(dir) = self.storage.tmp_dir.as_mut()
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
    }
}

/// Fully resolved, immutable runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the HTTP listener binds to
    pub listen_addr: String,
    /// Directory under which `{zone}/all.zone` files are written
    pub base_dir: PathBuf,
    /// Directory for in-flight staging files
    pub tmp_dir: PathBuf,
    /// Upper bound on the size of one uploaded zone file
    pub max_upload_bytes: u64,
    /// Log verbosity
    pub log_level: LogLevel,
    /// Log output format
    pub log_format: LogFormat,
    /// Post-commit hook command line, `None` when disabled
    pub post_hook: Option<String>,
    /// Wall-clock limit for one hook invocation
    pub hook_timeout: Duration,
}

impl Config {
    /// Apply defaults and validate a merged configuration layer
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base directory is missing, a numeric
    /// limit is zero, or the log format is unknown.
    pub fn resolve(file: ConfigFile) -> Result<Self> {
        let base_dir = file
            .storage
            .base_dir
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| Error::Config("DNS_ZONE_RECEIVER_BASE_DIR is not set".to_string()))?;

        let listen_addr = file
            .server
            .listen_addr
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        let tmp_dir = file
            .storage
            .tmp_dir
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TMP_DIR));

        let max_upload_bytes = file
            .storage
            .max_upload_bytes
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(Error::Config(
                "max_upload_bytes must be greater than zero".to_string(),
            ));
        }

        let hook_timeout_secs = file.hook.timeout.unwrap_or(DEFAULT_HOOK_TIMEOUT_SECS);
        if hook_timeout_secs == 0 {
            return Err(Error::Config(
                "hook timeout must be greater than zero".to_string(),
            ));
        }

        let log_level = file
            .log
            .level
            .as_deref()
            .map(LogLevel::parse)
            .unwrap_or_default();

        let log_format = match file.log.format.as_deref() {
            Some(s) => s.parse()?,
            None => LogFormat::default(),
        };

        let post_hook = file
            .hook
            .command
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            listen_addr,
            base_dir,
            tmp_dir,
            max_upload_bytes,
            log_level,
            log_format,
            post_hook,
            hook_timeout: Duration::from_secs(hook_timeout_secs),
        })
    }
}
