//! DNS zone receiver library
//!
//! Holds the command-line definition, startup sequence and HTTP layer of the
//! `zone-receiver` binary, so they can be driven from tests.

pub mod error;
pub mod server;
pub mod upload;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use zone_receiver_config::{
    Config, ConfigFile, HookSection, LogSection, ServerSection, StorageSection, logging,
};

use server::AppState;

/// Receive DNS zone files over HTTP
#[derive(Parser, Debug, Default)]
#[command(name = "zone-receiver")]
#[command(version)]
#[command(about = "Receive DNS zone files over HTTP and publish them atomically")]
#[command(long_about = "Receive DNS zone files over HTTP and publish them atomically

Accepts POST /v1/zones/{zonename}/upload with a multipart field named 'zone'
and writes it to {base-dir}/{zonename}/all.zone. After each successful write
the optional post hook runs with DNS_ZONE_RECEIVER_ZONENAME set.

Every option can also be given through its environment variable or in the
TOML file passed with --config. Flags and environment win over the file.")]
pub struct Cli {
    /// Directory under which zone files are written
    #[arg(long, env = "DNS_ZONE_RECEIVER_BASE_DIR", value_name = "DIR")]
    pub base_dir: Option<String>,

    /// Address to listen on
    #[arg(long, env = "DNS_ZONE_RECEIVER_LISTEN_ADDR", value_name = "ADDR")]
    pub listen_addr: Option<String>,

    /// Directory for staging files (same filesystem as the base directory)
    #[arg(long, env = "DNS_ZONE_RECEIVER_TMP_DIR", value_name = "DIR")]
    pub tmp_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DNS_ZONE_RECEIVER_LOG_LEVEL", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log format (json, compact)
    #[arg(long, env = "DNS_ZONE_RECEIVER_LOG_FORMAT", value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Command to run after each successful upload
    #[arg(long, env = "DNS_ZONE_RECEIVER_POST_HOOK", value_name = "COMMAND")]
    pub post_hook: Option<String>,

    /// Post hook timeout in seconds
    #[arg(long, env = "DNS_ZONE_RECEIVER_HOOK_TIMEOUT", value_name = "SECS")]
    pub hook_timeout: Option<u64>,

    /// Largest accepted zone file in bytes
    #[arg(long, env = "DNS_ZONE_RECEIVER_MAX_UPLOAD_BYTES", value_name = "BYTES")]
    pub max_upload_bytes: Option<u64>,

    /// Path to a TOML config file
    #[arg(long, env = "DNS_ZONE_RECEIVER_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Configuration layer formed by flags and environment variables
    ///
    /// Empty values count as unset.
    pub fn overlay(&self) -> ConfigFile {
        fn non_empty(value: Option<&String>) -> Option<String> {
            value.filter(|s| !s.is_empty()).cloned()
        }

        ConfigFile {
            server: ServerSection {
                listen_addr: non_empty(self.listen_addr.as_ref()),
            },
            storage: StorageSection {
                base_dir: non_empty(self.base_dir.as_ref()).map(PathBuf::from),
                tmp_dir: non_empty(self.tmp_dir.as_ref()).map(PathBuf::from),
                max_upload_bytes: self.max_upload_bytes,
            },
            log: LogSection {
                level: non_empty(self.log_level.as_ref()),
                format: non_empty(self.log_format.as_ref()),
            },
            hook: HookSection {
                command: non_empty(self.post_hook.as_ref()),
                timeout: self.hook_timeout,
            },
        }
    }

    /// Resolve the runtime configuration from file, flags and defaults
    pub fn load_config(&self) -> Result<Config> {
        let file = match &self.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        Ok(Config::resolve(file.merge(self.overlay()))?)
    }
}

/// Parse the listen address from configuration
pub fn parse_listen_addr(listen_addr: &str) -> Result<SocketAddr> {
    listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {listen_addr}"))
}

/// Main entry point for the receiver
pub fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;
    logging::init(config.log_level, config.log_format)?;

    let address = parse_listen_addr(&config.listen_addr)?;

    let state = AppState::from_config(&config);
    state.store().ensure_base_dir()?;

    if let Some(command) = state.hook().command() {
        match command.resolve_program() {
            Some(program) => tracing::info!(
                hook = %command,
                program = %program.display(),
                timeout_secs = config.hook_timeout.as_secs(),
                "Post hook enabled"
            ),
            None => tracing::warn!(
                hook = %command,
                "Post hook program not found in PATH; uploads will still be accepted"
            ),
        }
    }

    tracing::debug!(
        base_dir = %config.base_dir.display(),
        tmp_dir = %config.tmp_dir.display(),
        max_upload_bytes = config.max_upload_bytes,
        "Storage configured"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind listener at {address}"))?;
        server::serve(listener, Arc::new(state)).await
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    const ENV_VARS: &[&str] = &[
        "DNS_ZONE_RECEIVER_BASE_DIR",
        "DNS_ZONE_RECEIVER_LISTEN_ADDR",
        "DNS_ZONE_RECEIVER_TMP_DIR",
        "DNS_ZONE_RECEIVER_LOG_LEVEL",
        "DNS_ZONE_RECEIVER_LOG_FORMAT",
        "DNS_ZONE_RECEIVER_POST_HOOK",
        "DNS_ZONE_RECEIVER_HOOK_TIMEOUT",
        "DNS_ZONE_RECEIVER_MAX_UPLOAD_BYTES",
        "DNS_ZONE_RECEIVER_CONFIG",
    ];

    #[allow(unsafe_code)]
    fn clear_env() {
        for var in ENV_VARS {
            // SAFETY: tests touching the environment are serialized
            unsafe { std::env::remove_var(var) };
        }
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    #[serial]
    fn test_flags_parse_into_config() {
        clear_env();
        let cli = Cli::try_parse_from([
            "zone-receiver",
            "--base-dir",
            "/srv/zones",
            "--listen-addr",
            "0.0.0.0:9000",
            "--post-hook",
            "rndc reload",
            "--hook-timeout",
            "3",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();

        assert_eq!(config.base_dir, PathBuf::from("/srv/zones"));
        assert_eq!(config.listen_addr, "0.0.0.0:9000");
        assert_eq!(config.tmp_dir, PathBuf::from("/tmp"));
        assert_eq!(config.post_hook.as_deref(), Some("rndc reload"));
        assert_eq!(config.hook_timeout, Duration::from_secs(3));
    }

    #[test]
    #[serial]
    #[allow(unsafe_code)]
    fn test_environment_variables_are_read() {
        clear_env();
        // SAFETY: serialized with other environment tests
        unsafe {
            std::env::set_var("DNS_ZONE_RECEIVER_BASE_DIR", "/var/lib/zones");
            std::env::set_var("DNS_ZONE_RECEIVER_LOG_LEVEL", "debug");
            std::env::set_var("DNS_ZONE_RECEIVER_POST_HOOK", "");
        }

        let cli = Cli::try_parse_from(["zone-receiver"]).unwrap();
        let config = cli.load_config();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.base_dir, PathBuf::from("/var/lib/zones"));
        assert_eq!(config.log_level, logging::LogLevel::Debug);
        assert_eq!(config.post_hook, None);
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
    }

    #[test]
    #[serial]
    fn test_missing_base_dir_is_fatal() {
        clear_env();
        let cli = Cli::try_parse_from(["zone-receiver"]).unwrap();
        let err = cli.load_config().unwrap_err();
        assert!(err.to_string().contains("DNS_ZONE_RECEIVER_BASE_DIR is not set"));
    }

    #[test]
    #[serial]
    fn test_flags_override_config_file() {
        clear_env();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("receiver.toml");
        fs::write(
            &path,
            r#"
[server]
listen_addr = "127.0.0.1:7000"

[storage]
base_dir = "zones"

[hook]
command = "/usr/sbin/rndc reload"
timeout = 30
"#,
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "zone-receiver",
            "--config",
            path.to_str().unwrap(),
            "--hook-timeout",
            "5",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.base_dir, temp.path().join("zones"));
        assert_eq!(config.post_hook.as_deref(), Some("/usr/sbin/rndc reload"));
        assert_eq!(config.hook_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_listen_addr() {
        assert_eq!(
            parse_listen_addr("127.0.0.1:8080").unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert!(parse_listen_addr("localhost").is_err());
    }
}
