//! HTTP server
//!
//! A single route accepts zone uploads:
//!
//! ```text
//! POST /v1/zones/{zonename}/upload   (multipart/form-data, field "zone")
//! ```
//!
//! The file is streamed into the store on a blocking thread, then the post
//! hook runs on that same thread. The response is sent once both are done.

use crate::error::UploadError;
use crate::upload;
use anyhow::{Context, Result};
use axum::Router;
use axum::extract::multipart::Field;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::post;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use zone_receiver_config::Config;
use zone_receiver_core::ZoneName;
use zone_receiver_engine::{HookRunner, ZoneStore};

/// Route of the upload endpoint
pub const UPLOAD_ROUTE: &str = "/v1/zones/{zonename}/upload";

/// Multipart field carrying the zone file
pub const ZONE_FIELD: &str = "zone";

/// Allowance for multipart boundaries and part headers on top of the file limit
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// Shared server state injected into all handlers
#[derive(Debug)]
pub struct AppState {
    store: ZoneStore,
    hook: HookRunner,
}

impl AppState {
    /// Create state from its parts
    pub fn new(store: ZoneStore, hook: HookRunner) -> Self {
        Self { store, hook }
    }

    /// Build state from the resolved configuration
    pub fn from_config(config: &Config) -> Self {
        let store = ZoneStore::new(&config.base_dir, &config.tmp_dir)
            .with_max_upload_bytes(config.max_upload_bytes);
        let hook = HookRunner::from_command_line(
            config.post_hook.as_deref().unwrap_or_default(),
            config.hook_timeout,
        );
        Self::new(store, hook)
    }

    /// Zone file store
    pub fn store(&self) -> &ZoneStore {
        &self.store
    }

    /// Post-commit hook runner
    pub fn hook(&self) -> &HookRunner {
        &self.hook
    }

    /// Commit `content` for `zone`, then run the hook
    ///
    /// Blocking. Hook failures are logged and do not affect the result.
    fn commit_and_notify<R: Read>(
        &self,
        zone: &ZoneName,
        content: R,
    ) -> zone_receiver_core::Result<PathBuf> {
        let path = self.store.commit(zone, content)?;

        if let Err(e) = self.hook.run(zone) {
            tracing::error!(zone = %zone, error = %e, "Failed to execute post hook");
        }

        tracing::info!(zone = %zone, path = %path.display(), "Zone file uploaded successfully");
        Ok(path)
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state
        .store()
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route(UPLOAD_ROUTE, post(upload_zone))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Serve requests on `listener` until a shutdown signal arrives
///
/// In-flight uploads are allowed to finish before this returns.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let address = listener
        .local_addr()
        .context("Failed to read listener address")?;
    tracing::info!(address = %address, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn upload_zone(
    State(state): State<Arc<AppState>>,
    Path(zonename): Path<String>,
    mut multipart: Multipart,
) -> Result<&'static str, UploadError> {
    let zone = ZoneName::new(zonename).map_err(UploadError::InvalidZone)?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(ZONE_FIELD) {
            continue;
        }
        receive_zone(&state, zone, field).await?;
        return Ok("done\n");
    }

    Err(UploadError::MissingField)
}

/// Stream one `zone` field into the store and wait for the commit
async fn receive_zone(
    state: &Arc<AppState>,
    zone: ZoneName,
    field: Field<'_>,
) -> Result<PathBuf, UploadError> {
    let (tx, reader) = upload::channel();
    let worker_state = Arc::clone(state);
    let worker =
        tokio::task::spawn_blocking(move || worker_state.commit_and_notify(&zone, reader));

    let forwarded = upload::forward_field(field, tx).await;
    let committed = worker.await?;

    // The body error explains the commit failure better than the commit does
    forwarded?;
    Ok(committed?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown signal received; stopping receiver");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::time::Duration;
    use zone_receiver_config::{ConfigFile, StorageSection};

    #[test]
    fn test_state_from_config_applies_limits_and_hook() {
        let file = ConfigFile {
            storage: StorageSection {
                base_dir: Some(PathBuf::from("/srv/zones")),
                tmp_dir: Some(PathBuf::from("/srv/zones/.tmp")),
                max_upload_bytes: Some(1024),
            },
            ..ConfigFile::default()
        };
        let mut config = Config::resolve(file).unwrap();
        config.post_hook = Some("rndc reload".to_string());

        let state = AppState::from_config(&config);

        assert_eq!(state.store().base_dir(), std::path::Path::new("/srv/zones"));
        assert_eq!(state.store().max_upload_bytes(), 1024);
        assert_eq!(state.hook().command().unwrap().to_string(), "rndc reload");
        assert_eq!(state.hook().timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_state_without_hook() {
        let file = ConfigFile {
            storage: StorageSection {
                base_dir: Some(PathBuf::from("/srv/zones")),
                ..StorageSection::default()
            },
            ..ConfigFile::default()
        };
        let state = AppState::from_config(&Config::resolve(file).unwrap());
        assert!(state.hook().command().is_none());
    }
}
