//! Crash-safe zone file storage
//!
//! Uploads are written to a uniquely named staging file, synced, and then
//! renamed over `{base_dir}/{zone}/all.zone`. Readers of the canonical path
//! therefore see either the previous snapshot or the new one, never a
//! partial write. The staging file is removed on every failure path by
//! dropping the [`tempfile::NamedTempFile`] that owns it.
//!
//! The staging directory must live on the same filesystem as the base
//! directory; otherwise the rename degrades to copy-and-delete and the
//! atomicity guarantee is lost.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zone_receiver_core::{Error, Result, ZoneName};

/// File name of the committed snapshot inside a zone directory
pub const ZONE_FILE_NAME: &str = "all.zone";

/// Permission bits of a committed snapshot (rw-r--r--)
pub const ZONE_FILE_MODE: u32 = 0o644;

/// Prefix of staging files in the temp directory
pub const STAGING_PREFIX: &str = "dns-zone-receiver-";

/// Zone file store rooted at a base directory
#[derive(Debug, Clone)]
pub struct ZoneStore {
    base_dir: PathBuf,
    tmp_dir: PathBuf,
    max_upload_bytes: u64,
}

impl ZoneStore {
    /// Create a store with no upload size limit
    pub fn new(base_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            tmp_dir: tmp_dir.into(),
            max_upload_bytes: u64::MAX,
        }
    }

    /// Limit the size of a single upload
    #[must_use]
    pub fn with_max_upload_bytes(mut self, limit: u64) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Base directory holding one subdirectory per zone
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory for staging files
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Maximum accepted upload size in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Canonical path of a zone's snapshot
    ///
    /// # Examples
    /// ```
    /// use zone_receiver_core::ZoneName;
    /// use zone_receiver_engine::store::ZoneStore;
    /// use std::path::Path;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = ZoneStore::new("/srv/zones", "/tmp");
    /// let zone = ZoneName::new("example.com")?;
    /// assert_eq!(store.zone_path(&zone), Path::new("/srv/zones/example.com/all.zone"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn zone_path(&self, zone: &ZoneName) -> PathBuf {
        self.base_dir.join(zone.as_path()).join(ZONE_FILE_NAME)
    }

    /// Create the base directory if it does not exist
    pub fn ensure_base_dir(&self) -> Result<()> {
        create_dir_all(&self.base_dir)
    }

    /// Durably store `content` as the snapshot for `zone`
    ///
    /// Returns the canonical path on success. A failure while setting
    /// permissions happens after the rename, so the new content is already
    /// committed when [`Error::Permissions`] is returned.
    #[tracing::instrument(skip_all, fields(zone = %zone))]
    pub fn commit<R: Read>(&self, zone: &ZoneName, content: R) -> Result<PathBuf> {
        create_dir_all(&self.tmp_dir)?;

        let mut staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempfile_in(&self.tmp_dir)
            .map_err(|source| Error::StagingCreate {
                dir: self.tmp_dir.clone(),
                source,
            })?;
        tracing::debug!(staging = %staging.path().display(), "Created staging file");

        let written = self.copy_into(&mut staging, content)?;

        let out_path = self.zone_path(zone);
        let zone_dir = self.base_dir.join(zone.as_path());
        let new_zone_dir = !zone_dir.is_dir();
        create_dir_all(&zone_dir)?;

        staging.persist(&out_path).map_err(|e| Error::Rename {
            from: e.file.path().to_path_buf(),
            to: out_path.clone(),
            source: e.error,
        })?;

        set_zone_file_mode(&out_path)?;

        // The rename is only durable once the directory entry is flushed
        sync_dir(&zone_dir)?;
        if new_zone_dir {
            sync_dir(&self.base_dir)?;
        }

        tracing::debug!(path = %out_path.display(), bytes = written, "Committed zone file");
        Ok(out_path)
    }

    /// Copy at most `max_upload_bytes` into the staging file and sync it
    fn copy_into<R: Read>(&self, staging: &mut NamedTempFile, content: R) -> Result<u64> {
        let staging_path = staging.path().to_path_buf();
        let copy_err = |source: io::Error| Error::Copy {
            path: staging_path.clone(),
            source,
        };

        let mut limited = content.take(self.max_upload_bytes.saturating_add(1));
        let written = io::copy(&mut limited, staging.as_file_mut()).map_err(copy_err)?;
        if written > self.max_upload_bytes {
            return Err(Error::UploadTooLarge {
                limit: self.max_upload_bytes,
            });
        }

        staging.as_file().sync_all().map_err(copy_err)?;
        Ok(written)
    }
}

fn create_dir_all(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|source| Error::DirectoryCreate {
        path: path.to_path_buf(),
        source,
    })
}

/// Flush a directory's entries to disk
#[cfg(unix)]
fn sync_dir(path: &Path) -> Result<()> {
    let sync_err = |source: io::Error| Error::DirectorySync {
        path: path.to_path_buf(),
        source,
    };
    fs::File::open(path)
        .map_err(sync_err)?
        .sync_all()
        .map_err(sync_err)
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_zone_file_mode(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(ZONE_FILE_MODE)).map_err(|source| {
        Error::Permissions {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_zone_file_mode(_path: &Path) -> Result<()> {
    Ok(())
}
