//! Filesystem-backed storage backend for local development.
//!
//! [`LocalBackend`] implements the [`StorageBackend`] trait using the local
//! filesystem. Atomic conditional writes use `OpenOptions::create_new(true)`
//! which maps to `O_CREAT | O_EXCL` on POSIX systems.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, instrument};

use sharesync_core::error::ShareError;
use sharesync_core::storage::{ListOptions, StorageBackend};
use sharesync_core::Result;

/// A [`StorageBackend`] backed by the local filesystem.
///
/// All keys are mapped to paths under the configured `base_dir`.
/// Parent directories are created automatically on write.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    base_dir: PathBuf,
}

impl LocalBackend {
    /// Create a new `LocalBackend` rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            ShareError::storage(
                format!("Failed to create base directory: {}", base_dir.display()),
                e,
            )
        })?;
        debug!(base_dir = %base_dir.display(), "LocalBackend initialised");
        Ok(Self { base_dir })
    }

    /// Map a key to its file under the base directory. Keys that would
    /// resolve outside it (absolute, or with `..` parts) are rejected.
    fn key_to_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let contained = !key.is_empty()
            && relative
                .components()
                .all(|part| matches!(part, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(ShareError::InvalidKey {
                key: key.to_string(),
            });
        }
        Ok(self.base_dir.join(relative))
    }

    /// Return the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    async fn create_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                ShareError::storage(
                    format!(
                        "Failed to create parent directories for {}",
                        path.display()
                    ),
                    e,
                )
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    #[instrument(skip(self), fields(key = %key))]
    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.key_to_path(key)?;
        match fs::read(&path).await {
            Ok(data) => {
                debug!("Read {} bytes from {}", data.len(), key);
                Ok(Some(Bytes::from(data)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ShareError::storage(
                format!("Failed to read {}", path.display()),
                e,
            )),
        }
    }

    #[instrument(skip(self, data), fields(key = %key, size = data.len()))]
    async fn write(&self, key: &str, data: Bytes) -> Result<()> {
        let path = self.key_to_path(key)?;
        self.create_parent(&path).await?;
        fs::write(&path, &data).await.map_err(|e| {
            ShareError::storage(format!("Failed to write {}", path.display()), e)
        })?;
        debug!("Wrote {} bytes to {}", data.len(), key);
        Ok(())
    }

    #[instrument(skip(self, data), fields(key = %key, size = data.len()))]
    async fn write_if_absent(&self, key: &str, data: Bytes) -> Result<bool> {
        let path = self.key_to_path(key)?;
        self.create_parent(&path).await?;

        let target = path.clone();
        let created = tokio::task::spawn_blocking(move || {
            use std::io::Write;
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
            {
                Ok(mut file) => {
                    file.write_all(&data)
                        .map_err(|e| ShareError::storage("Failed to write file", e))?;
                    Ok(true)
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(ShareError::storage(
                    format!("Failed to create {}", target.display()),
                    e,
                )),
            }
        })
        .await
        .map_err(|e| ShareError::Internal {
            message: format!("Blocking task panicked: {e}"),
        })??;

        debug!(
            "write_if_absent {} → {}",
            key,
            if created { "created" } else { "already exists" }
        );
        Ok(created)
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.key_to_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Remove {}: already absent", key);
                Ok(())
            }
            Err(e) => Err(ShareError::storage(
                format!("Failed to remove {}", path.display()),
                e,
            )),
        }
    }

    #[instrument(skip(self), fields(prefix = %options.prefix))]
    async fn list(&self, options: &ListOptions) -> Result<Vec<String>> {
        let base = &self.base_dir;
        let mut keys = Vec::new();
        list_recursive(base, base, &options.prefix, &mut keys).await?;
        keys.sort();

        if let Some(after) = options.after_key() {
            keys.retain(|key| key.as_str() > after.as_str());
        }
        if let Some(limit) = options.limit {
            keys.truncate(limit);
        }
        options.retain_before(&mut keys);

        debug!("Listed {} keys with prefix '{}'", keys.len(), options.prefix);
        Ok(keys)
    }
}

/// Recursively list all files under `dir`, producing keys relative to `base`.
async fn list_recursive(
    base: &Path,
    dir: &Path,
    prefix: &str,
    results: &mut Vec<String>,
) -> Result<()> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(ShareError::storage(
                format!("Failed to read directory {}", dir.display()),
                e,
            ))
        }
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| {
        ShareError::storage(
            format!("Failed to read directory entry in {}", dir.display()),
            e,
        )
    })? {
        let path = entry.path();
        if path.is_dir() {
            Box::pin(list_recursive(base, &path, prefix, results)).await?;
        } else {
            let relative = path
                .strip_prefix(base)
                .map_err(|e| ShareError::Internal {
                    message: format!("Path prefix strip failed: {e}"),
                })?;
            // Normalise to forward slashes for cross-platform key consistency
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                results.push(key);
            }
        }
    }

    Ok(())
}
