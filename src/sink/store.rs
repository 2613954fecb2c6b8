//! Destination table layout: lock file, staging directory, atomic swap.
//!
//! ## Directory structure
//!
//! ```text
//! parent/
//! ├── earthquakes/                     # committed table (part-*.parquet)
//! ├── .earthquakes.lock                # single-writer lock
//! └── .earthquakes.staging-<uuid>/     # run in progress
//! ```
//!
//! The staged directory is renamed over the destination in one step, so
//! concurrent readers never observe a half-written table. The swap is
//! two renames (destination aside, then staging in), which leaves a
//! brief window where the destination is absent; readers must treat a
//! missing table directory as empty, not as corruption. The lock file
//! serializes writers only. It is created with `create_new` and removed
//! by an RAII guard on every exit path, success or failure.

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CommitSnafu, PrepareSnafu, SinkError};

/// Handle to a destination table directory.
pub struct TableStore {
    dest: PathBuf,
}

/// Holds the single-writer lock; releases it on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "Failed to remove lock file");
        }
    }
}

impl TableStore {
    pub fn new(dest: &Path) -> Self {
        Self {
            dest: dest.to_path_buf(),
        }
    }

    fn parent(&self) -> &Path {
        self.dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
    }

    fn table_name(&self) -> String {
        self.dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "table".to_string())
    }

    /// Hidden sibling path next to the destination.
    fn sibling(&self, suffix: &str) -> PathBuf {
        self.parent().join(format!(".{}{}", self.table_name(), suffix))
    }

    /// Ensure the destination's parent directory exists.
    pub async fn prepare(&self) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(self.parent())
            .await
            .context(PrepareSnafu {
                path: self.parent().to_path_buf(),
            })
    }

    /// Take the single-writer lock for this destination.
    ///
    /// Fails with [`SinkError::Locked`] when another run holds it.
    pub fn acquire_lock(&self) -> Result<LockGuard, SinkError> {
        let path = self.sibling(".lock");
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => {
                debug!(lock = %path.display(), "Acquired destination lock");
                Ok(LockGuard { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(SinkError::Locked { path })
            }
            Err(source) => Err(SinkError::Prepare { path, source }),
        }
    }

    /// List committed part files, sorted by name for deterministic reads.
    ///
    /// An absent destination is an empty table, not an error.
    pub async fn list_part_files(&self) -> Result<Vec<PathBuf>, SinkError> {
        let mut entries = match tokio::fs::read_dir(&self.dest).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SinkError::Prepare {
                    path: self.dest.clone(),
                    source,
                });
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.context(PrepareSnafu {
            path: self.dest.clone(),
        })? {
            let path = entry.path();
            if path.extension().map(|ext| ext == "parquet").unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Fresh staging directory path for this run.
    pub fn new_staging_dir(&self) -> PathBuf {
        self.sibling(&format!(".staging-{}", Uuid::new_v4()))
    }

    /// Atomically replace the destination with the staged directory.
    ///
    /// The previous table is moved aside first and restored if the swap
    /// fails, so the destination always holds either the old or the new
    /// table, never a mixture.
    pub async fn commit(&self, staging: &Path) -> Result<(), SinkError> {
        let retired = self.sibling(&format!(".retired-{}", Uuid::new_v4()));

        let had_previous = tokio::fs::metadata(&self.dest).await.is_ok();
        if had_previous {
            tokio::fs::rename(&self.dest, &retired)
                .await
                .context(CommitSnafu {
                    path: self.dest.clone(),
                })?;
        }

        if let Err(source) = tokio::fs::rename(staging, &self.dest).await {
            if had_previous {
                if let Err(e) = tokio::fs::rename(&retired, &self.dest).await {
                    warn!(
                        table = %self.dest.display(),
                        error = %e,
                        "Failed to restore previous table after aborted commit"
                    );
                }
            }
            return Err(SinkError::Commit {
                path: self.dest.clone(),
                source,
            });
        }

        if had_previous {
            if let Err(e) = tokio::fs::remove_dir_all(&retired).await {
                warn!(path = %retired.display(), error = %e, "Failed to remove retired table");
            }
        }

        debug!(table = %self.dest.display(), "Committed staged table");
        Ok(())
    }
}
