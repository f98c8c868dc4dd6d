//! On-disk store for engine resume payloads.
//!
//! Layout: one `<info hash hex>.fastresume` file per torrent plus an optional
//! `queue` file listing info hashes in queue order, one per line.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use torrex_torrent_core::InfoHash;
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};

const RESUME_EXTENSION: &str = "fastresume";
const QUEUE_FILE: &str = "queue";

/// One stored resume payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResume {
    /// Torrent the payload belongs to.
    pub info_hash: InfoHash,
    /// Raw payload as produced by the engine.
    pub payload: Vec<u8>,
}

/// Directory backed resume payload store.
#[derive(Debug, Clone)]
pub struct ResumeDataStore {
    root: PathBuf,
}

impl ResumeDataStore {
    /// Store rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory when missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_initialized(&self) -> SessionResult<()> {
        fs::create_dir_all(&self.root).map_err(|source| SessionError::ResumeStoreIo {
            operation: "create_dir",
            path: self.root.clone(),
            source,
        })
    }

    /// Run a blocking store operation on the blocking thread pool.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or an IO error if the task panicked.
    pub async fn offload<T, F>(&self, op: F) -> SessionResult<T>
    where
        F: FnOnce(&Self) -> SessionResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|err| SessionError::ResumeStoreIo {
                operation: "offload",
                path: self.root.clone(),
                source: std::io::Error::other(err),
            })?
    }

    fn payload_path(&self, info_hash: &InfoHash) -> PathBuf {
        self.root
            .join(format!("{}.{RESUME_EXTENSION}", info_hash.to_hex()))
    }

    /// Load every payload. Torrents listed in the queue file come first in queue
    /// order; the rest follow in info hash order. Unreadable files are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be listed.
    pub fn load_all(&self) -> SessionResult<Vec<StoredResume>> {
        let entries = fs::read_dir(&self.root).map_err(|source| SessionError::ResumeStoreIo {
            operation: "read_dir",
            path: self.root.clone(),
            source,
        })?;

        let mut found = BTreeSet::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RESUME_EXTENSION) {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<InfoHash>().ok());
            match parsed {
                Some(info_hash) => {
                    found.insert(info_hash);
                }
                None => debug!(path = %path.display(), "skipping unrecognised resume file"),
            }
        }

        let mut ordered = Vec::with_capacity(found.len());
        for info_hash in self.read_queue() {
            if found.remove(&info_hash) {
                ordered.push(info_hash);
            }
        }
        ordered.extend(found);

        let mut loaded = Vec::with_capacity(ordered.len());
        for info_hash in ordered {
            let path = self.payload_path(&info_hash);
            match fs::read(&path) {
                Ok(payload) => loaded.push(StoredResume { info_hash, payload }),
                Err(err) => warn!(
                    path = %path.display(),
                    error = %err,
                    "unable to read resume payload"
                ),
            }
        }
        Ok(loaded)
    }

    fn read_queue(&self) -> Vec<InfoHash> {
        let path = self.root.join(QUEUE_FILE);
        let Ok(contents) = fs::read_to_string(&path) else {
            return Vec::new();
        };
        contents
            .lines()
            .filter_map(|line| line.trim().parse::<InfoHash>().ok())
            .collect()
    }

    /// Persist a payload atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary file cannot be written or renamed.
    pub fn save(&self, info_hash: &InfoHash, payload: &[u8]) -> SessionResult<()> {
        self.write_atomic(&self.payload_path(info_hash), payload)
    }

    /// Persist the queue order.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue file cannot be written.
    pub fn save_queue(&self, order: &[InfoHash]) -> SessionResult<()> {
        let mut body = String::new();
        for info_hash in order {
            body.push_str(&info_hash.to_hex());
            body.push('\n');
        }
        self.write_atomic(&self.root.join(QUEUE_FILE), body.as_bytes())
    }

    fn write_atomic(&self, path: &Path, data: &[u8]) -> SessionResult<()> {
        let staging = path.with_extension("tmp");
        let io_err = |operation: &'static str, target: &Path| {
            let target = target.to_path_buf();
            move |source| SessionError::ResumeStoreIo {
                operation,
                path: target,
                source,
            }
        };
        let mut file = fs::File::create(&staging).map_err(io_err("create", &staging))?;
        file.write_all(data).map_err(io_err("write", &staging))?;
        file.sync_all().map_err(io_err("sync", &staging))?;
        drop(file);
        fs::rename(&staging, path).map_err(io_err("rename", path))
    }

    /// Delete a torrent's payload. Missing files are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing payload cannot be removed.
    pub fn remove(&self, info_hash: &InfoHash) -> SessionResult<()> {
        let path = self.payload_path(info_hash);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::ResumeStoreIo {
                operation: "remove",
                path,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offloaded_operations_reach_disk() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ResumeDataStore::new(dir.path().join("resume"));
        store.offload(ResumeDataStore::ensure_initialized).await?;
        store
            .offload(|store| store.save(&hash(4), b"payload"))
            .await?;

        let loaded = store.offload(ResumeDataStore::load_all).await?;
        assert_eq!(
            loaded,
            vec![StoredResume {
                info_hash: hash(4),
                payload: b"payload".to_vec(),
            }]
        );
        Ok(())
    }

    fn hash(byte: u8) -> InfoHash {
        InfoHash::from_bytes([byte; 20])
    }

    #[test]
    fn queue_file_orders_loaded_payloads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ResumeDataStore::new(dir.path().join("resume"));
        store.ensure_initialized()?;

        store.save(&hash(1), b"one")?;
        store.save(&hash(2), b"two")?;
        store.save(&hash(3), b"three")?;
        store.save_queue(&[hash(3), hash(1)])?;
        fs::write(store.root().join("notes.txt"), b"ignored")?;

        let loaded: Vec<InfoHash> = store
            .load_all()?
            .into_iter()
            .map(|stored| stored.info_hash)
            .collect();
        assert_eq!(loaded, vec![hash(3), hash(1), hash(2)]);
        Ok(())
    }

    #[test]
    fn remove_is_idempotent() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = ResumeDataStore::new(dir.path());
        store.save(&hash(4), b"payload")?;
        store.remove(&hash(4))?;
        store.remove(&hash(4))?;
        assert!(store.load_all()?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_root_is_reported() {
        let store = ResumeDataStore::new("/nonexistent/torrex/resume");
        assert!(matches!(
            store.load_all(),
            Err(SessionError::ResumeStoreIo {
                operation: "read_dir",
                ..
            })
        ));
    }
}
