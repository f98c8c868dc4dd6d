//! Abstractions over the collaborators that feed the state models.
//!
//! # Design
//! - `ContentSource` exposes the authoritative per-file arrays the file tree reconciles.
//! - `TrackerSource` exposes the tracker set and per-torrent feature switches.
//! - `FileStorage` owns file paths and implements folder-aware renaming on top of `rename_file`.

use uuid::Uuid;

use crate::error::RenameError;
use crate::model::{DownloadPriority, TorrentMetadata, TrackerEntry};

/// Per-file content state of one torrent.
pub trait ContentSource: Send + Sync {
    /// Whether file information is available yet.
    fn has_metadata(&self) -> bool;
    /// Number of files.
    fn files_count(&self) -> usize;
    /// Relative, `/` separated path of a file.
    fn file_path(&self, index: usize) -> String;
    /// Size of a file in bytes.
    fn file_size(&self, index: usize) -> u64;
    /// Priority of every file, in file order.
    fn file_priorities(&self) -> Vec<DownloadPriority>;
    /// Downloaded fraction of every file.
    fn files_progress(&self) -> Vec<f64>;
    /// Fraction of each file's pieces currently available from at least one peer.
    fn available_file_fractions(&self) -> Vec<f64>;
}

/// Tracker state of one torrent.
pub trait TrackerSource: Send + Sync {
    /// Identity of the torrent.
    fn torrent_id(&self) -> Uuid;
    /// Current tracker list.
    fn trackers(&self) -> Vec<TrackerEntry>;
    /// Whether the torrent is private (no DHT, PeX or LSD).
    fn is_private(&self) -> bool;
    /// DHT disabled for this torrent.
    fn is_dht_disabled(&self) -> bool;
    /// Peer exchange disabled for this torrent.
    fn is_pex_disabled(&self) -> bool;
    /// Local service discovery disabled for this torrent.
    fn is_lsd_disabled(&self) -> bool;
}

/// Storage layout whose file paths can be rewritten.
pub trait FileStorage {
    /// Number of files.
    fn files_count(&self) -> usize;
    /// Relative, `/` separated path of a file.
    fn file_path(&self, index: usize) -> String;
    /// Replace the path of a single file.
    fn rename_file(&mut self, index: usize, new_path: &str);

    /// Rename a file, or every file under a folder prefix.
    ///
    /// # Errors
    ///
    /// Returns a [`RenameError`] when either path is invalid, the destination is
    /// absolute or already taken, or nothing matches `old_path`.
    fn rename_item(&mut self, old_path: &str, new_path: &str) -> Result<(), RenameError> {
        if !is_valid_path(old_path) {
            return Err(RenameError::InvalidPath {
                path: old_path.to_string(),
            });
        }
        if !is_valid_path(new_path) {
            return Err(RenameError::InvalidPath {
                path: new_path.to_string(),
            });
        }
        if is_absolute(new_path) {
            return Err(RenameError::AbsolutePath {
                path: new_path.to_string(),
            });
        }

        let old_clean = clean_path(old_path);
        let new_clean = clean_path(new_path);
        let old_prefix = format!("{old_clean}/");
        let new_prefix = format!("{new_clean}/");

        let mut matched = Vec::new();
        let mut is_folder = false;
        for index in 0..self.files_count() {
            let path = self.file_path(index);
            if matched.is_empty() && same_name(&path, &old_clean) {
                matched.push(index);
            }
            if (matched.is_empty() || is_folder) && starts_with(&path, &old_prefix) {
                matched.push(index);
                is_folder = true;
            }
            if same_name(&path, &new_clean) {
                return Err(RenameError::FileExists { path: new_clean });
            }
            if starts_with(&path, &new_prefix) {
                return Err(RenameError::FolderExists { path: new_clean });
            }
        }

        if matched.is_empty() {
            return Err(RenameError::NotFound { path: old_clean });
        }

        if is_folder {
            for index in matched {
                let path = self.file_path(index);
                let renamed = format!("{new_prefix}{}", &path[old_prefix.len()..]);
                self.rename_file(index, &renamed);
            }
        } else {
            self.rename_file(matched[0], &new_clean);
        }
        Ok(())
    }
}

impl FileStorage for TorrentMetadata {
    fn files_count(&self) -> usize {
        self.files.len()
    }

    fn file_path(&self, index: usize) -> String {
        self.files
            .get(index)
            .map(|file| file.path.clone())
            .unwrap_or_default()
    }

    fn rename_file(&mut self, index: usize, new_path: &str) {
        if let Some(file) = self.files.get_mut(index) {
            file.path = new_path.to_string();
        }
    }
}

#[cfg(windows)]
const FORBIDDEN_CHARS: &[char] = &['\0', ':', '?', '"', '*', '<', '>', '|'];
#[cfg(not(windows))]
const FORBIDDEN_CHARS: &[char] = &['\0'];

fn is_valid_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains(FORBIDDEN_CHARS)
}

fn is_absolute(path: &str) -> bool {
    path.starts_with('/')
        || path.starts_with('\\')
        || (cfg!(windows) && path.as_bytes().get(1) == Some(&b':'))
}

fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else {
                    parts.push(part);
                }
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn same_name(left: &str, right: &str) -> bool {
    if cfg!(windows) {
        left.eq_ignore_ascii_case(right)
    } else {
        left == right
    }
}

fn starts_with(path: &str, prefix: &str) -> bool {
    path.len() >= prefix.len()
        && path.is_char_boundary(prefix.len())
        && same_name(&path[..prefix.len()], prefix)
}
