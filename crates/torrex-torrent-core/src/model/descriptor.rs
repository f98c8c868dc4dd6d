use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{DownloadPriority, InfoHash, TorrentStatus, TrackerEntry};

/// One file described by torrent metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Path relative to the torrent root, `/` separated.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

/// Decoded info dictionary of a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    /// Suggested torrent name.
    pub name: String,
    /// Piece size in bytes.
    pub piece_length: u32,
    /// Files in storage order.
    pub files: Vec<FileSpec>,
    /// Raw info dictionary as handed to the engine.
    #[serde(default)]
    pub info_bytes: Vec<u8>,
    /// Whether the torrent is flagged private.
    #[serde(default)]
    pub private: bool,
}

impl TorrentMetadata {
    /// Sum of all file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }

    /// Number of pieces covering the payload.
    #[must_use]
    pub fn piece_count(&self) -> usize {
        if self.piece_length == 0 {
            return 0;
        }
        let pieces = self.total_size().div_ceil(u64::from(self.piece_length));
        usize::try_from(pieces).unwrap_or(usize::MAX)
    }
}

/// How a descriptor was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    /// Parsed from a magnet URI; metadata arrives from peers later.
    Magnet,
    /// Built from a metainfo file.
    Metainfo,
}

/// What to add to the session: identity, announce sources, and optional metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentDescriptor {
    /// Origin of the descriptor.
    pub kind: DescriptorKind,
    /// Info hash identifying the torrent.
    pub info_hash: InfoHash,
    /// Display name; may be empty for magnets without `dn`.
    pub name: String,
    /// Announce URLs with tiers.
    pub trackers: Vec<TrackerEntry>,
    /// Web seed URLs.
    pub url_seeds: Vec<String>,
    /// Info dictionary when already known.
    pub metadata: Option<TorrentMetadata>,
}

impl TorrentDescriptor {
    /// Descriptor for a torrent whose metadata is already available.
    #[must_use]
    pub fn from_metadata(
        info_hash: InfoHash,
        metadata: TorrentMetadata,
        trackers: Vec<TrackerEntry>,
        url_seeds: Vec<String>,
    ) -> Self {
        Self {
            kind: DescriptorKind::Metainfo,
            info_hash,
            name: metadata.name.clone(),
            trackers,
            url_seeds,
            metadata: Some(metadata),
        }
    }

    /// Engine parameter bundle for adding this torrent.
    #[must_use]
    pub fn add_torrent_params(&self) -> AddTorrentParams {
        AddTorrentParams {
            info_hash: self.info_hash,
            name: self.name.clone(),
            trackers: self.trackers.iter().map(|t| t.url.clone()).collect(),
            tracker_tiers: self.trackers.iter().map(|t| t.tier).collect(),
            url_seeds: self.url_seeds.clone(),
            metadata: self.metadata.clone(),
            save_path: None,
            flags: TorrentFlags::default(),
            file_priorities: Vec::new(),
            userdata: None,
        }
    }
}

/// Bit set of per-torrent engine flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TorrentFlags(u32);

impl TorrentFlags {
    /// Torrent is paused.
    pub const PAUSED: Self = Self(1);
    /// Torrent is subject to queue management.
    pub const AUTO_MANAGED: Self = Self(1 << 1);
    /// Torrent only uploads.
    pub const UPLOAD_MODE: Self = Self(1 << 2);
    /// Pieces are requested in order.
    pub const SEQUENTIAL_DOWNLOAD: Self = Self(1 << 3);
    /// Initial seeding mode.
    pub const SUPER_SEEDING: Self = Self(1 << 4);
    /// DHT is disabled for this torrent.
    pub const DISABLE_DHT: Self = Self(1 << 5);
    /// Peer exchange is disabled for this torrent.
    pub const DISABLE_PEX: Self = Self(1 << 6);
    /// Local service discovery is disabled for this torrent.
    pub const DISABLE_LSD: Self = Self(1 << 7);
    /// Torrent receives status update alerts.
    pub const UPDATE_SUBSCRIBE: Self = Self(1 << 8);
    /// Trackers from the parameters replace any stored in resume data.
    pub const OVERRIDE_TRACKERS: Self = Self(1 << 9);
    /// Web seeds from the parameters replace any stored in resume data.
    pub const OVERRIDE_WEB_SEEDS: Self = Self(1 << 10);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    pub const fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    pub const fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Set or clear the bits of `other`.
    pub const fn set(&mut self, other: Self, enabled: bool) {
        if enabled {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for TorrentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TorrentFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Slot the engine fills with the initial status of a torrent once its add completes.
#[derive(Debug, Clone, Default)]
pub struct ExtensionData {
    initial_status: Arc<Mutex<Option<TorrentStatus>>>,
}

impl ExtensionData {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the status observed when the torrent was attached.
    pub fn record(&self, status: TorrentStatus) {
        *self.initial_status.lock() = Some(status);
    }

    /// Status recorded by the engine, if the add has completed.
    #[must_use]
    pub fn initial_status(&self) -> Option<TorrentStatus> {
        self.initial_status.lock().clone()
    }
}

/// Parameter bundle consumed by the engine when adding a torrent.
#[derive(Debug, Clone)]
pub struct AddTorrentParams {
    /// Info hash identifying the torrent.
    pub info_hash: InfoHash,
    /// Display name.
    pub name: String,
    /// Announce URLs.
    pub trackers: Vec<String>,
    /// Tier of each URL in `trackers`.
    pub tracker_tiers: Vec<u8>,
    /// Web seed URLs.
    pub url_seeds: Vec<String>,
    /// Info dictionary when already known.
    pub metadata: Option<TorrentMetadata>,
    /// Download location.
    pub save_path: Option<PathBuf>,
    /// Engine flags applied at add time.
    pub flags: TorrentFlags,
    /// Initial per-file priorities.
    pub file_priorities: Vec<DownloadPriority>,
    /// Status slot populated by the engine after the add.
    pub userdata: Option<ExtensionData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TrackerEntry;

    fn metadata() -> TorrentMetadata {
        TorrentMetadata {
            name: "album".to_string(),
            piece_length: 16,
            files: vec![
                FileSpec {
                    path: "album/a.flac".to_string(),
                    size: 20,
                },
                FileSpec {
                    path: "album/b.flac".to_string(),
                    size: 13,
                },
            ],
            info_bytes: Vec::new(),
            private: false,
        }
    }

    #[test]
    fn piece_count_rounds_up() {
        assert_eq!(metadata().piece_count(), 3);
    }

    #[test]
    fn params_keep_tracker_tiers_aligned() {
        let descriptor = TorrentDescriptor::from_metadata(
            InfoHash::from_bytes([7; 20]),
            metadata(),
            vec![
                TrackerEntry::new("http://a.example/announce", 0),
                TrackerEntry::new("http://b.example/announce", 3),
            ],
            vec![],
        );
        let params = descriptor.add_torrent_params();
        assert_eq!(params.trackers.len(), params.tracker_tiers.len());
        assert_eq!(params.tracker_tiers, vec![0, 3]);
        assert_eq!(params.name, "album");
    }

    #[test]
    fn flags_compose() {
        let mut flags = TorrentFlags::PAUSED | TorrentFlags::AUTO_MANAGED;
        assert!(flags.contains(TorrentFlags::PAUSED));
        flags.remove(TorrentFlags::PAUSED);
        assert!(!flags.contains(TorrentFlags::PAUSED));
        assert!(flags.contains(TorrentFlags::AUTO_MANAGED));
        flags.set(TorrentFlags::UPLOAD_MODE, true);
        assert!(flags.contains(TorrentFlags::UPLOAD_MODE));
    }
}
