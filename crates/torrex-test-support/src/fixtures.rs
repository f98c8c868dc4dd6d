//! Descriptor and metadata fixtures.

use torrex_torrent_core::{FileSpec, InfoHash, TorrentDescriptor, TorrentMetadata, TrackerEntry};

/// Primary announce URL used by the fixtures.
pub const PRIMARY_TRACKER: &str = "http://tracker.example/announce";
/// Second-tier announce URL used by the fixtures.
pub const BACKUP_TRACKER: &str = "udp://backup.example:6969/announce";

/// Three-file album layout: two tracks and a nested cover image.
#[must_use]
pub fn sample_metadata() -> TorrentMetadata {
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
                size: 12,
            },
            FileSpec {
                path: "album/cover/front.jpg".to_string(),
                size: 8,
            },
        ],
        info_bytes: Vec::new(),
        private: false,
    }
}

/// Descriptor for [`sample_metadata`] with two tracker tiers.
#[must_use]
pub fn sample_descriptor() -> TorrentDescriptor {
    TorrentDescriptor::from_metadata(
        InfoHash::from_bytes([0xab; 20]),
        sample_metadata(),
        vec![
            TrackerEntry::new(PRIMARY_TRACKER, 0),
            TrackerEntry::new(BACKUP_TRACKER, 1),
        ],
        Vec::new(),
    )
}

/// Single-file descriptor whose info hash is `byte` repeated.
#[must_use]
pub fn descriptor_with_hash(byte: u8) -> TorrentDescriptor {
    let name = format!("torrent-{byte}");
    TorrentDescriptor::from_metadata(
        InfoHash::from_bytes([byte; 20]),
        TorrentMetadata {
            name: name.clone(),
            piece_length: 4,
            files: vec![FileSpec {
                path: format!("{name}/payload.bin"),
                size: 16,
            }],
            info_bytes: Vec::new(),
            private: false,
        },
        vec![TrackerEntry::new(PRIMARY_TRACKER, 0)],
        Vec::new(),
    )
}
