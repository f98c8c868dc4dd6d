//! Core torrent domain types shared across the workspace.

mod descriptor;
mod info_hash;
mod priority;
mod tracker;

pub use descriptor::{
    AddTorrentParams, DescriptorKind, ExtensionData, FileSpec, TorrentDescriptor, TorrentFlags,
    TorrentMetadata,
};
pub use info_hash::{INFO_HASH_LEN, InfoHash};
pub use priority::DownloadPriority;
pub use tracker::{
    EndpointKey, TrackerEndpointEntry, TrackerEntry, TrackerStatus, parse_tracker_entries,
};

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use torrex_events::{TorrentSnapshot, TorrentState};

/// How a started torrent is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Subject to the session's queue limits.
    #[default]
    AutoManaged,
    /// Runs regardless of queue limits.
    Forced,
}

/// Snapshot of a torrent as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentStatus {
    /// Info hash of the torrent.
    pub info_hash: InfoHash,
    /// Display name.
    pub name: String,
    /// Lifecycle state.
    pub state: TorrentState,
    /// Completed fraction in `[0, 1]`.
    pub progress: f64,
    /// Position in the download queue; `None` when not queued.
    pub queue_position: Option<u32>,
    /// Whether the torrent is paused.
    pub paused: bool,
    /// Whether the torrent is under queue management.
    pub auto_managed: bool,
    /// Whether the torrent only uploads.
    pub upload_mode: bool,
    /// Latched error message, if any.
    pub error: Option<String>,
}

impl TorrentStatus {
    /// Bus representation of this status.
    #[must_use]
    pub fn snapshot(&self) -> TorrentSnapshot {
        TorrentSnapshot {
            info_hash: self.info_hash.to_hex(),
            name: self.name.clone(),
            state: self.state,
            progress: self.progress,
            queue_position: self.queue_position,
            paused: self.paused,
            auto_managed: self.auto_managed,
            upload_mode: self.upload_mode,
            error: self.error.clone(),
        }
    }
}

/// A connected (or connecting) peer.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Remote address.
    pub address: SocketAddr,
    /// Client identification string.
    pub client: String,
    /// Fraction of the torrent the peer has.
    pub progress: f64,
    /// Handshake still in progress.
    pub connecting: bool,
    /// Peer has the complete torrent.
    pub seed: bool,
    /// Learned from a tracker.
    pub from_tracker: bool,
    /// Learned from the DHT.
    pub from_dht: bool,
    /// Learned from peer exchange.
    pub from_pex: bool,
    /// Learned from local service discovery.
    pub from_lsd: bool,
}

/// Options for a resume data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResumeDataFlags {
    /// Flush the disk cache before generating resume data.
    pub flush_disk_cache: bool,
    /// Embed the info dictionary.
    pub save_info_dict: bool,
    /// Skip torrents that did not change since the last save.
    pub only_if_modified: bool,
}

/// TLS material for SSL torrents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SslParameters {
    /// PEM encoded certificate.
    pub certificate: Vec<u8>,
    /// PEM encoded private key.
    pub private_key: Vec<u8>,
    /// PEM encoded Diffie-Hellman parameters.
    pub dh_params: Vec<u8>,
}

impl SslParameters {
    /// All three parts are present.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.certificate.is_empty() && !self.private_key.is_empty() && !self.dh_params.is_empty()
    }
}

/// A piece currently being downloaded.
pub type PieceIndex = u32;

/// Metadata returned by the torrent-file query, with piece hashes when the engine kept them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFileInfo {
    /// Decoded metadata.
    pub metadata: TorrentMetadata,
    /// Piece hashes; empty when the engine only kept the bare info dictionary.
    pub piece_hashes: Vec<[u8; 20]>,
}
