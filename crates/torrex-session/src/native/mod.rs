//! Narrow facade over the native engine.
//!
//! # Design
//! - The engine is reached only through `NativeSession` and `NativeTorrent`.
//! - Engine failures surface as `NativeError` values; nothing panics across the boundary.
//! - Asynchronous outcomes are reported through the `Alert` queue.

mod filters;
mod memory;
mod settings;

pub use filters::{IpAccess, IpFilter, IpRange, PeerClassFilter, PeerClassTypeFilter, SocketKind};
pub use memory::{AnnounceOutcome, MemoryEngine};
pub use settings::{SettingKey, SettingValue, SettingsPack};

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use torrex_torrent_core::{
    AddTorrentParams, DownloadPriority, InfoHash, PeerInfo, PieceIndex, ResumeDataFlags,
    SslParameters, TorrentFileInfo, TorrentFlags, TorrentStatus, TrackerEntry,
};

/// Shared reference to a live native torrent.
pub type NativeTorrentRef = Arc<dyn NativeTorrent>;

/// Callback the engine invokes from its own thread when the alert queue becomes non-empty.
pub type AlertNotify = Box<dyn Fn() + Send + Sync>;

/// Failure reported by a native engine call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("native engine call failed")]
pub struct NativeError {
    /// Engine operation that failed.
    pub operation: &'static str,
    /// Engine supplied detail.
    pub message: String,
}

impl NativeError {
    /// Build an error for `operation`.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Result alias for native engine calls.
pub type NativeResult<T> = Result<T, NativeError>;

/// Identifier of one port mapping created by a NAT traversal mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortMappingHandle(pub u32);

/// Transport a port mapping applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortProtocol {
    /// TCP mapping.
    Tcp,
    /// UDP mapping.
    Udp,
}

/// Flags accepted by torrent removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RemoveFlags {
    /// Delete downloaded files.
    pub delete_files: bool,
    /// Delete the partial-piece file.
    pub delete_partfile: bool,
}

impl RemoveFlags {
    /// Remove and delete only the partial-piece file.
    pub const DELETE_PARTFILE: Self = Self {
        delete_files: false,
        delete_partfile: true,
    };
}

/// Asynchronous notification produced by the engine.
#[derive(Debug, Clone)]
pub enum Alert {
    /// An asynchronous add finished.
    AddTorrent {
        /// Info hash from the add parameters.
        info_hash: InfoHash,
        /// Display name from the add parameters.
        name: String,
        /// New torrent reference, or the failure detail.
        result: Result<NativeTorrentRef, NativeError>,
    },
    /// A torrent was removed from the session.
    TorrentRemoved {
        /// Info hash of the removed torrent.
        info_hash: InfoHash,
    },
    /// Status snapshots requested with `post_torrent_updates`.
    StateUpdate {
        /// Changed torrents.
        statuses: Vec<TorrentStatus>,
    },
    /// Counters requested with `post_session_stats`.
    SessionStats {
        /// Counter values keyed by name.
        counters: BTreeMap<String, i64>,
    },
    /// A tracker answered an announce.
    TrackerReply {
        /// Torrent the tracker belongs to.
        info_hash: InfoHash,
        /// Tracker URL.
        url: String,
        /// Number of peers returned.
        num_peers: i32,
    },
    /// A tracker announce failed.
    TrackerError {
        /// Torrent the tracker belongs to.
        info_hash: InfoHash,
        /// Tracker URL.
        url: String,
        /// Failure detail.
        message: String,
    },
    /// The session bound a listening socket.
    ListenSucceeded {
        /// Bound endpoint.
        endpoint: SocketAddr,
    },
    /// The session failed to bind a listening socket.
    ListenFailed {
        /// Failure detail.
        message: String,
    },
    /// A port mapping was established by a mapper.
    PortMapped {
        /// Mapping handle.
        handle: PortMappingHandle,
        /// External port.
        external_port: u16,
    },
    /// A port mapping failed.
    PortMapError {
        /// Mapping handle.
        handle: PortMappingHandle,
        /// Failure detail.
        message: String,
    },
    /// Resume data generated for a torrent.
    SaveResumeData {
        /// Torrent the payload belongs to.
        info_hash: InfoHash,
        /// Serialized resume payload.
        payload: Vec<u8>,
    },
    /// Resume data could not be generated.
    SaveResumeDataFailed {
        /// Torrent the request targeted.
        info_hash: InfoHash,
        /// Failure detail.
        message: String,
    },
    /// Metadata became available for a magnet torrent.
    MetadataReceived {
        /// Torrent that received metadata.
        info_hash: InfoHash,
    },
    /// The engine latched an error on a torrent.
    TorrentError {
        /// Torrent with the error.
        info_hash: InfoHash,
        /// Failure detail.
        message: String,
    },
}

impl Alert {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AddTorrent { .. } => "add_torrent",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::StateUpdate { .. } => "state_update",
            Self::SessionStats { .. } => "session_stats",
            Self::TrackerReply { .. } => "tracker_reply",
            Self::TrackerError { .. } => "tracker_error",
            Self::ListenSucceeded { .. } => "listen_succeeded",
            Self::ListenFailed { .. } => "listen_failed",
            Self::PortMapped { .. } => "portmap",
            Self::PortMapError { .. } => "portmap_error",
            Self::SaveResumeData { .. } => "save_resume_data",
            Self::SaveResumeDataFailed { .. } => "save_resume_data_failed",
            Self::MetadataReceived { .. } => "metadata_received",
            Self::TorrentError { .. } => "torrent_error",
        }
    }
}

/// Detached session left behind by `abort`; dropping it releases engine resources.
pub trait NativeSessionProxy: Send {
    /// Finish outstanding engine work and release resources.
    fn shutdown(self: Box<Self>);
}

/// Session-wide engine operations.
pub trait NativeSession: Send + Sync {
    /// Pause every torrent.
    fn pause(&self);
    /// Resume the session.
    fn resume(&self);
    /// Whether the session is paused.
    fn is_paused(&self) -> bool;
    /// Queue an add; the outcome arrives as [`Alert::AddTorrent`].
    fn async_add_torrent(&self, params: AddTorrentParams);
    /// Add a torrent and return its reference.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the engine rejects the parameters.
    fn add_torrent(&self, params: AddTorrentParams) -> NativeResult<NativeTorrentRef>;
    /// Decode a payload produced by [`NativeTorrent::save_resume_data`] into add parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the payload is not valid resume data.
    fn read_resume_data(&self, payload: &[u8]) -> NativeResult<AddTorrentParams>;
    /// Remove a torrent; its reference becomes invalid.
    fn remove_torrent(&self, torrent: &NativeTorrentRef, flags: RemoveFlags);
    /// Look up a live torrent.
    fn find_torrent(&self, info_hash: &InfoHash) -> Option<NativeTorrentRef>;
    /// Current IP filter.
    fn ip_filter(&self) -> IpFilter;
    /// Replace the IP filter.
    fn set_ip_filter(&self, filter: IpFilter);
    /// Replace the peer class filter.
    fn set_peer_class_filter(&self, filter: PeerClassFilter);
    /// Replace the peer class type filter.
    fn set_peer_class_type_filter(&self, filter: PeerClassTypeFilter);
    /// Apply a settings delta.
    fn apply_settings(&self, settings: SettingsPack);
    /// Current settings.
    fn settings(&self) -> SettingsPack;
    /// Ask every enabled mapper to map `external_port`; returns one handle per mapper.
    fn add_port_mapping(
        &self,
        protocol: PortProtocol,
        external_port: u16,
        local_port: u16,
    ) -> Vec<PortMappingHandle>;
    /// Remove a mapping.
    fn delete_port_mapping(&self, handle: PortMappingHandle);
    /// Block up to `timeout` until an alert is queued; returns whether one is.
    fn wait_for_alert(&self, timeout: Duration) -> bool;
    /// Drain the alert queue.
    fn pop_alerts(&self) -> Vec<Alert>;
    /// Install the alert-ready callback.
    fn set_alert_notify(&self, notify: AlertNotify);
    /// Whether a listening socket is bound.
    fn is_listening(&self) -> bool;
    /// Request status alerts for torrents that changed.
    fn post_torrent_updates(&self);
    /// Request a session counters alert.
    fn post_session_stats(&self);
    /// Detach the session for asynchronous teardown.
    fn abort(&self) -> Box<dyn NativeSessionProxy>;
}

/// Per-torrent engine operations.
pub trait NativeTorrent: Send + Sync {
    /// Info hash of the torrent.
    fn info_hash(&self) -> InfoHash;
    /// False once the torrent was removed from its session.
    fn is_valid(&self) -> bool;
    /// Current status snapshot.
    fn status(&self) -> TorrentStatus;
    /// Queue position, `None` when not queued.
    fn queue_position(&self) -> Option<u32>;
    /// Move the torrent in the queue.
    fn queue_position_set(&self, position: u32);
    /// Current flags.
    fn flags(&self) -> TorrentFlags;
    /// Set flags.
    fn set_flags(&self, flags: TorrentFlags);
    /// Clear flags.
    fn unset_flags(&self, flags: TorrentFlags);
    /// Clear a latched error.
    fn clear_error(&self);
    /// Pause the torrent.
    fn pause(&self);
    /// Resume the torrent.
    fn resume(&self);
    /// Re-verify data on disk.
    fn force_recheck(&self);
    /// Announce to one tracker, or all when `None`.
    fn force_reannounce(&self, tracker_index: Option<usize>);
    /// Announce to the DHT.
    fn force_dht_announce(&self);
    /// Append a tracker.
    fn add_tracker(&self, tracker: TrackerEntry);
    /// Replace the tracker list.
    fn replace_trackers(&self, trackers: Vec<TrackerEntry>);
    /// Current tracker list with announce status.
    fn trackers(&self) -> Vec<TrackerEntry>;
    /// Add a web seed.
    fn add_url_seed(&self, url: &str);
    /// Remove a web seed.
    fn remove_url_seed(&self, url: &str);
    /// Current web seeds.
    fn url_seeds(&self) -> Vec<String>;
    /// Connect to a peer.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the engine refuses the connection attempt.
    fn connect_peer(&self, address: SocketAddr) -> NativeResult<()>;
    /// Disconnect every peer.
    fn clear_peers(&self);
    /// Supply metadata for a magnet torrent.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the payload is not a usable info dictionary.
    fn set_metadata(&self, info_bytes: &[u8]) -> NativeResult<()>;
    /// Install TLS material.
    fn set_ssl_certificate(&self, params: &SslParameters);
    /// Upload limit in bytes per second, `0` for unlimited.
    fn set_upload_limit(&self, limit: i32);
    /// Download limit in bytes per second, `0` for unlimited.
    fn set_download_limit(&self, limit: i32);
    /// Current upload limit.
    fn upload_limit(&self) -> i32;
    /// Current download limit.
    fn download_limit(&self) -> i32;
    /// Flush the disk cache.
    fn flush_cache(&self);
    /// Rename a file in storage.
    fn rename_file(&self, index: usize, new_path: &str);
    /// Set file priorities.
    fn prioritize_files(&self, priorities: &[DownloadPriority]);
    /// Current file priorities.
    fn file_priorities(&self) -> Vec<DownloadPriority>;
    /// Set piece priorities.
    fn prioritize_pieces(&self, priorities: &[DownloadPriority]);
    /// Current piece priorities.
    fn piece_priorities(&self) -> Vec<DownloadPriority>;
    /// Request resume data; the outcome arrives as an alert.
    fn save_resume_data(&self, flags: ResumeDataFlags);
    /// Connected peers.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the torrent is no longer valid.
    fn get_peer_info(&self) -> NativeResult<Vec<PeerInfo>>;
    /// Pieces with outstanding block requests.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the torrent is no longer valid.
    fn get_download_queue(&self) -> NativeResult<Vec<PieceIndex>>;
    /// Number of peers having each piece.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the torrent is no longer valid.
    fn piece_availability(&self) -> NativeResult<Vec<i32>>;
    /// Metadata including piece hashes, when retained.
    fn torrent_file_with_hashes(&self) -> Option<TorrentFileInfo>;
    /// Metadata without piece hashes.
    fn torrent_file(&self) -> Option<TorrentFileInfo>;
}

impl fmt::Debug for dyn NativeTorrent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeTorrent")
            .field("info_hash", &self.info_hash())
            .field("valid", &self.is_valid())
            .finish()
    }
}
