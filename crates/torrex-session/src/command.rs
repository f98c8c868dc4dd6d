use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use torrex_torrent_core::{
    OperatingMode, ResumeDataFlags, TorrentDescriptor, TorrentStatus, TrackerEntry,
};
use uuid::Uuid;

use crate::handle::EngineHandle;
use crate::native::IpFilter;
use crate::types::{AddTorrentOptions, SessionRuntimeConfig};

/// Commands accepted by the session worker.
#[derive(Debug)]
pub enum SessionCommand {
    /// Queue an asynchronous add.
    Add {
        /// Torrent to add.
        descriptor: Box<TorrentDescriptor>,
        /// Per-add options.
        options: AddTorrentOptions,
    },
    /// Remove a torrent and its partial-piece file.
    Remove {
        /// Torrent identifier.
        id: Uuid,
    },
    /// Pause the whole session.
    PauseSession,
    /// Resume the whole session.
    ResumeSession,
    /// Start one torrent.
    Start {
        /// Torrent identifier.
        id: Uuid,
        /// Scheduling mode.
        mode: OperatingMode,
    },
    /// Stop one torrent.
    Stop {
        /// Torrent identifier.
        id: Uuid,
    },
    /// Replace a torrent's native object, keeping its queue position.
    Reload {
        /// Torrent identifier.
        id: Uuid,
        /// Descriptor used for the re-add.
        descriptor: Box<TorrentDescriptor>,
        /// Re-add in the stopped state.
        is_stopped: bool,
        /// Scheduling mode when not stopped.
        mode: OperatingMode,
        /// Channel used to return the post-reload status.
        respond_to: oneshot::Sender<anyhow::Result<TorrentStatus>>,
    },
    /// Append a block rule for one address.
    BlockIp(IpAddr),
    /// Replace the IP filter.
    SetIpFilter(IpFilter),
    /// Toggle both port mappers.
    SetPortMappingEnabled(bool),
    /// Map ports.
    AddMappedPorts(Vec<u16>),
    /// Unmap ports.
    RemoveMappedPorts(Vec<u16>),
    /// Apply a runtime configuration.
    ApplyConfig(Box<SessionRuntimeConfig>),
    /// Append trackers to a torrent.
    AddTrackers {
        /// Torrent identifier.
        id: Uuid,
        /// Trackers to append.
        trackers: Vec<TrackerEntry>,
    },
    /// Remove trackers by URL.
    RemoveTrackers {
        /// Torrent identifier.
        id: Uuid,
        /// URLs to drop.
        urls: Vec<String>,
    },
    /// Replace a torrent's tracker list.
    ReplaceTrackers {
        /// Torrent identifier.
        id: Uuid,
        /// New tracker list.
        trackers: Vec<TrackerEntry>,
    },
    /// Ask the engine for resume data; the payload is persisted when it arrives.
    RequestResumeData {
        /// Torrent identifier.
        id: Uuid,
        /// Generation flags.
        flags: ResumeDataFlags,
    },
    /// Look up a torrent handle.
    QueryHandle {
        /// Torrent identifier.
        id: Uuid,
        /// Channel used to return the handle.
        respond_to: oneshot::Sender<Option<Arc<EngineHandle>>>,
    },
    /// List loaded torrents.
    QueryTorrents {
        /// Channel used to return the identifiers.
        respond_to: oneshot::Sender<Vec<Uuid>>,
    },
    /// Whether the session is listening.
    QueryListening {
        /// Channel used to return the flag.
        respond_to: oneshot::Sender<bool>,
    },
    /// Ports currently mapped.
    QueryMappedPorts {
        /// Channel used to return the ports.
        respond_to: oneshot::Sender<Vec<u16>>,
    },
    /// Detach the engine and dispose of it after `grace`.
    Shutdown {
        /// Time engine-internal work gets to drain.
        grace: Duration,
        /// Signalled once the engine is released.
        respond_to: oneshot::Sender<()>,
    },
}

impl SessionCommand {
    /// Short name for logs and error context.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::PauseSession => "pause_session",
            Self::ResumeSession => "resume_session",
            Self::Start { .. } => "start",
            Self::Stop { .. } => "stop",
            Self::Reload { .. } => "reload",
            Self::BlockIp(_) => "block_ip",
            Self::SetIpFilter(_) => "set_ip_filter",
            Self::SetPortMappingEnabled(_) => "set_port_mapping_enabled",
            Self::AddMappedPorts(_) => "add_mapped_ports",
            Self::RemoveMappedPorts(_) => "remove_mapped_ports",
            Self::ApplyConfig(_) => "apply_config",
            Self::AddTrackers { .. } => "add_trackers",
            Self::RemoveTrackers { .. } => "remove_trackers",
            Self::ReplaceTrackers { .. } => "replace_trackers",
            Self::RequestResumeData { .. } => "request_resume_data",
            Self::QueryHandle { .. } => "query_handle",
            Self::QueryTorrents { .. } => "query_torrents",
            Self::QueryListening { .. } => "query_listening",
            Self::QueryMappedPorts { .. } => "query_mapped_ports",
            Self::Shutdown { .. } => "shutdown",
        }
    }
}
