//! Event payload types carried across the session backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier assigned to each event emitted on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced by the session and its models.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The engine finished adding a torrent and a handle now exists for it.
    TorrentAdded {
        /// Identifier assigned to the torrent handle.
        torrent_id: Uuid,
        /// Hex-encoded info hash used to correlate the add request.
        info_hash: String,
        /// Display name of the torrent.
        name: String,
    },
    /// The engine could not add a torrent.
    TorrentAddFailed {
        /// Hex-encoded info hash of the rejected torrent.
        info_hash: String,
        /// Engine supplied failure detail.
        message: String,
    },
    /// A torrent was removed from the session.
    TorrentRemoved {
        /// Identifier of the removed torrent.
        torrent_id: Uuid,
    },
    /// A torrent's native engine object was replaced in place.
    TorrentReloaded {
        /// Identifier of the reloaded torrent.
        torrent_id: Uuid,
        /// Status of the fresh engine object, with the queue position carried over.
        status: TorrentSnapshot,
    },
    /// Re-adding a torrent during reload failed; the torrent is absent from the engine.
    TorrentReloadFailed {
        /// Identifier of the torrent whose reload failed.
        torrent_id: Uuid,
        /// Engine supplied failure detail.
        message: String,
    },
    /// Wake signal: the engine has queued alerts for the consumer.
    AlertsReady,
    /// Trackers were appended to a torrent.
    TrackersAdded {
        /// Torrent that owns the trackers.
        torrent_id: Uuid,
        /// URLs of the new trackers.
        urls: Vec<String>,
    },
    /// Trackers were removed from a torrent.
    TrackersRemoved {
        /// Torrent that owned the trackers.
        torrent_id: Uuid,
        /// URLs of the removed trackers.
        urls: Vec<String>,
    },
    /// The tracker set of a torrent was replaced wholesale.
    TrackersChanged {
        /// Torrent whose tracker set changed.
        torrent_id: Uuid,
    },
    /// Announce results arrived for some of a torrent's trackers.
    TrackerEntriesUpdated {
        /// Torrent that owns the trackers.
        torrent_id: Uuid,
        /// URLs whose entries changed.
        urls: Vec<String>,
    },
    /// The set of files excluded from download changed.
    FilteredFilesChanged {
        /// Torrent whose file selection changed.
        torrent_id: Uuid,
    },
    /// The set of externally mapped ports changed.
    PortMappingChanged {
        /// Ports currently tracked as mapped.
        mapped_ports: Vec<u16>,
    },
    /// The engine gained or lost its listening endpoint.
    ListenStateChanged {
        /// Whether the session is listening for incoming connections.
        listening: bool,
    },
    /// Health state of session components changed.
    HealthChanged {
        /// Components currently marked as degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for logs and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TorrentAdded { .. } => "torrent_added",
            Self::TorrentAddFailed { .. } => "torrent_add_failed",
            Self::TorrentRemoved { .. } => "torrent_removed",
            Self::TorrentReloaded { .. } => "torrent_reloaded",
            Self::TorrentReloadFailed { .. } => "torrent_reload_failed",
            Self::AlertsReady => "alerts_ready",
            Self::TrackersAdded { .. } => "trackers_added",
            Self::TrackersRemoved { .. } => "trackers_removed",
            Self::TrackersChanged { .. } => "trackers_changed",
            Self::TrackerEntriesUpdated { .. } => "tracker_entries_updated",
            Self::FilteredFilesChanged { .. } => "filtered_files_changed",
            Self::PortMappingChanged { .. } => "port_mapping_changed",
            Self::ListenStateChanged { .. } => "listen_state_changed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }

    /// Torrent the event refers to, when it is torrent scoped.
    #[must_use]
    pub const fn torrent_id(&self) -> Option<Uuid> {
        match self {
            Self::TorrentAdded { torrent_id, .. }
            | Self::TorrentRemoved { torrent_id }
            | Self::TorrentReloaded { torrent_id, .. }
            | Self::TorrentReloadFailed { torrent_id, .. }
            | Self::TrackersAdded { torrent_id, .. }
            | Self::TrackersRemoved { torrent_id, .. }
            | Self::TrackersChanged { torrent_id }
            | Self::TrackerEntriesUpdated { torrent_id, .. }
            | Self::FilteredFilesChanged { torrent_id } => Some(*torrent_id),
            Self::TorrentAddFailed { .. }
            | Self::AlertsReady
            | Self::PortMappingChanged { .. }
            | Self::ListenStateChanged { .. }
            | Self::HealthChanged { .. } => None,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned by the bus.
    pub id: EventId,
    /// Wall-clock time the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}

/// Torrent status as carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentSnapshot {
    /// Hex-encoded info hash.
    pub info_hash: String,
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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// High-level torrent states that downstream consumers care about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TorrentState {
    /// Checking existing data on disk.
    Checking,
    /// Waiting for metadata from peers.
    FetchingMetadata,
    /// Actively downloading.
    Downloading,
    /// Download complete and seeding.
    Seeding,
    /// Paused by the user or awaiting a queue slot.
    Paused,
    /// The engine latched an error for the torrent.
    Errored,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_serde_tag() -> anyhow::Result<()> {
        let event = Event::TrackersAdded {
            torrent_id: Uuid::nil(),
            urls: vec!["udp://tracker.example:1337/announce".to_string()],
        };
        let json = serde_json::to_value(&event)?;
        assert_eq!(json["type"], event.kind());
        assert_eq!(event.torrent_id(), Some(Uuid::nil()));
        Ok(())
    }

    #[test]
    fn session_wide_events_have_no_torrent() {
        assert_eq!(Event::AlertsReady.torrent_id(), None);
        assert_eq!(
            Event::PortMappingChanged {
                mapped_ports: vec![6881]
            }
            .torrent_id(),
            None
        );
    }
}
