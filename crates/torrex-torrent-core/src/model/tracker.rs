use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Announce status reported for a tracker or one of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerStatus {
    /// No announce has been attempted yet.
    #[default]
    NotContacted,
    /// Last announce succeeded.
    Working,
    /// An announce is in flight.
    Updating,
    /// Last announce failed without a tracker-supplied reason.
    NotWorking,
    /// The tracker answered with an error.
    TrackerError,
    /// The tracker host could not be reached.
    Unreachable,
}

impl TrackerStatus {
    /// Human readable label for list views.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotContacted => "Not contacted yet",
            Self::Working => "Working",
            Self::Updating => "Updating...",
            Self::NotWorking => "Not working",
            Self::TrackerError => "Tracker error",
            Self::Unreachable => "Unreachable",
        }
    }
}

/// Key of an endpoint entry: the local endpoint name and the protocol version
/// it announced with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointKey {
    /// Local endpoint name, e.g. `192.168.0.2:6881`.
    pub name: String,
    /// BitTorrent protocol version (1 or 2).
    pub bt_version: u8,
}

impl EndpointKey {
    /// Build a key from its parts.
    #[must_use]
    pub fn new(name: impl Into<String>, bt_version: u8) -> Self {
        Self {
            name: name.into(),
            bt_version,
        }
    }
}

/// Status of a tracker as observed through one physical endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEndpointEntry {
    /// Local endpoint name.
    pub name: String,
    /// Protocol version used by this endpoint.
    pub bt_version: u8,
    /// Announce status.
    pub status: TrackerStatus,
    /// Tracker supplied message.
    pub message: String,
    /// Peers returned by the tracker, `-1` when unknown.
    pub num_peers: i32,
    /// Seeds reported by the tracker, `-1` when unknown.
    pub num_seeds: i32,
    /// Leeches reported by the tracker, `-1` when unknown.
    pub num_leeches: i32,
    /// Completed downloads reported by the tracker, `-1` when unknown.
    pub num_downloaded: i32,
    /// Time of the next scheduled announce.
    pub next_announce_time: Option<DateTime<Utc>>,
    /// Earliest time a manual announce is allowed.
    pub min_announce_time: Option<DateTime<Utc>>,
}

impl Default for TrackerEndpointEntry {
    fn default() -> Self {
        Self {
            name: String::new(),
            bt_version: 1,
            status: TrackerStatus::NotContacted,
            message: String::new(),
            num_peers: -1,
            num_seeds: -1,
            num_leeches: -1,
            num_downloaded: -1,
            next_announce_time: None,
            min_announce_time: None,
        }
    }
}

impl TrackerEndpointEntry {
    /// Key under which the entry is stored in its tracker.
    #[must_use]
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.name.clone(), self.bt_version)
    }
}

/// One announce URL of a torrent together with its aggregate and per-endpoint status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerEntry {
    /// Announce URL; unique within a torrent.
    pub url: String,
    /// Tier, lower tiers are announced to first.
    pub tier: u8,
    /// Aggregate announce status.
    pub status: TrackerStatus,
    /// Tracker supplied message.
    pub message: String,
    /// Peers returned by the tracker, `-1` when unknown.
    pub num_peers: i32,
    /// Seeds reported by the tracker, `-1` when unknown.
    pub num_seeds: i32,
    /// Leeches reported by the tracker, `-1` when unknown.
    pub num_leeches: i32,
    /// Completed downloads reported by the tracker, `-1` when unknown.
    pub num_downloaded: i32,
    /// Time of the next scheduled announce.
    pub next_announce_time: Option<DateTime<Utc>>,
    /// Earliest time a manual announce is allowed.
    pub min_announce_time: Option<DateTime<Utc>>,
    /// Per-endpoint status keyed by endpoint name and protocol version.
    #[serde(default)]
    pub endpoints: BTreeMap<EndpointKey, TrackerEndpointEntry>,
}

impl TrackerEntry {
    /// A fresh, not yet contacted tracker.
    #[must_use]
    pub fn new(url: impl Into<String>, tier: u8) -> Self {
        Self {
            url: url.into(),
            tier,
            status: TrackerStatus::NotContacted,
            message: String::new(),
            num_peers: -1,
            num_seeds: -1,
            num_leeches: -1,
            num_downloaded: -1,
            next_announce_time: None,
            min_announce_time: None,
            endpoints: BTreeMap::new(),
        }
    }

    /// Insert or replace an endpoint entry under its key.
    pub fn upsert_endpoint(&mut self, endpoint: TrackerEndpointEntry) {
        self.endpoints.insert(endpoint.key(), endpoint);
    }
}

/// Parse a newline separated tracker list. Blank lines start a new tier.
#[must_use]
pub fn parse_tracker_entries(text: &str) -> Vec<TrackerEntry> {
    let mut tier: u8 = 0;
    let mut entries = Vec::new();
    for line in text.split('\n') {
        let url = line.trim();
        if url.is_empty() {
            tier = tier.saturating_add(1);
            continue;
        }
        entries.push(TrackerEntry::new(url, tier));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_advance_tiers() {
        let entries = parse_tracker_entries(
            "udp://a.example:80/announce\r\nhttp://b.example/announce\n\nhttp://c.example/announce\n",
        );
        let tiers: Vec<(&str, u8)> = entries
            .iter()
            .map(|entry| (entry.url.as_str(), entry.tier))
            .collect();
        assert_eq!(
            tiers,
            vec![
                ("udp://a.example:80/announce", 0),
                ("http://b.example/announce", 0),
                ("http://c.example/announce", 1),
            ]
        );
    }

    #[test]
    fn new_entries_use_unknown_counts() {
        let entry = TrackerEntry::new("http://t.example/announce", 2);
        assert_eq!(entry.num_peers, -1);
        assert_eq!(entry.num_downloaded, -1);
        assert_eq!(entry.status, TrackerStatus::NotContacted);
        assert_eq!(TrackerEndpointEntry::default().bt_version, 1);
    }

    #[test]
    fn endpoints_are_keyed_by_name_and_version() {
        let mut entry = TrackerEntry::new("http://t.example/announce", 0);
        let v1 = TrackerEndpointEntry {
            name: "10.0.0.2:6881".to_string(),
            ..TrackerEndpointEntry::default()
        };
        let v2 = TrackerEndpointEntry {
            bt_version: 2,
            ..v1.clone()
        };
        entry.upsert_endpoint(v1.clone());
        entry.upsert_endpoint(v2);
        entry.upsert_endpoint(v1);
        assert_eq!(entry.endpoints.len(), 2);
    }
}
