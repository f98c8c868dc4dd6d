//! Tracker list: three sticky discovery rows followed by one row per tracker
//! URL, each owning one child row per announcing endpoint.
//!
//! # Design
//! - Rows are keyed by URL and endpoint children by `(name, protocol)`; each
//!   row carries a [`RowId`] that survives in-place updates.
//! - Reconciliation runs updates first, then removals, then appends, so
//!   structural notifications always precede the data changes they enable.
//! - Announce countdowns are derived from a reference timestamp that
//!   [`announce_refresh_loop`] moves forward once per second.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use torrex_events::Event;
use torrex_torrent_core::{
    EndpointKey, PeerInfo, TrackerEndpointEntry, TrackerEntry, TrackerSource, TrackerStatus,
};
use tracing::debug;
use uuid::Uuid;

use crate::change::{ChangeQueue, ModelChange};

/// Notification type emitted by [`TrackerListModel`].
pub type TrackerListChange = ModelChange<RowId, TrackerColumn>;

/// Number of synthetic rows preceding the real trackers.
pub const STICKY_ROW_COUNT: usize = 3;

/// Period of the announce countdown refresh.
pub const ANNOUNCE_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

const ROW_DHT: usize = 0;
const ROW_PEX: usize = 1;
const ROW_LSD: usize = 2;
const STICKY_NAMES: [&str; STICKY_ROW_COUNT] = ["** [DHT] **", "** [PeX] **", "** [LSD] **"];

const STATUS_WORKING: &str = "Working";
const STATUS_DISABLED: &str = "Disabled";
const STATUS_TORRENT_DISABLED: &str = "Disabled for this torrent";
const PRIVATE_MESSAGE: &str = "This torrent is private";

/// Stable identity of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(u64);

/// Columns exposed by the tracker list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackerColumn {
    /// Tracker URL or endpoint name.
    Url,
    /// Tier of a tracker.
    Tier,
    /// Protocol version of an endpoint.
    Protocol,
    /// Announce status.
    Status,
    /// Peers returned by the last announce.
    Peers,
    /// Seeds.
    Seeds,
    /// Leeches.
    Leeches,
    /// Completed downloads.
    TimesDownloaded,
    /// Tracker message.
    Message,
    /// Time until the next announce.
    NextAnnounce,
    /// Time until a manual announce is allowed.
    MinAnnounce,
}

/// Session-wide discovery switches shown on the sticky rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFeatures {
    /// Distributed hash table enabled.
    pub dht: bool,
    /// Peer exchange enabled.
    pub pex: bool,
    /// Local service discovery enabled.
    pub lsd: bool,
}

impl Default for SessionFeatures {
    fn default() -> Self {
        Self {
            dht: true,
            pex: true,
            lsd: true,
        }
    }
}

/// Ticket for a peer snapshot requested by [`TrackerListModel::set_torrent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCountRequest {
    torrent_id: Uuid,
    generation: u64,
}

impl PeerCountRequest {
    /// Torrent whose peers should be fetched.
    #[must_use]
    pub const fn torrent_id(&self) -> Uuid {
        self.torrent_id
    }
}

/// One tracker, endpoint or sticky row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerRow {
    id: RowId,
    name: String,
    tier: Option<u8>,
    bt_version: Option<u8>,
    status: TrackerStatus,
    message: String,
    num_peers: i32,
    num_seeds: i32,
    num_leeches: i32,
    num_downloaded: i32,
    next_announce: Option<DateTime<Utc>>,
    min_announce: Option<DateTime<Utc>>,
    children: Vec<Self>,
}

impl TrackerRow {
    const fn blank(id: RowId, name: String) -> Self {
        Self {
            id,
            name,
            tier: None,
            bt_version: None,
            status: TrackerStatus::NotContacted,
            message: String::new(),
            num_peers: -1,
            num_seeds: -1,
            num_leeches: -1,
            num_downloaded: -1,
            next_announce: None,
            min_announce: None,
            children: Vec::new(),
        }
    }

    fn fill_tracker(&mut self, entry: &TrackerEntry) {
        self.tier = Some(entry.tier);
        self.status = entry.status;
        self.message.clone_from(&entry.message);
        self.num_peers = entry.num_peers;
        self.num_seeds = entry.num_seeds;
        self.num_leeches = entry.num_leeches;
        self.num_downloaded = entry.num_downloaded;
        self.next_announce = entry.next_announce_time;
        self.min_announce = entry.min_announce_time;
    }

    fn fill_endpoint(&mut self, endpoint: &TrackerEndpointEntry) {
        self.status = endpoint.status;
        self.message.clone_from(&endpoint.message);
        self.num_peers = endpoint.num_peers;
        self.num_seeds = endpoint.num_seeds;
        self.num_leeches = endpoint.num_leeches;
        self.num_downloaded = endpoint.num_downloaded;
        self.next_announce = endpoint.next_announce_time;
        self.min_announce = endpoint.min_announce_time;
    }

    fn endpoint_key(&self) -> EndpointKey {
        EndpointKey::new(self.name.clone(), self.bt_version.unwrap_or_default())
    }

    /// Row identity.
    #[must_use]
    pub const fn id(&self) -> RowId {
        self.id
    }

    /// URL, endpoint name or sticky label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tier of a tracker row.
    #[must_use]
    pub const fn tier(&self) -> Option<u8> {
        self.tier
    }

    /// Protocol version of an endpoint row.
    #[must_use]
    pub const fn bt_version(&self) -> Option<u8> {
        self.bt_version
    }

    /// Announce status.
    #[must_use]
    pub const fn status(&self) -> TrackerStatus {
        self.status
    }

    /// Tracker supplied message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Peers, `-1` when unknown.
    #[must_use]
    pub const fn num_peers(&self) -> i32 {
        self.num_peers
    }

    /// Seeds, `-1` when unknown.
    #[must_use]
    pub const fn num_seeds(&self) -> i32 {
        self.num_seeds
    }

    /// Leeches, `-1` when unknown.
    #[must_use]
    pub const fn num_leeches(&self) -> i32 {
        self.num_leeches
    }

    /// Endpoint rows beneath a tracker.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }
}

/// Tracker rows of the selected torrent.
pub struct TrackerListModel {
    features: SessionFeatures,
    torrent: Option<Arc<dyn TrackerSource>>,
    rows: Vec<TrackerRow>,
    next_row_id: u64,
    generation: u64,
    announce_reference: DateTime<Utc>,
    changes: ChangeQueue<RowId, TrackerColumn>,
}

impl TrackerListModel {
    /// Empty model using `features` for the sticky row status.
    #[must_use]
    pub fn new(features: SessionFeatures) -> Self {
        Self {
            features,
            torrent: None,
            rows: Vec::new(),
            next_row_id: 0,
            generation: 0,
            announce_reference: Utc::now(),
            changes: ChangeQueue::default(),
        }
    }

    /// Replace the session-wide discovery switches.
    pub fn set_session_features(&mut self, features: SessionFeatures) {
        if self.features == features {
            return;
        }
        self.features = features;
        if self.torrent.is_some() {
            self.changes.push(ModelChange::DataChanged {
                parent: None,
                rows: 0..=STICKY_ROW_COUNT - 1,
                columns: TrackerColumn::Status..=TrackerColumn::Status,
            });
        }
    }

    /// Show the trackers of another torrent, or none.
    ///
    /// The returned request asks the caller to fetch the torrent's peers and
    /// hand them to [`Self::apply_peer_counts`].
    pub fn set_torrent(
        &mut self,
        torrent: Option<Arc<dyn TrackerSource>>,
    ) -> Option<PeerCountRequest> {
        self.changes.push(ModelChange::ResetBegin);
        self.rows.clear();
        self.generation = self.generation.wrapping_add(1);
        self.torrent = torrent;
        let request = self.torrent.clone().map(|torrent| self.populate(torrent.as_ref()));
        self.changes.push(ModelChange::ResetEnd);
        request
    }

    /// Identity of the shown torrent.
    #[must_use]
    pub fn torrent_id(&self) -> Option<Uuid> {
        self.torrent.as_ref().map(|torrent| torrent.torrent_id())
    }

    /// Count discovery peers into the sticky rows.
    ///
    /// Returns `false` when the request belongs to a torrent that is no longer
    /// shown.
    pub fn apply_peer_counts(&mut self, request: PeerCountRequest, peers: &[PeerInfo]) -> bool {
        if request.generation != self.generation
            || self.torrent_id() != Some(request.torrent_id)
            || self.rows.len() < STICKY_ROW_COUNT
        {
            debug!(torrent_id = %request.torrent_id, "dropping stale peer snapshot");
            return false;
        }

        let mut seeds = [0_i32; STICKY_ROW_COUNT];
        let mut leeches = [0_i32; STICKY_ROW_COUNT];
        for peer in peers.iter().filter(|peer| !peer.connecting) {
            let counts = if peer.seed { &mut seeds } else { &mut leeches };
            for (slot, learned) in [peer.from_dht, peer.from_pex, peer.from_lsd]
                .into_iter()
                .enumerate()
            {
                if learned {
                    counts[slot] = counts[slot].saturating_add(1);
                }
            }
        }
        for (row, (seeds, leeches)) in self.rows.iter_mut().zip(seeds.into_iter().zip(leeches)) {
            row.num_seeds = seeds;
            row.num_leeches = leeches;
        }

        self.changes.push(ModelChange::DataChanged {
            parent: None,
            rows: ROW_DHT..=ROW_LSD,
            columns: TrackerColumn::Seeds..=TrackerColumn::Leeches,
        });
        true
    }

    /// Append rows for newly added trackers; known URLs are skipped.
    pub fn on_trackers_added(&mut self, entries: &[TrackerEntry]) {
        if self.torrent.is_none() {
            return;
        }
        let mut appended: Vec<TrackerRow> = Vec::with_capacity(entries.len());
        for entry in entries {
            if self.tracker_index(&entry.url).is_some()
                || appended.iter().any(|row| row.name == entry.url)
            {
                continue;
            }
            let row = self.create_tracker_row(entry);
            appended.push(row);
        }
        self.append_rows(appended);
    }

    /// Drop the rows of removed trackers.
    pub fn on_trackers_removed(&mut self, urls: &[String]) {
        for url in urls {
            if let Some(index) = self.tracker_index(url) {
                self.remove_row(index);
            }
        }
    }

    /// Reconcile every row against the source's current tracker list.
    pub fn on_trackers_changed(&mut self) {
        let Some(torrent) = self.torrent.clone() else {
            return;
        };
        let entries = torrent.trackers();
        let current: HashSet<&str> = entries.iter().map(|entry| entry.url.as_str()).collect();

        let mut appended: Vec<TrackerRow> = Vec::new();
        for entry in &entries {
            if let Some(index) = self.tracker_index(&entry.url) {
                self.update_tracker_row(index, entry);
            } else if !appended.iter().any(|row| row.name == entry.url) {
                let row = self.create_tracker_row(entry);
                appended.push(row);
            }
        }

        let mut index = STICKY_ROW_COUNT;
        while index < self.rows.len() {
            if current.contains(self.rows[index].name.as_str()) {
                index += 1;
            } else {
                self.remove_row(index);
            }
        }

        self.changes.push(ModelChange::DataChanged {
            parent: None,
            rows: ROW_DHT..=ROW_LSD,
            columns: TrackerColumn::Url..=TrackerColumn::MinAnnounce,
        });
        self.append_rows(appended);
    }

    /// Apply fresh announce results to rows that already exist.
    pub fn on_tracker_entries_updated(&mut self, updated: &HashMap<String, TrackerEntry>) {
        for (url, entry) in updated {
            if let Some(index) = self.tracker_index(url) {
                self.update_tracker_row(index, entry);
            }
        }
    }

    /// Route a session event for the shown torrent to the matching handler.
    ///
    /// Returns `false` for events about other torrents or unrelated kinds.
    pub fn apply_event(&mut self, event: &Event) -> bool {
        let Some(torrent) = self.torrent.clone() else {
            return false;
        };
        if event.torrent_id() != Some(torrent.torrent_id()) {
            return false;
        }
        match event {
            Event::TrackersAdded { urls, .. } => {
                let added: Vec<TrackerEntry> = torrent
                    .trackers()
                    .into_iter()
                    .filter(|entry| urls.contains(&entry.url))
                    .collect();
                self.on_trackers_added(&added);
                true
            }
            Event::TrackersRemoved { urls, .. } => {
                self.on_trackers_removed(urls);
                true
            }
            Event::TrackersChanged { .. } => {
                self.on_trackers_changed();
                true
            }
            Event::TrackerEntriesUpdated { urls, .. } => {
                let updated: HashMap<String, TrackerEntry> = torrent
                    .trackers()
                    .into_iter()
                    .filter(|entry| urls.contains(&entry.url))
                    .map(|entry| (entry.url.clone(), entry))
                    .collect();
                self.on_tracker_entries_updated(&updated);
                true
            }
            _ => false,
        }
    }

    /// Recompute announce countdowns against `now`.
    ///
    /// Returns `false` when no torrent is shown, which ends the refresh loop.
    pub fn refresh_announce_times(&mut self, now: DateTime<Utc>) -> bool {
        if self.torrent.is_none() {
            return false;
        }
        self.announce_reference = now;
        if !self.rows.is_empty() {
            self.changes.push(ModelChange::DataChanged {
                parent: None,
                rows: 0..=self.rows.len() - 1,
                columns: TrackerColumn::NextAnnounce..=TrackerColumn::MinAnnounce,
            });
        }
        for row in &self.rows {
            if row.children.is_empty() {
                continue;
            }
            self.changes.push(ModelChange::DataChanged {
                parent: Some(row.id),
                rows: 0..=row.children.len() - 1,
                columns: TrackerColumn::NextAnnounce..=TrackerColumn::MinAnnounce,
            });
        }
        true
    }

    /// Top-level rows, sticky rows first.
    #[must_use]
    pub fn rows(&self) -> &[TrackerRow] {
        &self.rows
    }

    /// Row of a tracker URL.
    #[must_use]
    pub fn tracker(&self, url: &str) -> Option<&TrackerRow> {
        self.tracker_index(url).map(|index| &self.rows[index])
    }

    /// Seconds until the row's next announce, never negative.
    #[must_use]
    pub fn seconds_to_next_announce(&self, row: &TrackerRow) -> i64 {
        self.seconds_until(row.next_announce)
    }

    /// Seconds until a manual announce is allowed, never negative.
    #[must_use]
    pub fn seconds_to_min_announce(&self, row: &TrackerRow) -> i64 {
        self.seconds_until(row.min_announce)
    }

    /// Display text of a cell.
    #[must_use]
    pub fn text(&self, id: RowId, column: TrackerColumn) -> Option<String> {
        let (row, position) = self.locate(id)?;
        let endpoint = position.is_none();
        let sticky = position.filter(|index| *index < STICKY_ROW_COUNT);
        let text = match column {
            TrackerColumn::Url => row.name.clone(),
            TrackerColumn::Tier => match row.tier {
                Some(tier) if !endpoint && sticky.is_none() => tier.to_string(),
                _ => String::new(),
            },
            TrackerColumn::Protocol => row
                .bt_version
                .filter(|_| endpoint)
                .map(|version| format!("v{version}"))
                .unwrap_or_default(),
            TrackerColumn::Status => sticky.map_or_else(
                || row.status.label().to_string(),
                |index| self.sticky_status(index).to_string(),
            ),
            TrackerColumn::Peers => pretty_count(row.num_peers),
            TrackerColumn::Seeds => pretty_count(row.num_seeds),
            TrackerColumn::Leeches => pretty_count(row.num_leeches),
            TrackerColumn::TimesDownloaded => pretty_count(row.num_downloaded),
            TrackerColumn::Message => row.message.clone(),
            TrackerColumn::NextAnnounce => format_duration(self.seconds_to_next_announce(row)),
            TrackerColumn::MinAnnounce => format_duration(self.seconds_to_min_announce(row)),
        };
        Some(text)
    }

    /// Drain queued notifications.
    pub fn take_changes(&mut self) -> Vec<TrackerListChange> {
        self.changes.take()
    }

    fn populate(&mut self, torrent: &dyn TrackerSource) -> PeerCountRequest {
        for name in STICKY_NAMES {
            let id = self.allocate_id();
            self.rows.push(TrackerRow::blank(id, name.to_string()));
        }
        if torrent.is_private() {
            for row in &mut self.rows {
                row.message = PRIVATE_MESSAGE.to_string();
            }
        }
        for entry in torrent.trackers() {
            let row = self.create_tracker_row(&entry);
            self.rows.push(row);
        }
        self.announce_reference = Utc::now();
        debug!(
            torrent_id = %torrent.torrent_id(),
            trackers = self.rows.len() - STICKY_ROW_COUNT,
            "tracker list populated"
        );
        PeerCountRequest {
            torrent_id: torrent.torrent_id(),
            generation: self.generation,
        }
    }

    const fn allocate_id(&mut self) -> RowId {
        let id = RowId(self.next_row_id);
        self.next_row_id = self.next_row_id.wrapping_add(1);
        id
    }

    fn create_tracker_row(&mut self, entry: &TrackerEntry) -> TrackerRow {
        let id = self.allocate_id();
        let mut row = TrackerRow::blank(id, entry.url.clone());
        row.fill_tracker(entry);
        for endpoint in entry.endpoints.values() {
            let child = self.create_endpoint_row(endpoint);
            row.children.push(child);
        }
        row
    }

    fn create_endpoint_row(&mut self, endpoint: &TrackerEndpointEntry) -> TrackerRow {
        let id = self.allocate_id();
        let mut row = TrackerRow::blank(id, endpoint.name.clone());
        row.bt_version = Some(endpoint.bt_version);
        row.fill_endpoint(endpoint);
        row
    }

    fn tracker_index(&self, url: &str) -> Option<usize> {
        self.rows
            .iter()
            .skip(STICKY_ROW_COUNT)
            .position(|row| row.name == url)
            .map(|position| position + STICKY_ROW_COUNT)
    }

    fn append_rows(&mut self, appended: Vec<TrackerRow>) {
        if appended.is_empty() {
            return;
        }
        let first = self.rows.len();
        let rows = first..=first + appended.len() - 1;
        self.changes.push(ModelChange::RowsAboutToBeInserted {
            parent: None,
            rows: rows.clone(),
        });
        self.rows.extend(appended);
        self.changes
            .push(ModelChange::RowsInserted { parent: None, rows });
    }

    fn remove_row(&mut self, index: usize) {
        self.changes.push(ModelChange::RowsAboutToBeRemoved {
            parent: None,
            rows: index..=index,
        });
        self.rows.remove(index);
        self.changes.push(ModelChange::RowsRemoved {
            parent: None,
            rows: index..=index,
        });
    }

    fn update_tracker_row(&mut self, index: usize, entry: &TrackerEntry) {
        let parent = Some(self.rows[index].id);

        let mut child = 0;
        while child < self.rows[index].children.len() {
            let key = self.rows[index].children[child].endpoint_key();
            if let Some(endpoint) = entry.endpoints.get(&key) {
                self.rows[index].children[child].fill_endpoint(endpoint);
                child += 1;
            } else {
                self.changes.push(ModelChange::RowsAboutToBeRemoved {
                    parent,
                    rows: child..=child,
                });
                self.rows[index].children.remove(child);
                self.changes.push(ModelChange::RowsRemoved {
                    parent,
                    rows: child..=child,
                });
            }
        }

        let existing = self.rows[index].children.len();
        if existing > 0 {
            self.changes.push(ModelChange::DataChanged {
                parent,
                rows: 0..=existing - 1,
                columns: TrackerColumn::Url..=TrackerColumn::MinAnnounce,
            });
        }

        let known: HashSet<EndpointKey> = self.rows[index]
            .children
            .iter()
            .map(TrackerRow::endpoint_key)
            .collect();
        let fresh: Vec<TrackerRow> = entry
            .endpoints
            .iter()
            .filter(|(key, _)| !known.contains(*key))
            .map(|(_, endpoint)| self.create_endpoint_row(endpoint))
            .collect();
        if !fresh.is_empty() {
            let rows = existing..=existing + fresh.len() - 1;
            self.changes.push(ModelChange::RowsAboutToBeInserted {
                parent,
                rows: rows.clone(),
            });
            self.rows[index].children.extend(fresh);
            self.changes.push(ModelChange::RowsInserted { parent, rows });
        }

        self.rows[index].fill_tracker(entry);
        self.changes.push(ModelChange::DataChanged {
            parent: None,
            rows: index..=index,
            columns: TrackerColumn::Url..=TrackerColumn::MinAnnounce,
        });
    }

    /// Row and its top-level position; endpoints have no top-level position.
    fn locate(&self, id: RowId) -> Option<(&TrackerRow, Option<usize>)> {
        if let Some(index) = self.rows.iter().position(|row| row.id == id) {
            return Some((&self.rows[index], Some(index)));
        }
        self.rows
            .iter()
            .flat_map(|row| row.children.iter())
            .find(|child| child.id == id)
            .map(|child| (child, None))
    }

    fn sticky_status(&self, index: usize) -> &'static str {
        let Some(torrent) = self.torrent.as_ref() else {
            return "";
        };
        let (enabled, disabled_here) = match index {
            ROW_DHT => (self.features.dht, torrent.is_dht_disabled()),
            ROW_PEX => (self.features.pex, torrent.is_pex_disabled()),
            _ => (self.features.lsd, torrent.is_lsd_disabled()),
        };
        if !enabled {
            STATUS_DISABLED
        } else if torrent.is_private() || disabled_here {
            STATUS_TORRENT_DISABLED
        } else {
            STATUS_WORKING
        }
    }

    fn seconds_until(&self, time: Option<DateTime<Utc>>) -> i64 {
        time.map_or(0, |time| {
            (time - self.announce_reference).num_seconds().max(0)
        })
    }
}

/// Refresh announce countdowns once per second until no torrent is shown.
///
/// The timer is single-shot and re-armed after each refresh, so a slow view
/// never accumulates pending ticks.
pub async fn announce_refresh_loop(model: Arc<Mutex<TrackerListModel>>) {
    loop {
        tokio::time::sleep(ANNOUNCE_REFRESH_INTERVAL).await;
        if !model.lock().refresh_announce_times(Utc::now()) {
            debug!("announce refresh stopped: no torrent shown");
            break;
        }
    }
}

fn pretty_count(value: i32) -> String {
    if value > -1 {
        value.to_string()
    } else {
        "N/A".to_string()
    }
}

fn format_duration(seconds: i64) -> String {
    let (days, hours, minutes, secs) = (
        seconds / 86_400,
        (seconds % 86_400) / 3_600,
        (seconds % 3_600) / 60,
        seconds % 60,
    );
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use torrex_test_support::sources::StaticTrackerSource;

    const A: &str = "http://a.example/announce";
    const B: &str = "http://b.example/announce";
    const C: &str = "udp://c.example:6969/announce";

    fn model_with(source: StaticTrackerSource) -> (TrackerListModel, Arc<StaticTrackerSource>) {
        let source = Arc::new(source);
        let mut model = TrackerListModel::new(SessionFeatures::default());
        model.set_torrent(Some(source.clone()));
        model.take_changes();
        (model, source)
    }

    fn endpoint(name: &str, peers: i32) -> TrackerEndpointEntry {
        TrackerEndpointEntry {
            name: name.to_string(),
            num_peers: peers,
            ..TrackerEndpointEntry::default()
        }
    }

    fn peer(seed: bool, connecting: bool, [dht, pex, lsd]: [bool; 3]) -> PeerInfo {
        PeerInfo {
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, 6881)),
            client: "test".to_string(),
            progress: if seed { 1.0 } else { 0.5 },
            connecting,
            seed,
            from_tracker: false,
            from_dht: dht,
            from_pex: pex,
            from_lsd: lsd,
        }
    }

    fn urls(model: &TrackerListModel) -> Vec<&str> {
        model.rows().iter().map(TrackerRow::name).collect()
    }

    #[test]
    fn sticky_rows_precede_trackers() {
        let (model, _) = model_with(StaticTrackerSource::new(vec![
            TrackerEntry::new(A, 0),
            TrackerEntry::new(B, 1),
        ]));

        assert_eq!(
            urls(&model),
            vec!["** [DHT] **", "** [PeX] **", "** [LSD] **", A, B]
        );
        let dht = model.rows()[0].id();
        assert_eq!(model.text(dht, TrackerColumn::Tier).as_deref(), Some(""));
        assert_eq!(model.text(dht, TrackerColumn::Status).as_deref(), Some("Working"));
        assert_eq!(model.text(dht, TrackerColumn::Seeds).as_deref(), Some("N/A"));

        let b = model.rows()[4].id();
        assert_eq!(model.text(b, TrackerColumn::Tier).as_deref(), Some("1"));
        assert_eq!(
            model.text(b, TrackerColumn::Status).as_deref(),
            Some("Not contacted yet")
        );
    }

    #[test]
    fn sticky_status_reflects_session_and_torrent_switches() {
        let (mut model, _) = model_with(StaticTrackerSource::new(Vec::new()).without_pex());
        let [dht, pex, lsd] = [0, 1, 2].map(|row| model.rows()[row].id());

        model.set_session_features(SessionFeatures {
            lsd: false,
            ..SessionFeatures::default()
        });
        assert_eq!(model.text(dht, TrackerColumn::Status).as_deref(), Some("Working"));
        assert_eq!(
            model.text(pex, TrackerColumn::Status).as_deref(),
            Some("Disabled for this torrent")
        );
        assert_eq!(model.text(lsd, TrackerColumn::Status).as_deref(), Some("Disabled"));
        assert_eq!(
            model.take_changes(),
            vec![ModelChange::DataChanged {
                parent: None,
                rows: 0..=2,
                columns: TrackerColumn::Status..=TrackerColumn::Status,
            }]
        );
    }

    #[test]
    fn private_torrents_explain_disabled_discovery() {
        let (model, _) = model_with(StaticTrackerSource::new(Vec::new()).private());
        for row in &model.rows()[..STICKY_ROW_COUNT] {
            assert_eq!(row.message(), "This torrent is private");
            assert_eq!(
                model.text(row.id(), TrackerColumn::Status).as_deref(),
                Some("Disabled for this torrent")
            );
        }
    }

    #[test]
    fn peer_counts_skip_connecting_peers_and_stale_requests() -> anyhow::Result<()> {
        let source = Arc::new(StaticTrackerSource::new(Vec::new()));
        let mut model = TrackerListModel::new(SessionFeatures::default());
        let stale = model
            .set_torrent(Some(source.clone()))
            .ok_or_else(|| anyhow::anyhow!("peer request"))?;
        let request = model
            .set_torrent(Some(source.clone()))
            .ok_or_else(|| anyhow::anyhow!("peer request"))?;
        model.take_changes();

        let peers = [
            peer(true, false, [true, true, false]),
            peer(false, false, [true, false, true]),
            peer(false, false, [false, true, false]),
            peer(true, true, [true, true, true]),
        ];
        assert!(!model.apply_peer_counts(stale, &peers));
        assert!(model.apply_peer_counts(request, &peers));

        let counts: Vec<(i32, i32)> = model.rows()[..STICKY_ROW_COUNT]
            .iter()
            .map(|row| (row.num_seeds(), row.num_leeches()))
            .collect();
        assert_eq!(counts, vec![(1, 1), (1, 1), (0, 1)]);
        assert_eq!(
            model.take_changes(),
            vec![ModelChange::DataChanged {
                parent: None,
                rows: 0..=2,
                columns: TrackerColumn::Seeds..=TrackerColumn::Leeches,
            }]
        );

        model.set_torrent(None);
        assert!(!model.apply_peer_counts(request, &peers));
        Ok(())
    }

    #[test]
    fn trackers_changed_updates_removes_then_appends() -> anyhow::Result<()> {
        let (mut model, source) = model_with(StaticTrackerSource::new(vec![
            TrackerEntry::new(A, 0),
            TrackerEntry::new(B, 0),
        ]));
        let b_id = model.tracker(B).map(TrackerRow::id);

        let mut b = TrackerEntry::new(B, 2);
        b.message = "updated".to_string();
        source.set_trackers(vec![b, TrackerEntry::new(C, 3)]);
        model.on_trackers_changed();

        assert_eq!(urls(&model)[STICKY_ROW_COUNT..], [B, C]);
        let b_row = model.tracker(B).ok_or_else(|| anyhow::anyhow!("B row"))?;
        assert_eq!(Some(b_row.id()), b_id);
        assert_eq!(b_row.message(), "updated");
        assert_eq!(b_row.tier(), Some(2));

        let changes = model.take_changes();
        let removed = changes
            .iter()
            .position(|change| matches!(change, ModelChange::RowsRemoved { .. }))
            .ok_or_else(|| anyhow::anyhow!("no removal"))?;
        let inserted = changes
            .iter()
            .position(|change| matches!(change, ModelChange::RowsInserted { .. }))
            .ok_or_else(|| anyhow::anyhow!("no insertion"))?;
        assert!(removed < inserted);
        assert_eq!(
            changes[removed],
            ModelChange::RowsRemoved {
                parent: None,
                rows: 3..=3,
            }
        );
        assert_eq!(
            changes[inserted],
            ModelChange::RowsInserted {
                parent: None,
                rows: 4..=4,
            }
        );
        Ok(())
    }

    #[test]
    fn endpoint_children_follow_the_same_diff() -> anyhow::Result<()> {
        let mut entry = TrackerEntry::new(A, 0);
        entry.upsert_endpoint(endpoint("10.0.0.1:6881", 5));
        entry.upsert_endpoint(endpoint("10.0.0.2:6881", 6));
        let (mut model, _) = model_with(StaticTrackerSource::new(vec![entry]));

        let row = model.tracker(A).ok_or_else(|| anyhow::anyhow!("A row"))?;
        assert_eq!(row.children().len(), 2);
        let kept_id = row.children()[1].id();
        assert_eq!(
            model.text(kept_id, TrackerColumn::Protocol).as_deref(),
            Some("v1")
        );

        let mut update = TrackerEntry::new(A, 0);
        update.upsert_endpoint(endpoint("10.0.0.2:6881", 9));
        update.upsert_endpoint(endpoint("10.0.0.3:6881", 1));
        model.on_tracker_entries_updated(&HashMap::from([(A.to_string(), update)]));

        let row = model.tracker(A).ok_or_else(|| anyhow::anyhow!("A row"))?;
        let names: Vec<&str> = row.children().iter().map(TrackerRow::name).collect();
        assert_eq!(names, vec!["10.0.0.2:6881", "10.0.0.3:6881"]);
        assert_eq!(row.children()[0].id(), kept_id);
        assert_eq!(row.children()[0].num_peers(), 9);

        let parent = Some(row.id());
        let changes = model.take_changes();
        assert_eq!(
            changes[0],
            ModelChange::RowsAboutToBeRemoved {
                parent,
                rows: 0..=0,
            }
        );
        assert!(changes.contains(&ModelChange::RowsInserted {
            parent,
            rows: 1..=1,
        }));
        Ok(())
    }

    #[test]
    fn added_and_removed_trackers_keep_urls_unique() {
        let (mut model, _) = model_with(StaticTrackerSource::new(vec![TrackerEntry::new(A, 0)]));

        model.on_trackers_added(&[
            TrackerEntry::new(A, 0),
            TrackerEntry::new(B, 1),
            TrackerEntry::new(B, 1),
        ]);
        assert_eq!(urls(&model)[STICKY_ROW_COUNT..], [A, B]);
        assert_eq!(
            model.take_changes(),
            vec![
                ModelChange::RowsAboutToBeInserted {
                    parent: None,
                    rows: 4..=4,
                },
                ModelChange::RowsInserted {
                    parent: None,
                    rows: 4..=4,
                },
            ]
        );

        model.on_trackers_removed(&[A.to_string(), C.to_string()]);
        assert_eq!(urls(&model)[STICKY_ROW_COUNT..], [B]);
    }

    #[test]
    fn entry_updates_ignore_unknown_urls() {
        let (mut model, _) = model_with(StaticTrackerSource::new(vec![TrackerEntry::new(A, 0)]));
        model.on_tracker_entries_updated(&HashMap::from([(
            C.to_string(),
            TrackerEntry::new(C, 0),
        )]));
        assert!(model.tracker(C).is_none());
        assert!(model.take_changes().is_empty());
    }

    #[test]
    fn countdowns_are_relative_to_the_last_refresh() -> anyhow::Result<()> {
        let now = Utc::now();
        let mut entry = TrackerEntry::new(A, 0);
        entry.next_announce_time = Some(now + chrono::Duration::seconds(90));
        entry.min_announce_time = Some(now + chrono::Duration::seconds(30));
        let (mut model, _) = model_with(StaticTrackerSource::new(vec![entry]));
        let id = model.tracker(A).map(TrackerRow::id).ok_or_else(|| anyhow::anyhow!("A"))?;

        assert!(model.refresh_announce_times(now));
        assert_eq!(model.text(id, TrackerColumn::NextAnnounce).as_deref(), Some("1m 30s"));
        assert_eq!(model.text(id, TrackerColumn::MinAnnounce).as_deref(), Some("30s"));

        assert!(model.refresh_announce_times(now + chrono::Duration::seconds(60)));
        assert_eq!(model.text(id, TrackerColumn::NextAnnounce).as_deref(), Some("30s"));
        assert_eq!(model.text(id, TrackerColumn::MinAnnounce).as_deref(), Some("0s"));

        model.set_torrent(None);
        assert!(!model.refresh_announce_times(now));
        Ok(())
    }

    #[test]
    fn events_for_other_torrents_are_ignored() {
        let (mut model, source) = model_with(StaticTrackerSource::new(vec![TrackerEntry::new(A, 0)]));
        source.set_trackers(vec![TrackerEntry::new(A, 0), TrackerEntry::new(B, 0)]);

        assert!(!model.apply_event(&Event::TrackersAdded {
            torrent_id: Uuid::new_v4(),
            urls: vec![B.to_string()],
        }));
        assert!(model.apply_event(&Event::TrackersAdded {
            torrent_id: source.torrent_id(),
            urls: vec![B.to_string()],
        }));
        assert_eq!(urls(&model)[STICKY_ROW_COUNT..], [A, B]);

        assert!(model.apply_event(&Event::TrackersRemoved {
            torrent_id: source.torrent_id(),
            urls: vec![A.to_string()],
        }));
        assert_eq!(urls(&model)[STICKY_ROW_COUNT..], [B]);
    }

    #[tokio::test]
    async fn refresh_loop_runs_until_the_torrent_is_cleared() -> anyhow::Result<()> {
        let (model, _) = model_with(StaticTrackerSource::new(vec![TrackerEntry::new(A, 0)]));
        let model = Arc::new(Mutex::new(model));
        let task = tokio::spawn(announce_refresh_loop(Arc::clone(&model)));

        tokio::time::sleep(ANNOUNCE_REFRESH_INTERVAL + Duration::from_millis(300)).await;
        let refreshed = model.lock().take_changes().contains(&ModelChange::DataChanged {
            parent: None,
            rows: 0..=3,
            columns: TrackerColumn::NextAnnounce..=TrackerColumn::MinAnnounce,
        });
        assert!(refreshed);

        model.lock().set_torrent(None);
        tokio::time::timeout(Duration::from_secs(3), task).await??;
        Ok(())
    }
}
