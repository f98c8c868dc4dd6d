//! In-process engine implementing the native facade.
//!
//! It models what the session layer can observe: an alert queue with a ready
//! callback, torrent references that go stale on removal, queue positions,
//! port mapping handles, IP filtering, and listen state. There is no wire
//! protocol; announces, peers, and progress are driven through the control
//! methods on [`MemoryEngine`].
//!
//! Queue management has no active limit: an auto-managed torrent is started
//! as soon as the session is running, whatever its paused flag says.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use serde::Deserialize;
use serde_json::json;
use torrex_events::TorrentState;
use torrex_torrent_core::{
    AddTorrentParams, DownloadPriority, InfoHash, PeerInfo, PieceIndex, ResumeDataFlags,
    SslParameters, TorrentFileInfo, TorrentFlags, TorrentMetadata, TorrentStatus,
    TrackerEndpointEntry, TrackerEntry, TrackerStatus,
};
use tracing::debug;

use super::{
    Alert, AlertNotify, IpFilter, NativeError, NativeResult, NativeSession, NativeSessionProxy,
    NativeTorrent, NativeTorrentRef, PeerClassFilter, PeerClassTypeFilter, PortMappingHandle,
    PortProtocol, RemoveFlags, SettingKey, SettingsPack,
};

const DEFAULT_LISTEN_INTERFACES: &str = "0.0.0.0:6881";
const DOWNLOAD_QUEUE_DEPTH: usize = 4;

/// Result of a simulated tracker announce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnounceOutcome {
    /// The tracker answered.
    Working {
        /// Peers returned.
        peers: i32,
        /// Seeds reported in the scrape.
        seeds: i32,
        /// Leeches reported in the scrape.
        leeches: i32,
        /// Completed downloads reported in the scrape.
        downloaded: i32,
        /// Re-announce interval.
        interval: Duration,
    },
    /// The tracker answered with an error.
    Failed {
        /// Tracker supplied reason.
        message: String,
    },
    /// The tracker host could not be reached.
    Unreachable,
}

/// In-process engine session.
#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<EngineState>,
    alert_ready: Condvar,
    notify: Mutex<Option<Arc<AlertNotify>>>,
    listening: AtomicBool,
}

#[derive(Default)]
struct EngineState {
    alerts: Vec<Alert>,
    torrents: HashMap<InfoHash, Arc<MemoryTorrent>>,
    queue: Vec<InfoHash>,
    ip_filter: IpFilter,
    peer_class_filter: PeerClassFilter,
    peer_class_type_filter: PeerClassTypeFilter,
    settings: SettingsPack,
    paused: bool,
    next_mapping: u32,
    mappings: BTreeMap<PortMappingHandle, u16>,
    pending_add_failure: Option<String>,
    aborted: bool,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        let mut settings = SettingsPack::new();
        settings.set_bool(SettingKey::EnableUpnp, true);
        settings.set_bool(SettingKey::EnableNatpmp, true);
        settings.set_bool(SettingKey::EnableDht, true);
        settings.set_bool(SettingKey::EnableLsd, true);
        settings.set_str(SettingKey::ListenInterfaces, DEFAULT_LISTEN_INTERFACES);
        Self::with_settings(settings)
    }
}

impl MemoryEngine {
    /// Engine with default settings (both port mappers on, listening on 6881).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with explicit initial settings.
    #[must_use]
    pub fn with_settings(settings: SettingsPack) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(EngineState::default()),
            alert_ready: Condvar::new(),
            notify: Mutex::new(None),
            listening: AtomicBool::new(false),
        });
        let engine = Self { shared };
        engine.apply_settings(settings);
        engine
    }

    /// Encode metadata in the form [`NativeTorrent::set_metadata`] accepts.
    ///
    /// # Errors
    ///
    /// Returns a [`NativeError`] if the metadata cannot be serialized.
    pub fn encode_metadata(metadata: &TorrentMetadata) -> NativeResult<Vec<u8>> {
        serde_json::to_vec(metadata).map_err(|err| NativeError::new("encode_metadata", err.to_string()))
    }

    /// Make the next add call fail with `message`.
    pub fn fail_next_add(&self, message: impl Into<String>) {
        self.shared.state.lock().pending_add_failure = Some(message.into());
    }

    /// Apply an announce result to a torrent's tracker and queue the matching alert.
    pub fn announce(&self, info_hash: &InfoHash, url: &str, outcome: &AnnounceOutcome) {
        let Some(torrent) = self.torrent(info_hash) else {
            return;
        };
        let alert = {
            let mut inner = torrent.inner.lock();
            let Some(entry) = inner.trackers.iter_mut().find(|entry| entry.url == url) else {
                return;
            };
            let mut endpoint = TrackerEndpointEntry {
                name: DEFAULT_LISTEN_INTERFACES.to_string(),
                ..TrackerEndpointEntry::default()
            };
            let alert = match outcome {
                AnnounceOutcome::Working {
                    peers,
                    seeds,
                    leeches,
                    downloaded,
                    interval,
                } => {
                    let next = Utc::now()
                        + chrono::Duration::from_std(*interval).unwrap_or(chrono::Duration::zero());
                    endpoint.status = TrackerStatus::Working;
                    endpoint.num_peers = *peers;
                    endpoint.num_seeds = *seeds;
                    endpoint.num_leeches = *leeches;
                    endpoint.num_downloaded = *downloaded;
                    endpoint.next_announce_time = Some(next);
                    endpoint.min_announce_time = Some(next);
                    Alert::TrackerReply {
                        info_hash: *info_hash,
                        url: url.to_string(),
                        num_peers: *peers,
                    }
                }
                AnnounceOutcome::Failed { message } => {
                    endpoint.status = TrackerStatus::TrackerError;
                    endpoint.message.clone_from(message);
                    Alert::TrackerError {
                        info_hash: *info_hash,
                        url: url.to_string(),
                        message: message.clone(),
                    }
                }
                AnnounceOutcome::Unreachable => {
                    endpoint.status = TrackerStatus::Unreachable;
                    Alert::TrackerError {
                        info_hash: *info_hash,
                        url: url.to_string(),
                        message: "host unreachable".to_string(),
                    }
                }
            };
            entry.status = endpoint.status;
            entry.message.clone_from(&endpoint.message);
            entry.num_peers = endpoint.num_peers;
            entry.num_seeds = endpoint.num_seeds;
            entry.num_leeches = endpoint.num_leeches;
            entry.num_downloaded = endpoint.num_downloaded;
            entry.next_announce_time = endpoint.next_announce_time;
            entry.min_announce_time = endpoint.min_announce_time;
            entry.upsert_endpoint(endpoint);
            alert
        };
        self.shared.post(vec![alert]);
    }

    /// Replace the peer list of a torrent.
    pub fn set_peers(&self, info_hash: &InfoHash, peers: Vec<PeerInfo>) {
        if let Some(torrent) = self.torrent(info_hash) {
            torrent.inner.lock().peers = peers;
        }
    }

    /// Replace per-file progress of a torrent.
    pub fn set_file_progress(&self, info_hash: &InfoHash, progress: Vec<f64>) {
        if let Some(torrent) = self.torrent(info_hash) {
            torrent.inner.lock().file_progress = progress;
        }
    }

    /// Latch an error on a torrent and queue the alert.
    pub fn raise_torrent_error(&self, info_hash: &InfoHash, message: &str) {
        if let Some(torrent) = self.torrent(info_hash) {
            torrent.inner.lock().error = Some(message.to_string());
            self.shared.post(vec![Alert::TorrentError {
                info_hash: *info_hash,
                message: message.to_string(),
            }]);
        }
    }

    /// Number of torrents loaded.
    #[must_use]
    pub fn torrent_count(&self) -> usize {
        self.shared.state.lock().torrents.len()
    }

    /// Live port mappings and their external ports.
    #[must_use]
    pub fn active_mappings(&self) -> Vec<(PortMappingHandle, u16)> {
        self.shared
            .state
            .lock()
            .mappings
            .iter()
            .map(|(handle, port)| (*handle, *port))
            .collect()
    }

    fn torrent(&self, info_hash: &InfoHash) -> Option<Arc<MemoryTorrent>> {
        self.shared.state.lock().torrents.get(info_hash).cloned()
    }
}

impl Shared {
    fn post(&self, alerts: Vec<Alert>) {
        if alerts.is_empty() {
            return;
        }
        let was_empty = {
            let mut state = self.state.lock();
            let was_empty = state.alerts.is_empty();
            state.alerts.extend(alerts);
            was_empty
        };
        self.alert_ready.notify_all();
        if was_empty {
            let notify = self.notify.lock().clone();
            if let Some(notify) = notify {
                notify();
            }
        }
    }

    fn insert_torrent(self: &Arc<Self>, params: AddTorrentParams) -> NativeResult<Arc<MemoryTorrent>> {
        let torrent = {
            let mut state = self.state.lock();
            if state.aborted {
                return Err(NativeError::new("add_torrent", "session aborted"));
            }
            if let Some(message) = state.pending_add_failure.take() {
                return Err(NativeError::new("add_torrent", message));
            }
            if state.torrents.contains_key(&params.info_hash) {
                return Err(NativeError::new("add_torrent", "torrent already in session"));
            }
            let torrent = Arc::new(MemoryTorrent::new(&params, Arc::downgrade(self)));
            state.torrents.insert(params.info_hash, Arc::clone(&torrent));
            state.queue.push(params.info_hash);
            torrent
        };
        if let Some(userdata) = &params.userdata {
            userdata.record(torrent.status());
        }
        Ok(torrent)
    }

    fn queue_position(&self, info_hash: &InfoHash) -> Option<u32> {
        let state = self.state.lock();
        state
            .queue
            .iter()
            .position(|hash| hash == info_hash)
            .and_then(|pos| u32::try_from(pos).ok())
    }

    fn set_queue_position(&self, info_hash: &InfoHash, position: u32) {
        let mut state = self.state.lock();
        let Some(current) = state.queue.iter().position(|hash| hash == info_hash) else {
            return;
        };
        let hash = state.queue.remove(current);
        let target = usize::try_from(position)
            .unwrap_or(usize::MAX)
            .min(state.queue.len());
        state.queue.insert(target, hash);
    }

    fn apply_listen_settings(&self, settings: &SettingsPack) -> Option<Alert> {
        let interfaces = settings.get_str(SettingKey::ListenInterfaces)?;
        let first = interfaces.split(',').next().unwrap_or_default().trim();
        if first.is_empty() {
            self.listening.store(false, Ordering::SeqCst);
            return None;
        }
        match first.parse::<SocketAddr>() {
            Ok(endpoint) if endpoint.port() != 0 => {
                self.listening.store(true, Ordering::SeqCst);
                Some(Alert::ListenSucceeded { endpoint })
            }
            Ok(_) | Err(_) => {
                self.listening.store(false, Ordering::SeqCst);
                Some(Alert::ListenFailed {
                    message: format!("cannot listen on '{first}'"),
                })
            }
        }
    }
}

#[derive(Deserialize)]
struct ResumeTracker {
    url: String,
    tier: u8,
}

#[derive(Deserialize)]
struct ResumeRecord {
    info_hash: String,
    name: String,
    #[serde(default)]
    trackers: Vec<ResumeTracker>,
    #[serde(default)]
    url_seeds: Vec<String>,
    #[serde(default)]
    file_priorities: Vec<i32>,
    #[serde(default)]
    paused: bool,
    #[serde(default)]
    auto_managed: bool,
    #[serde(default)]
    metadata: Option<TorrentMetadata>,
    #[serde(default)]
    save_path: Option<PathBuf>,
}

impl NativeSession for MemoryEngine {
    fn pause(&self) {
        let torrents: Vec<Arc<MemoryTorrent>> = {
            let mut state = self.shared.state.lock();
            state.paused = true;
            state.torrents.values().cloned().collect()
        };
        for torrent in torrents {
            torrent.inner.lock().session_paused = true;
        }
    }

    fn resume(&self) {
        let torrents: Vec<Arc<MemoryTorrent>> = {
            let mut state = self.shared.state.lock();
            state.paused = false;
            state.torrents.values().cloned().collect()
        };
        for torrent in torrents {
            torrent.inner.lock().session_paused = false;
        }
    }

    fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    fn async_add_torrent(&self, params: AddTorrentParams) {
        let info_hash = params.info_hash;
        let name = params.name.clone();
        let result = self
            .shared
            .insert_torrent(params)
            .map(|torrent| torrent as NativeTorrentRef);
        self.shared.post(vec![Alert::AddTorrent {
            info_hash,
            name,
            result,
        }]);
    }

    fn add_torrent(&self, params: AddTorrentParams) -> NativeResult<NativeTorrentRef> {
        self.shared
            .insert_torrent(params)
            .map(|torrent| torrent as NativeTorrentRef)
    }

    fn read_resume_data(&self, payload: &[u8]) -> NativeResult<AddTorrentParams> {
        let record: ResumeRecord = serde_json::from_slice(payload)
            .map_err(|err| NativeError::new("read_resume_data", err.to_string()))?;
        let info_hash = record
            .info_hash
            .parse::<InfoHash>()
            .map_err(|err| NativeError::new("read_resume_data", err.to_string()))?;
        let mut flags = TorrentFlags::default();
        flags.set(TorrentFlags::PAUSED, record.paused);
        flags.set(TorrentFlags::AUTO_MANAGED, record.auto_managed);
        Ok(AddTorrentParams {
            info_hash,
            name: record.name,
            trackers: record.trackers.iter().map(|t| t.url.clone()).collect(),
            tracker_tiers: record.trackers.iter().map(|t| t.tier).collect(),
            url_seeds: record.url_seeds,
            metadata: record.metadata,
            save_path: record.save_path,
            flags,
            file_priorities: record
                .file_priorities
                .into_iter()
                .map(DownloadPriority::from_i32)
                .collect(),
            userdata: None,
        })
    }

    fn remove_torrent(&self, torrent: &NativeTorrentRef, flags: RemoveFlags) {
        let info_hash = torrent.info_hash();
        let removed = {
            let mut state = self.shared.state.lock();
            let removed = state.torrents.remove(&info_hash);
            state.queue.retain(|hash| *hash != info_hash);
            removed
        };
        if let Some(removed) = removed {
            removed.valid.store(false, Ordering::SeqCst);
            debug!(
                info_hash = %info_hash,
                delete_files = flags.delete_files,
                delete_partfile = flags.delete_partfile,
                "memory engine removed torrent"
            );
            self.shared.post(vec![Alert::TorrentRemoved { info_hash }]);
        }
    }

    fn find_torrent(&self, info_hash: &InfoHash) -> Option<NativeTorrentRef> {
        self.torrent(info_hash).map(|torrent| torrent as NativeTorrentRef)
    }

    fn ip_filter(&self) -> IpFilter {
        self.shared.state.lock().ip_filter.clone()
    }

    fn set_ip_filter(&self, filter: IpFilter) {
        self.shared.state.lock().ip_filter = filter;
    }

    fn set_peer_class_filter(&self, filter: PeerClassFilter) {
        self.shared.state.lock().peer_class_filter = filter;
    }

    fn set_peer_class_type_filter(&self, filter: PeerClassTypeFilter) {
        self.shared.state.lock().peer_class_type_filter = filter;
    }

    fn apply_settings(&self, settings: SettingsPack) {
        self.shared.state.lock().settings.merge(&settings);
        if let Some(alert) = self.shared.apply_listen_settings(&settings) {
            self.shared.post(vec![alert]);
        }
    }

    fn settings(&self) -> SettingsPack {
        self.shared.state.lock().settings.clone()
    }

    fn add_port_mapping(
        &self,
        protocol: PortProtocol,
        external_port: u16,
        local_port: u16,
    ) -> Vec<PortMappingHandle> {
        let handles = {
            let mut state = self.shared.state.lock();
            let mappers = [SettingKey::EnableUpnp, SettingKey::EnableNatpmp]
                .into_iter()
                .filter(|key| state.settings.get_bool(*key).unwrap_or(false))
                .count();
            let mut handles = Vec::with_capacity(mappers);
            for _ in 0..mappers {
                let handle = PortMappingHandle(state.next_mapping);
                state.next_mapping = state.next_mapping.wrapping_add(1);
                state.mappings.insert(handle, external_port);
                handles.push(handle);
            }
            handles
        };
        debug!(
            ?protocol,
            external_port,
            local_port,
            mappings = handles.len(),
            "memory engine mapped port"
        );
        self.shared.post(
            handles
                .iter()
                .map(|handle| Alert::PortMapped {
                    handle: *handle,
                    external_port,
                })
                .collect(),
        );
        handles
    }

    fn delete_port_mapping(&self, handle: PortMappingHandle) {
        self.shared.state.lock().mappings.remove(&handle);
    }

    fn wait_for_alert(&self, timeout: Duration) -> bool {
        let mut state = self.shared.state.lock();
        if state.alerts.is_empty() && !timeout.is_zero() {
            let _ = self.shared.alert_ready.wait_for(&mut state, timeout);
        }
        !state.alerts.is_empty()
    }

    fn pop_alerts(&self) -> Vec<Alert> {
        std::mem::take(&mut self.shared.state.lock().alerts)
    }

    fn set_alert_notify(&self, notify: AlertNotify) {
        *self.shared.notify.lock() = Some(Arc::new(notify));
    }

    fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }

    fn post_torrent_updates(&self) {
        let torrents: Vec<Arc<MemoryTorrent>> =
            self.shared.state.lock().torrents.values().cloned().collect();
        let statuses = torrents.iter().map(|torrent| torrent.status()).collect();
        self.shared.post(vec![Alert::StateUpdate { statuses }]);
    }

    fn post_session_stats(&self) {
        let counters = {
            let state = self.shared.state.lock();
            let mut counters = BTreeMap::new();
            counters.insert(
                "ses.num_torrents".to_string(),
                i64::try_from(state.torrents.len()).unwrap_or(i64::MAX),
            );
            counters.insert(
                "ses.num_port_mappings".to_string(),
                i64::try_from(state.mappings.len()).unwrap_or(i64::MAX),
            );
            counters.insert(
                "ses.num_ip_filter_rules".to_string(),
                i64::try_from(state.ip_filter.rules().len()).unwrap_or(i64::MAX),
            );
            counters
        };
        self.shared.post(vec![Alert::SessionStats { counters }]);
    }

    fn abort(&self) -> Box<dyn NativeSessionProxy> {
        let torrents: Vec<Arc<MemoryTorrent>> = {
            let mut state = self.shared.state.lock();
            state.aborted = true;
            state.torrents.values().cloned().collect()
        };
        for torrent in torrents {
            torrent.valid.store(false, Ordering::SeqCst);
        }
        self.shared.listening.store(false, Ordering::SeqCst);
        *self.shared.notify.lock() = None;
        Box::new(MemoryProxy {
            shared: Arc::clone(&self.shared),
        })
    }
}

struct MemoryProxy {
    shared: Arc<Shared>,
}

impl NativeSessionProxy for MemoryProxy {
    fn shutdown(self: Box<Self>) {
        let mut state = self.shared.state.lock();
        state.torrents.clear();
        state.queue.clear();
        state.mappings.clear();
        state.alerts.clear();
        debug!("memory engine released");
    }
}

struct MemoryTorrent {
    info_hash: InfoHash,
    engine: Weak<Shared>,
    valid: AtomicBool,
    inner: Mutex<TorrentInner>,
}

struct TorrentInner {
    name: String,
    flags: TorrentFlags,
    trackers: Vec<TrackerEntry>,
    url_seeds: Vec<String>,
    metadata: Option<TorrentMetadata>,
    save_path: Option<PathBuf>,
    error: Option<String>,
    checking: bool,
    session_paused: bool,
    file_priorities: Vec<DownloadPriority>,
    file_progress: Vec<f64>,
    piece_priorities: Vec<DownloadPriority>,
    upload_limit: i32,
    download_limit: i32,
    peers: Vec<PeerInfo>,
    ssl_configured: bool,
}

impl TorrentInner {
    fn apply_metadata(&mut self, metadata: TorrentMetadata) {
        let files = metadata.files.len();
        self.file_priorities.resize(files, DownloadPriority::Normal);
        self.file_progress.resize(files, 0.0);
        self.piece_priorities = vec![DownloadPriority::Normal; metadata.piece_count()];
        if self.name.is_empty() {
            self.name.clone_from(&metadata.name);
        }
        self.metadata = Some(metadata);
    }

    #[allow(clippy::cast_precision_loss)]
    fn progress(&self) -> f64 {
        let Some(metadata) = &self.metadata else {
            return 0.0;
        };
        let total = metadata.total_size();
        if total == 0 {
            return 1.0;
        }
        let done: f64 = metadata
            .files
            .iter()
            .zip(&self.file_progress)
            .map(|(file, progress)| file.size as f64 * progress)
            .sum();
        done / total as f64
    }
}

impl MemoryTorrent {
    fn new(params: &AddTorrentParams, engine: Weak<Shared>) -> Self {
        let trackers = params
            .trackers
            .iter()
            .enumerate()
            .map(|(index, url)| {
                TrackerEntry::new(url.clone(), params.tracker_tiers.get(index).copied().unwrap_or(0))
            })
            .collect();
        let mut inner = TorrentInner {
            name: params.name.clone(),
            flags: params.flags,
            trackers,
            url_seeds: params.url_seeds.clone(),
            metadata: None,
            save_path: params.save_path.clone(),
            error: None,
            checking: false,
            session_paused: false,
            file_priorities: params.file_priorities.clone(),
            file_progress: Vec::new(),
            piece_priorities: Vec::new(),
            upload_limit: 0,
            download_limit: 0,
            peers: Vec::new(),
            ssl_configured: false,
        };
        if let Some(metadata) = params.metadata.clone() {
            inner.apply_metadata(metadata);
        }
        Self {
            info_hash: params.info_hash,
            engine,
            valid: AtomicBool::new(true),
            inner: Mutex::new(inner),
        }
    }

    fn invalid(&self, operation: &'static str) -> NativeError {
        NativeError::new(operation, format!("invalid torrent handle {}", self.info_hash))
    }

    fn post(&self, alert: Alert) {
        if let Some(engine) = self.engine.upgrade() {
            engine.post(vec![alert]);
        }
    }
}

impl NativeTorrent for MemoryTorrent {
    fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::SeqCst)
    }

    fn status(&self) -> TorrentStatus {
        let queue_position = self.queue_position();
        let inner = self.inner.lock();
        let progress = inner.progress();
        let managed = inner.flags.contains(TorrentFlags::AUTO_MANAGED);
        let paused =
            (inner.flags.contains(TorrentFlags::PAUSED) && !managed) || inner.session_paused;
        let state = if inner.error.is_some() {
            TorrentState::Errored
        } else if paused {
            TorrentState::Paused
        } else if inner.checking {
            TorrentState::Checking
        } else if inner.metadata.is_none() {
            TorrentState::FetchingMetadata
        } else if progress >= 1.0 {
            TorrentState::Seeding
        } else {
            TorrentState::Downloading
        };
        TorrentStatus {
            info_hash: self.info_hash,
            name: inner.name.clone(),
            state,
            progress,
            queue_position,
            paused,
            auto_managed: managed,
            upload_mode: inner.flags.contains(TorrentFlags::UPLOAD_MODE),
            error: inner.error.clone(),
        }
    }

    fn queue_position(&self) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }
        self.engine
            .upgrade()
            .and_then(|engine| engine.queue_position(&self.info_hash))
    }

    fn queue_position_set(&self, position: u32) {
        if let Some(engine) = self.engine.upgrade() {
            engine.set_queue_position(&self.info_hash, position);
        }
    }

    fn flags(&self) -> TorrentFlags {
        self.inner.lock().flags
    }

    fn set_flags(&self, flags: TorrentFlags) {
        self.inner.lock().flags.insert(flags);
    }

    fn unset_flags(&self, flags: TorrentFlags) {
        self.inner.lock().flags.remove(flags);
    }

    fn clear_error(&self) {
        self.inner.lock().error = None;
    }

    fn pause(&self) {
        self.inner.lock().flags.insert(TorrentFlags::PAUSED);
    }

    fn resume(&self) {
        self.inner.lock().flags.remove(TorrentFlags::PAUSED);
    }

    fn force_recheck(&self) {
        self.inner.lock().checking = true;
    }

    fn force_reannounce(&self, tracker_index: Option<usize>) {
        let mut inner = self.inner.lock();
        for (index, tracker) in inner.trackers.iter_mut().enumerate() {
            if tracker_index.is_none_or(|target| target == index) {
                tracker.status = TrackerStatus::Updating;
            }
        }
    }

    fn force_dht_announce(&self) {
        debug!(info_hash = %self.info_hash, "memory engine dht announce");
    }

    fn add_tracker(&self, tracker: TrackerEntry) {
        let mut inner = self.inner.lock();
        if !inner.trackers.iter().any(|existing| existing.url == tracker.url) {
            inner.trackers.push(tracker);
        }
    }

    fn replace_trackers(&self, trackers: Vec<TrackerEntry>) {
        self.inner.lock().trackers = trackers;
    }

    fn trackers(&self) -> Vec<TrackerEntry> {
        self.inner.lock().trackers.clone()
    }

    fn add_url_seed(&self, url: &str) {
        let mut inner = self.inner.lock();
        if !inner.url_seeds.iter().any(|seed| seed == url) {
            inner.url_seeds.push(url.to_string());
        }
    }

    fn remove_url_seed(&self, url: &str) {
        self.inner.lock().url_seeds.retain(|seed| seed != url);
    }

    fn url_seeds(&self) -> Vec<String> {
        self.inner.lock().url_seeds.clone()
    }

    fn connect_peer(&self, address: SocketAddr) -> NativeResult<()> {
        if !self.is_valid() {
            return Err(self.invalid("connect_peer"));
        }
        if address.port() == 0 {
            return Err(NativeError::new("connect_peer", "invalid port"));
        }
        let mut inner = self.inner.lock();
        if inner.peers.iter().all(|peer| peer.address != address) {
            inner.peers.push(PeerInfo {
                address,
                client: String::new(),
                progress: 0.0,
                connecting: true,
                seed: false,
                from_tracker: false,
                from_dht: false,
                from_pex: false,
                from_lsd: false,
            });
        }
        Ok(())
    }

    fn clear_peers(&self) {
        self.inner.lock().peers.clear();
    }

    fn set_metadata(&self, info_bytes: &[u8]) -> NativeResult<()> {
        if !self.is_valid() {
            return Err(self.invalid("set_metadata"));
        }
        let metadata: TorrentMetadata = serde_json::from_slice(info_bytes)
            .map_err(|err| NativeError::new("set_metadata", err.to_string()))?;
        {
            let mut inner = self.inner.lock();
            if inner.metadata.is_some() {
                return Ok(());
            }
            inner.apply_metadata(metadata);
        }
        self.post(Alert::MetadataReceived {
            info_hash: self.info_hash,
        });
        Ok(())
    }

    fn set_ssl_certificate(&self, params: &SslParameters) {
        self.inner.lock().ssl_configured = params.is_valid();
    }

    fn set_upload_limit(&self, limit: i32) {
        self.inner.lock().upload_limit = limit.max(0);
    }

    fn set_download_limit(&self, limit: i32) {
        self.inner.lock().download_limit = limit.max(0);
    }

    fn upload_limit(&self) -> i32 {
        self.inner.lock().upload_limit
    }

    fn download_limit(&self) -> i32 {
        self.inner.lock().download_limit
    }

    fn flush_cache(&self) {
        debug!(info_hash = %self.info_hash, "memory engine flushed cache");
    }

    fn rename_file(&self, index: usize, new_path: &str) {
        let mut inner = self.inner.lock();
        if let Some(file) = inner
            .metadata
            .as_mut()
            .and_then(|metadata| metadata.files.get_mut(index))
        {
            file.path = new_path.to_string();
        }
    }

    fn prioritize_files(&self, priorities: &[DownloadPriority]) {
        let mut inner = self.inner.lock();
        for (slot, priority) in inner.file_priorities.iter_mut().zip(priorities) {
            if priority.is_valid_for_file() {
                *slot = *priority;
            }
        }
    }

    fn file_priorities(&self) -> Vec<DownloadPriority> {
        self.inner.lock().file_priorities.clone()
    }

    fn prioritize_pieces(&self, priorities: &[DownloadPriority]) {
        let mut inner = self.inner.lock();
        for (slot, priority) in inner.piece_priorities.iter_mut().zip(priorities) {
            if priority.is_valid_for_file() {
                *slot = *priority;
            }
        }
    }

    fn piece_priorities(&self) -> Vec<DownloadPriority> {
        self.inner.lock().piece_priorities.clone()
    }

    fn save_resume_data(&self, flags: ResumeDataFlags) {
        if !self.is_valid() {
            self.post(Alert::SaveResumeDataFailed {
                info_hash: self.info_hash,
                message: "invalid torrent handle".to_string(),
            });
            return;
        }
        let queue_position = self.queue_position();
        let payload = {
            let inner = self.inner.lock();
            let mut record = json!({
                "info_hash": self.info_hash.to_hex(),
                "name": inner.name,
                "trackers": inner.trackers.iter().map(|t| json!({"url": t.url, "tier": t.tier})).collect::<Vec<_>>(),
                "url_seeds": inner.url_seeds,
                "file_priorities": inner.file_priorities.iter().map(|p| p.as_i32()).collect::<Vec<_>>(),
                "file_progress": inner.file_progress,
                "paused": inner.flags.contains(TorrentFlags::PAUSED),
                "auto_managed": inner.flags.contains(TorrentFlags::AUTO_MANAGED),
                "queue_position": queue_position,
                "save_path": inner.save_path,
            });
            if flags.save_info_dict {
                record["metadata"] = json!(inner.metadata);
            }
            record.to_string().into_bytes()
        };
        self.post(Alert::SaveResumeData {
            info_hash: self.info_hash,
            payload,
        });
    }

    fn get_peer_info(&self) -> NativeResult<Vec<PeerInfo>> {
        if !self.is_valid() {
            return Err(self.invalid("get_peer_info"));
        }
        Ok(self.inner.lock().peers.clone())
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn get_download_queue(&self) -> NativeResult<Vec<PieceIndex>> {
        if !self.is_valid() {
            return Err(self.invalid("get_download_queue"));
        }
        let status = self.status();
        if status.state != TorrentState::Downloading {
            return Ok(Vec::new());
        }
        let inner = self.inner.lock();
        let pieces = inner.piece_priorities.len();
        let completed = (status.progress * pieces as f64).floor() as usize;
        Ok((completed..pieces)
            .filter(|index| !inner.piece_priorities[*index].is_ignored())
            .take(DOWNLOAD_QUEUE_DEPTH)
            .filter_map(|index| PieceIndex::try_from(index).ok())
            .collect())
    }

    #[allow(clippy::cast_precision_loss)]
    fn piece_availability(&self) -> NativeResult<Vec<i32>> {
        if !self.is_valid() {
            return Err(self.invalid("piece_availability"));
        }
        let inner = self.inner.lock();
        let pieces = inner.piece_priorities.len();
        let connected: Vec<&PeerInfo> = inner.peers.iter().filter(|peer| !peer.connecting).collect();
        Ok((0..pieces)
            .map(|index| {
                let count = connected
                    .iter()
                    .filter(|peer| peer.seed || peer.progress * pieces as f64 > index as f64)
                    .count();
                i32::try_from(count).unwrap_or(i32::MAX)
            })
            .collect())
    }

    fn torrent_file_with_hashes(&self) -> Option<TorrentFileInfo> {
        None
    }

    fn torrent_file(&self) -> Option<TorrentFileInfo> {
        self.inner
            .lock()
            .metadata
            .clone()
            .map(|metadata| TorrentFileInfo {
                metadata,
                piece_hashes: Vec::new(),
            })
    }
}
