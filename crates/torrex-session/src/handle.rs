//! Per-torrent handle over a swappable native reference.
//!
//! # Design
//! - The native reference lives behind a `parking_lot::RwLock`. Readers clone the
//!   `Arc` under the read guard and drop the guard before doing anything else.
//! - Mutations are fire-and-forget; fallible ones report a plain `bool`.
//! - Fetches run on the blocking pool and hand back a [`Fetch`] future. Dropping
//!   it discards the result; the engine call still completes.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use torrex_events::{Event, EventBus};
use torrex_torrent_core::{
    DownloadPriority, InfoHash, OperatingMode, PeerInfo, PieceIndex, ResumeDataFlags,
    SslParameters, TorrentError, TorrentFileInfo, TorrentFlags, TorrentResult, TorrentStatus,
    TrackerEntry,
};
use tracing::debug;
use uuid::Uuid;

use crate::native::{NativeResult, NativeSession, NativeTorrent, NativeTorrentRef};

/// Whether a handle is being reloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadState {
    /// Native reference is settled.
    #[default]
    Stable,
    /// Remove and re-add in progress.
    Reloading,
}

/// Thread-safe handle to one torrent in the session.
pub struct EngineHandle {
    id: Uuid,
    info_hash: InfoHash,
    session: Arc<dyn NativeSession>,
    native: RwLock<NativeTorrentRef>,
    reload_state: Mutex<ReloadState>,
    events: EventBus,
}

impl EngineHandle {
    /// Wrap a native reference owned by `session`.
    #[must_use]
    pub fn new(
        id: Uuid,
        session: Arc<dyn NativeSession>,
        native: NativeTorrentRef,
        events: EventBus,
    ) -> Self {
        Self {
            id,
            info_hash: native.info_hash(),
            session,
            native: RwLock::new(native),
            reload_state: Mutex::new(ReloadState::Stable),
            events,
        }
    }

    /// Stable torrent identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Info hash of the torrent.
    #[must_use]
    pub const fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Current native reference. Do not keep it across an await point.
    #[must_use]
    pub fn native_handle(&self) -> NativeTorrentRef {
        Arc::clone(&self.native.read())
    }

    /// Whether the current native reference is live.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.native_handle().is_valid()
    }

    /// Reload progress.
    #[must_use]
    pub fn reload_state(&self) -> ReloadState {
        *self.reload_state.lock()
    }

    pub(crate) fn set_reload_state(&self, state: ReloadState) {
        *self.reload_state.lock() = state;
    }

    pub(crate) fn session(&self) -> &Arc<dyn NativeSession> {
        &self.session
    }

    /// Run `add` under the write lock and install the reference it returns.
    pub(crate) fn replace_native<F>(&self, add: F) -> NativeResult<NativeTorrentRef>
    where
        F: FnOnce(&dyn NativeSession) -> NativeResult<NativeTorrentRef>,
    {
        let mut guard = self.native.write();
        let fresh = add(self.session.as_ref())?;
        *guard = Arc::clone(&fresh);
        Ok(fresh)
    }

    /// Engine status snapshot.
    #[must_use]
    pub fn status(&self) -> TorrentStatus {
        self.native_handle().status()
    }

    /// Start the torrent after clearing any latched error.
    pub fn start(&self, mode: OperatingMode) {
        let native = self.native_handle();
        native.clear_error();
        native.unset_flags(TorrentFlags::UPLOAD_MODE);
        match mode {
            OperatingMode::Forced => {
                native.unset_flags(TorrentFlags::AUTO_MANAGED);
                native.resume();
            }
            OperatingMode::AutoManaged => native.set_flags(TorrentFlags::AUTO_MANAGED),
        }
    }

    /// Stop the torrent and take it out of queue management.
    pub fn stop(&self) {
        let native = self.native_handle();
        native.unset_flags(TorrentFlags::AUTO_MANAGED);
        native.pause();
    }

    /// Re-verify data on disk.
    pub fn force_recheck(&self) {
        self.native_handle().force_recheck();
    }

    /// Announce to one tracker, or every tracker when `None`.
    pub fn force_reannounce(&self, tracker_index: Option<usize>) {
        self.native_handle().force_reannounce(tracker_index);
    }

    /// Announce to the DHT.
    pub fn force_dht_announce(&self) {
        self.native_handle().force_dht_announce();
    }

    /// Append trackers whose URL is not present yet.
    pub fn add_trackers(&self, trackers: Vec<TrackerEntry>) {
        let native = self.native_handle();
        let mut known: Vec<String> = native.trackers().into_iter().map(|t| t.url).collect();
        let mut added = Vec::new();
        for tracker in trackers {
            if known.contains(&tracker.url) {
                continue;
            }
            known.push(tracker.url.clone());
            added.push(tracker.url.clone());
            native.add_tracker(tracker);
        }
        if !added.is_empty() {
            let _ = self.events.publish(Event::TrackersAdded {
                torrent_id: self.id,
                urls: added,
            });
        }
    }

    /// Remove trackers by URL.
    pub fn remove_trackers(&self, urls: &[String]) {
        let native = self.native_handle();
        let (removed, kept): (Vec<TrackerEntry>, Vec<TrackerEntry>) = native
            .trackers()
            .into_iter()
            .partition(|tracker| urls.contains(&tracker.url));
        if removed.is_empty() {
            return;
        }
        native.replace_trackers(kept);
        let _ = self.events.publish(Event::TrackersRemoved {
            torrent_id: self.id,
            urls: removed.into_iter().map(|t| t.url).collect(),
        });
    }

    /// Replace the tracker list.
    pub fn replace_trackers(&self, trackers: Vec<TrackerEntry>) {
        self.native_handle().replace_trackers(trackers);
        let _ = self.events.publish(Event::TrackersChanged {
            torrent_id: self.id,
        });
    }

    /// Add web seeds.
    pub fn add_url_seeds(&self, urls: &[String]) {
        let native = self.native_handle();
        for url in urls {
            native.add_url_seed(url);
        }
    }

    /// Remove web seeds.
    pub fn remove_url_seeds(&self, urls: &[String]) {
        let native = self.native_handle();
        for url in urls {
            native.remove_url_seed(url);
        }
    }

    /// Connect to `address`. Unparsable or refused addresses yield `false`.
    pub fn connect_peer(&self, address: &str) -> bool {
        let parsed: SocketAddr = match address.parse() {
            Ok(parsed) => parsed,
            Err(err) => {
                debug!(torrent_id = %self.id, address, error = %err, "ignoring unparsable peer address");
                return false;
            }
        };
        match self.native_handle().connect_peer(parsed) {
            Ok(()) => true,
            Err(err) => {
                debug!(torrent_id = %self.id, %parsed, error = %err.message, "peer connection refused");
                false
            }
        }
    }

    /// Disconnect every peer.
    pub fn clear_peers(&self) {
        self.native_handle().clear_peers();
    }

    /// Supply metadata for a magnet torrent. Rejected payloads yield `false`.
    pub fn set_metadata(&self, info_bytes: &[u8]) -> bool {
        match self.native_handle().set_metadata(info_bytes) {
            Ok(()) => true,
            Err(err) => {
                debug!(torrent_id = %self.id, error = %err.message, "metadata rejected");
                false
            }
        }
    }

    fn toggle_flag(&self, flag: TorrentFlags, enabled: bool) {
        let native = self.native_handle();
        if enabled {
            native.set_flags(flag);
        } else {
            native.unset_flags(flag);
        }
    }

    /// Request pieces in order.
    pub fn set_sequential_download(&self, enabled: bool) {
        self.toggle_flag(TorrentFlags::SEQUENTIAL_DOWNLOAD, enabled);
    }

    /// Initial seeding mode.
    pub fn set_super_seeding(&self, enabled: bool) {
        self.toggle_flag(TorrentFlags::SUPER_SEEDING, enabled);
    }

    /// Disable the DHT for this torrent.
    pub fn set_dht_disabled(&self, disabled: bool) {
        self.toggle_flag(TorrentFlags::DISABLE_DHT, disabled);
    }

    /// Disable peer exchange for this torrent.
    pub fn set_pex_disabled(&self, disabled: bool) {
        self.toggle_flag(TorrentFlags::DISABLE_PEX, disabled);
    }

    /// Disable local service discovery for this torrent.
    pub fn set_lsd_disabled(&self, disabled: bool) {
        self.toggle_flag(TorrentFlags::DISABLE_LSD, disabled);
    }

    /// Install TLS material. Incomplete parameters yield `false`.
    pub fn set_ssl_parameters(&self, params: &SslParameters) -> bool {
        if !params.is_valid() {
            return false;
        }
        self.native_handle().set_ssl_certificate(params);
        true
    }

    /// Upload limit in bytes per second, `0` for unlimited.
    pub fn set_upload_limit(&self, limit: i32) {
        self.native_handle().set_upload_limit(limit);
    }

    /// Download limit in bytes per second, `0` for unlimited.
    pub fn set_download_limit(&self, limit: i32) {
        self.native_handle().set_download_limit(limit);
    }

    /// Current upload limit.
    #[must_use]
    pub fn upload_limit(&self) -> i32 {
        self.native_handle().upload_limit()
    }

    /// Current download limit.
    #[must_use]
    pub fn download_limit(&self) -> i32 {
        self.native_handle().download_limit()
    }

    /// Flush the disk cache.
    pub fn flush_cache(&self) {
        self.native_handle().flush_cache();
    }

    /// Rename one file in storage.
    pub fn rename_file(&self, index: usize, new_path: &str) {
        self.native_handle().rename_file(index, new_path);
    }

    /// Set file priorities. Publishes [`Event::FilteredFilesChanged`] when a
    /// file moves into or out of [`DownloadPriority::Ignored`].
    pub fn prioritize_files(&self, priorities: &[DownloadPriority]) {
        let native = self.native_handle();
        let before = native.file_priorities();
        native.prioritize_files(priorities);
        let after = native.file_priorities();
        drop(native);

        let filtered_changed = before.iter().zip(&after).any(|(old, new)| {
            (*old == DownloadPriority::Ignored) != (*new == DownloadPriority::Ignored)
        });
        if filtered_changed {
            debug!(torrent_id = %self.id, "filtered file set changed");
            let _ = self.events.publish(Event::FilteredFilesChanged {
                torrent_id: self.id,
            });
        }
    }

    /// Current file priorities.
    #[must_use]
    pub fn file_priorities(&self) -> Vec<DownloadPriority> {
        self.native_handle().file_priorities()
    }

    /// Set piece priorities.
    pub fn prioritize_pieces(&self, priorities: &[DownloadPriority]) {
        self.native_handle().prioritize_pieces(priorities);
    }

    /// Ask for resume data; it arrives as an alert.
    pub fn request_resume_data(&self, flags: ResumeDataFlags) {
        self.native_handle().save_resume_data(flags);
    }

    /// Current trackers, synchronously.
    #[must_use]
    pub fn trackers(&self) -> Vec<TrackerEntry> {
        self.native_handle().trackers()
    }

    /// Connected peers.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn fetch_peer_info(&self) -> Fetch<Vec<PeerInfo>> {
        self.fetch("fetch_peer_info", |native| native.get_peer_info())
    }

    /// Pieces with outstanding requests.
    #[must_use]
    pub fn fetch_downloading_pieces(&self) -> Fetch<Vec<PieceIndex>> {
        self.fetch("fetch_downloading_pieces", |native| {
            native.get_download_queue()
        })
    }

    /// Peer count per piece.
    #[must_use]
    pub fn fetch_piece_availability(&self) -> Fetch<Vec<i32>> {
        self.fetch("fetch_piece_availability", |native| {
            native.piece_availability()
        })
    }

    /// Web seeds.
    #[must_use]
    pub fn fetch_url_seeds(&self) -> Fetch<Vec<String>> {
        self.fetch("fetch_url_seeds", |native| Ok(native.url_seeds()))
    }

    /// Trackers with per-endpoint announce state.
    #[must_use]
    pub fn fetch_announce_entries(&self) -> Fetch<Vec<TrackerEntry>> {
        self.fetch("fetch_announce_entries", |native| Ok(native.trackers()))
    }

    /// Metadata with piece hashes, falling back to the bare metadata when the
    /// engine did not keep them.
    #[must_use]
    pub fn fetch_torrent_file_with_hashes(&self) -> Fetch<Option<TorrentFileInfo>> {
        self.fetch("fetch_torrent_file_with_hashes", |native| {
            Ok(native
                .torrent_file_with_hashes()
                .or_else(|| native.torrent_file()))
        })
    }

    fn fetch<T, F>(&self, operation: &'static str, query: F) -> Fetch<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn NativeTorrent) -> NativeResult<T> + Send + 'static,
    {
        let native = self.native_handle();
        let torrent_id = self.id;
        let inner = tokio::task::spawn_blocking(move || {
            query(native.as_ref())
                .map_err(|err| TorrentError::operation_failed(operation, Some(torrent_id), err))
        });
        Fetch {
            operation,
            torrent_id,
            inner,
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("id", &self.id)
            .field("info_hash", &self.info_hash)
            .field("reload_state", &self.reload_state())
            .finish_non_exhaustive()
    }
}

/// Result of an offloaded engine query.
#[must_use = "a fetch does nothing useful unless awaited"]
pub struct Fetch<T> {
    operation: &'static str,
    torrent_id: Uuid,
    inner: JoinHandle<TorrentResult<T>>,
}

impl<T> Future for Fetch<T> {
    type Output = TorrentResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TorrentError::FetchAborted {
                operation: this.operation,
                torrent_id: this.torrent_id,
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}
