//! In-memory implementations of the model collaborators.

use parking_lot::Mutex;
use torrex_torrent_core::{
    ContentSource, DownloadPriority, TorrentMetadata, TrackerEntry, TrackerSource,
};
use uuid::Uuid;

struct ContentState {
    metadata: Option<TorrentMetadata>,
    priorities: Vec<DownloadPriority>,
    progress: Vec<f64>,
    availability: Vec<f64>,
}

/// Content source whose arrays tests set directly.
pub struct StaticContentSource {
    state: Mutex<ContentState>,
}

impl StaticContentSource {
    /// Source for `metadata` with every file at normal priority, no progress
    /// and unknown availability.
    #[must_use]
    pub fn new(metadata: TorrentMetadata) -> Self {
        let files = metadata.files.len();
        Self {
            state: Mutex::new(ContentState {
                metadata: Some(metadata),
                priorities: vec![DownloadPriority::Normal; files],
                progress: vec![0.0; files],
                availability: vec![-1.0; files],
            }),
        }
    }

    /// Source that has not received metadata yet.
    #[must_use]
    pub fn without_metadata() -> Self {
        Self {
            state: Mutex::new(ContentState {
                metadata: None,
                priorities: Vec::new(),
                progress: Vec::new(),
                availability: Vec::new(),
            }),
        }
    }

    /// Replace the per-file priorities.
    pub fn set_priorities(&self, priorities: Vec<DownloadPriority>) {
        self.state.lock().priorities = priorities;
    }

    /// Replace the per-file progress.
    pub fn set_progress(&self, progress: Vec<f64>) {
        self.state.lock().progress = progress;
    }

    /// Replace the per-file availability.
    pub fn set_availability(&self, availability: Vec<f64>) {
        self.state.lock().availability = availability;
    }
}

impl ContentSource for StaticContentSource {
    fn has_metadata(&self) -> bool {
        self.state.lock().metadata.is_some()
    }

    fn files_count(&self) -> usize {
        self.state
            .lock()
            .metadata
            .as_ref()
            .map_or(0, |metadata| metadata.files.len())
    }

    fn file_path(&self, index: usize) -> String {
        self.state
            .lock()
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.files.get(index))
            .map(|file| file.path.clone())
            .unwrap_or_default()
    }

    fn file_size(&self, index: usize) -> u64 {
        self.state
            .lock()
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.files.get(index))
            .map_or(0, |file| file.size)
    }

    fn file_priorities(&self) -> Vec<DownloadPriority> {
        self.state.lock().priorities.clone()
    }

    fn files_progress(&self) -> Vec<f64> {
        self.state.lock().progress.clone()
    }

    fn available_file_fractions(&self) -> Vec<f64> {
        self.state.lock().availability.clone()
    }
}

/// Tracker source with a mutable tracker list and feature switches.
#[allow(clippy::struct_excessive_bools)]
pub struct StaticTrackerSource {
    torrent_id: Uuid,
    trackers: Mutex<Vec<TrackerEntry>>,
    private: bool,
    dht_disabled: bool,
    pex_disabled: bool,
    lsd_disabled: bool,
}

impl StaticTrackerSource {
    /// Public torrent with `trackers` and every discovery feature enabled.
    #[must_use]
    pub fn new(trackers: Vec<TrackerEntry>) -> Self {
        Self {
            torrent_id: Uuid::new_v4(),
            trackers: Mutex::new(trackers),
            private: false,
            dht_disabled: false,
            pex_disabled: false,
            lsd_disabled: false,
        }
    }

    /// Mark the torrent private.
    #[must_use]
    pub const fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Disable peer exchange for this torrent only.
    #[must_use]
    pub const fn without_pex(mut self) -> Self {
        self.pex_disabled = true;
        self
    }

    /// Disable DHT for this torrent only.
    #[must_use]
    pub const fn without_dht(mut self) -> Self {
        self.dht_disabled = true;
        self
    }

    /// Disable local service discovery for this torrent only.
    #[must_use]
    pub const fn without_lsd(mut self) -> Self {
        self.lsd_disabled = true;
        self
    }

    /// Replace the tracker list.
    pub fn set_trackers(&self, trackers: Vec<TrackerEntry>) {
        *self.trackers.lock() = trackers;
    }
}

impl TrackerSource for StaticTrackerSource {
    fn torrent_id(&self) -> Uuid {
        self.torrent_id
    }

    fn trackers(&self) -> Vec<TrackerEntry> {
        self.trackers.lock().clone()
    }

    fn is_private(&self) -> bool {
        self.private
    }

    fn is_dht_disabled(&self) -> bool {
        self.dht_disabled
    }

    fn is_pex_disabled(&self) -> bool {
        self.pex_disabled
    }

    fn is_lsd_disabled(&self) -> bool {
        self.lsd_disabled
    }
}
