#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Torrent session backend: native engine facade, per-torrent handles, reload
//! protocol, port mapping registry and the worker that drains engine alerts.

/// Commands accepted by the session worker.
pub mod command;
pub mod error;
pub mod facade;
pub mod handle;
/// Narrow engine traits and the in-process engine.
pub mod native;
pub mod port_mapping;
pub mod reload;
pub mod resume;
pub mod storage_check;
pub mod types;
mod worker;

pub use command::SessionCommand;
pub use error::{SessionError, SessionResult};
pub use facade::{SessionFacade, SessionProxy};
pub use handle::{EngineHandle, Fetch, ReloadState};
pub use port_mapping::PortMappingRegistry;
pub use reload::ReloadCoordinator;
pub use resume::{ResumeDataStore, StoredResume};
pub use storage_check::{StorageCheckResult, check_file_storage};
pub use types::{AddTorrentOptions, SessionRuntimeConfig, Toggle};

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use torrex_events::EventBus;
use torrex_telemetry::Metrics;
use torrex_torrent_core::{
    OperatingMode, ResumeDataFlags, TorrentDescriptor, TorrentStatus, TrackerEntry,
};
use uuid::Uuid;

use native::{IpFilter, NativeSession};

const COMMAND_BUFFER: usize = 128;

/// Torrent lifecycle operations exposed to callers outside the session crate.
#[async_trait]
pub trait TorrentSession: Send + Sync {
    /// Queue an add; completion arrives as `TorrentAdded` or `TorrentAddFailed`.
    async fn add_torrent(
        &self,
        descriptor: TorrentDescriptor,
        options: AddTorrentOptions,
    ) -> SessionResult<()>;
    /// Remove a torrent and its partial-piece file.
    async fn remove_torrent(&self, id: Uuid) -> SessionResult<()>;
    /// Start a torrent in the given mode.
    async fn start_torrent(&self, id: Uuid, mode: OperatingMode) -> SessionResult<()>;
    /// Stop a torrent.
    async fn stop_torrent(&self, id: Uuid) -> SessionResult<()>;
    /// Identifiers of loaded torrents.
    async fn torrents(&self) -> SessionResult<Vec<Uuid>>;
}

/// Cloneable client of the session worker.
#[derive(Clone)]
pub struct Session {
    events: EventBus,
    commands: mpsc::Sender<SessionCommand>,
}

impl Session {
    /// Start a worker that owns `native` and publishes to `events`.
    #[must_use]
    pub fn new(native: Arc<dyn NativeSession>, events: EventBus, metrics: Metrics) -> Self {
        Self::build(native, events, metrics, None)
    }

    /// Start a worker that also restores from and persists to `store`.
    #[must_use]
    pub fn with_resume_store(
        native: Arc<dyn NativeSession>,
        events: EventBus,
        metrics: Metrics,
        store: ResumeDataStore,
    ) -> Self {
        Self::build(native, events, metrics, Some(store))
    }

    fn build(
        native: Arc<dyn NativeSession>,
        events: EventBus,
        metrics: Metrics,
        store: Option<ResumeDataStore>,
    ) -> Self {
        let facade = SessionFacade::new(native);
        let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
        worker::spawn(facade, events.clone(), metrics, store, rx);
        Self { events, commands }
    }

    /// Event bus the worker publishes to.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    async fn send_command(&self, command: SessionCommand) -> SessionResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|err| SessionError::CommandChannelClosed {
                command: err.0.name(),
            })
    }

    async fn query<T>(
        &self,
        query: &'static str,
        build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand + Send,
    ) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send_command(build(tx)).await?;
        rx.await.map_err(|_| SessionError::ResponseDropped { query })
    }

    /// Pause every torrent.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn pause_session(&self) -> SessionResult<()> {
        self.send_command(SessionCommand::PauseSession).await
    }

    /// Resume the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn resume_session(&self) -> SessionResult<()> {
        self.send_command(SessionCommand::ResumeSession).await
    }

    /// Replace a torrent's engine object in place and return its new status.
    ///
    /// # Errors
    ///
    /// Returns an error if the torrent is unknown, the engine rejects the
    /// re-add, or the worker is gone.
    pub async fn reload_torrent(
        &self,
        id: Uuid,
        descriptor: TorrentDescriptor,
        is_stopped: bool,
        mode: OperatingMode,
    ) -> anyhow::Result<TorrentStatus> {
        self.query("reload", |respond_to| SessionCommand::Reload {
            id,
            descriptor: Box::new(descriptor),
            is_stopped,
            mode,
            respond_to,
        })
        .await?
    }

    /// Block a single address.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn block_ip(&self, addr: IpAddr) -> SessionResult<()> {
        self.send_command(SessionCommand::BlockIp(addr)).await
    }

    /// Replace the IP filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn set_ip_filter(&self, filter: IpFilter) -> SessionResult<()> {
        self.send_command(SessionCommand::SetIpFilter(filter)).await
    }

    /// Enable or disable `UPnP` and NAT-PMP.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn set_port_mapping_enabled(&self, enabled: bool) -> SessionResult<()> {
        self.send_command(SessionCommand::SetPortMappingEnabled(enabled))
            .await
    }

    /// Map ports on the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn add_mapped_ports(&self, ports: Vec<u16>) -> SessionResult<()> {
        self.send_command(SessionCommand::AddMappedPorts(ports))
            .await
    }

    /// Remove gateway mappings.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn remove_mapped_ports(&self, ports: Vec<u16>) -> SessionResult<()> {
        self.send_command(SessionCommand::RemoveMappedPorts(ports))
            .await
    }

    /// Apply a runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn apply_runtime_config(&self, config: SessionRuntimeConfig) -> SessionResult<()> {
        self.send_command(SessionCommand::ApplyConfig(Box::new(config)))
            .await
    }

    /// Append trackers to a torrent.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn add_trackers(&self, id: Uuid, trackers: Vec<TrackerEntry>) -> SessionResult<()> {
        self.send_command(SessionCommand::AddTrackers { id, trackers })
            .await
    }

    /// Remove trackers from a torrent.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn remove_trackers(&self, id: Uuid, urls: Vec<String>) -> SessionResult<()> {
        self.send_command(SessionCommand::RemoveTrackers { id, urls })
            .await
    }

    /// Replace a torrent's tracker list.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn replace_trackers(
        &self,
        id: Uuid,
        trackers: Vec<TrackerEntry>,
    ) -> SessionResult<()> {
        self.send_command(SessionCommand::ReplaceTrackers { id, trackers })
            .await
    }

    /// Ask for resume data; it is written to the store when it arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn request_resume_data(&self, id: Uuid, flags: ResumeDataFlags) -> SessionResult<()> {
        self.send_command(SessionCommand::RequestResumeData { id, flags })
            .await
    }

    /// Handle of a loaded torrent.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn handle(&self, id: Uuid) -> SessionResult<Option<Arc<EngineHandle>>> {
        self.query("handle", |respond_to| SessionCommand::QueryHandle {
            id,
            respond_to,
        })
        .await
    }

    /// Whether the engine has a listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn is_listening(&self) -> SessionResult<bool> {
        self.query("listening", |respond_to| SessionCommand::QueryListening {
            respond_to,
        })
        .await
    }

    /// Ports currently mapped on the gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is gone.
    pub async fn mapped_ports(&self) -> SessionResult<Vec<u16>> {
        self.query("mapped_ports", |respond_to| {
            SessionCommand::QueryMappedPorts { respond_to }
        })
        .await
    }

    /// Persist resume data, detach the engine and release it after `grace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker is already gone.
    pub async fn shutdown(&self, grace: Duration) -> SessionResult<()> {
        self.query("shutdown", |respond_to| SessionCommand::Shutdown {
            grace,
            respond_to,
        })
        .await
    }
}

#[async_trait]
impl TorrentSession for Session {
    async fn add_torrent(
        &self,
        descriptor: TorrentDescriptor,
        options: AddTorrentOptions,
    ) -> SessionResult<()> {
        self.send_command(SessionCommand::Add {
            descriptor: Box::new(descriptor),
            options,
        })
        .await
    }

    async fn remove_torrent(&self, id: Uuid) -> SessionResult<()> {
        self.send_command(SessionCommand::Remove { id }).await
    }

    async fn start_torrent(&self, id: Uuid, mode: OperatingMode) -> SessionResult<()> {
        self.send_command(SessionCommand::Start { id, mode }).await
    }

    async fn stop_torrent(&self, id: Uuid) -> SessionResult<()> {
        self.send_command(SessionCommand::Stop { id }).await
    }

    async fn torrents(&self) -> SessionResult<Vec<Uuid>> {
        self.query("torrents", |respond_to| SessionCommand::QueryTorrents {
            respond_to,
        })
        .await
    }
}
