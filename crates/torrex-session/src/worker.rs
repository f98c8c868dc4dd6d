#![allow(clippy::redundant_pub_crate)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::{mpsc, oneshot};
use torrex_events::{Event, EventBus};
use torrex_telemetry::{Metrics, ReloadOutcome};
use torrex_torrent_core::{
    InfoHash, OperatingMode, ResumeDataFlags, TorrentDescriptor, TorrentStatus,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::command::SessionCommand;
use crate::error::SessionError;
use crate::facade::SessionFacade;
use crate::handle::EngineHandle;
use crate::native::{Alert, NativeError, NativeTorrentRef};
use crate::reload::ReloadCoordinator;
use crate::resume::ResumeDataStore;
use crate::storage_check::{StorageCheckResult, check_file_storage};
use crate::types::{AddTorrentOptions, SessionRuntimeConfig};

const ALERT_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub(crate) fn spawn(
    facade: SessionFacade,
    events: EventBus,
    metrics: Metrics,
    store: Option<ResumeDataStore>,
    mut commands: mpsc::Receiver<SessionCommand>,
) {
    tokio::spawn(async move {
        let alerts_ready = facade.alerts_ready();
        let mut worker = Worker::new(facade, events, metrics, store);
        worker.restore_from_store().await;
        let mut poll = tokio::time::interval(ALERT_POLL_INTERVAL);
        let mut stop = None;
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    let name = command.name();
                    match worker.handle(command).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Stop { grace, respond_to }) => {
                            stop = Some((grace, respond_to));
                            break;
                        }
                        Err(err) => worker.command_failed(name, &err),
                    }
                }
                () = alerts_ready.notified() => {
                    worker.publish(Event::AlertsReady);
                    worker.drain_alerts().await;
                }
                _ = poll.tick() => worker.drain_alerts().await,
            }
        }

        drop(commands);
        let (grace, respond_to) = match stop {
            Some((grace, respond_to)) => (grace, Some(respond_to)),
            None => (Duration::ZERO, None),
        };
        worker.shutdown(grace).await;
        if let Some(respond_to) = respond_to {
            let _ = respond_to.send(());
        }
    });
}

enum Flow {
    Continue,
    Stop {
        grace: Duration,
        respond_to: oneshot::Sender<()>,
    },
}

struct Worker {
    facade: SessionFacade,
    events: EventBus,
    metrics: Metrics,
    store: Option<ResumeDataStore>,
    reload: ReloadCoordinator,
    handles: HashMap<Uuid, Arc<EngineHandle>>,
    ids_by_hash: HashMap<InfoHash, Uuid>,
    recheck_on_add: HashSet<InfoHash>,
    health: BTreeSet<String>,
    listening: bool,
    merge_trackers: bool,
}

impl Worker {
    fn new(
        facade: SessionFacade,
        events: EventBus,
        metrics: Metrics,
        store: Option<ResumeDataStore>,
    ) -> Self {
        let listening = facade.is_session_listening();
        Self {
            reload: ReloadCoordinator::new(events.clone()),
            facade,
            events,
            metrics,
            store,
            handles: HashMap::new(),
            ids_by_hash: HashMap::new(),
            recheck_on_add: HashSet::new(),
            health: BTreeSet::new(),
            listening,
            merge_trackers: false,
        }
    }

    /// Re-add every torrent found in the resume store. Torrents whose files
    /// are incomplete on disk are rechecked once the engine accepts them.
    async fn restore_from_store(&mut self) {
        let Some(store) = self.store.clone() else {
            return;
        };
        if let Err(err) = store.offload(ResumeDataStore::ensure_initialized).await {
            self.mark_degraded("resume_store", Some(&err.to_string()));
            return;
        }
        let stored = match store.offload(ResumeDataStore::load_all).await {
            Ok(stored) => stored,
            Err(err) => {
                self.mark_degraded("resume_store", Some(&err.to_string()));
                return;
            }
        };

        let mut restored = 0_usize;
        for entry in stored {
            let params = match self.facade.read_resume_data(&entry.payload) {
                Ok(params) => params,
                Err(err) => {
                    warn!(
                        info_hash = %entry.info_hash,
                        error = %err.message,
                        "discarding unreadable resume data"
                    );
                    continue;
                }
            };
            if let (Some(save_path), Some(metadata)) =
                (params.save_path.as_deref(), params.metadata.as_ref())
            {
                let check = check_file_storage(save_path, &metadata.files).await;
                if check != StorageCheckResult::Ok {
                    warn!(
                        info_hash = %entry.info_hash,
                        result = ?check,
                        "stored data incomplete; scheduling recheck"
                    );
                    self.recheck_on_add.insert(params.info_hash);
                }
            }
            self.facade.add_params_async(params);
            restored += 1;
        }
        info!(count = restored, "queued torrents from resume store");
    }

    async fn handle(&mut self, command: SessionCommand) -> Result<Flow> {
        match command {
            SessionCommand::Add {
                descriptor,
                options,
            } => self.add_torrent(&descriptor, &options),
            SessionCommand::Remove { id } => {
                let handle = self.handle_for(id)?;
                self.facade.remove_torrent(&handle);
            }
            SessionCommand::PauseSession => self.facade.pause(),
            SessionCommand::ResumeSession => self.facade.resume(),
            SessionCommand::Start { id, mode } => self.handle_for(id)?.start(mode),
            SessionCommand::Stop { id } => self.handle_for(id)?.stop(),
            SessionCommand::Reload {
                id,
                descriptor,
                is_stopped,
                mode,
                respond_to,
            } => {
                let outcome = self.handle_reload(id, &descriptor, is_stopped, mode).await;
                let _ = respond_to.send(outcome);
            }
            SessionCommand::BlockIp(addr) => self.facade.block_ip(addr),
            SessionCommand::SetIpFilter(filter) => self.facade.set_ip_filter(filter),
            SessionCommand::SetPortMappingEnabled(enabled) => {
                self.set_port_mapping_enabled(enabled);
            }
            SessionCommand::AddMappedPorts(ports) => {
                if self.facade.add_mapped_ports(&ports) {
                    self.publish_port_mappings();
                }
            }
            SessionCommand::RemoveMappedPorts(ports) => {
                if self.facade.remove_mapped_ports(&ports) {
                    self.publish_port_mappings();
                }
            }
            SessionCommand::ApplyConfig(config) => self.apply_config(&config),
            SessionCommand::AddTrackers { id, trackers } => {
                self.handle_for(id)?.add_trackers(trackers);
            }
            SessionCommand::RemoveTrackers { id, urls } => {
                self.handle_for(id)?.remove_trackers(&urls);
            }
            SessionCommand::ReplaceTrackers { id, trackers } => {
                self.handle_for(id)?.replace_trackers(trackers);
            }
            SessionCommand::RequestResumeData { id, flags } => {
                self.handle_for(id)?.request_resume_data(flags);
            }
            SessionCommand::QueryHandle { id, respond_to } => {
                let _ = respond_to.send(self.handles.get(&id).cloned());
            }
            SessionCommand::QueryTorrents { respond_to } => {
                let mut ids: Vec<Uuid> = self.handles.keys().copied().collect();
                ids.sort_unstable();
                let _ = respond_to.send(ids);
            }
            SessionCommand::QueryListening { respond_to } => {
                let _ = respond_to.send(self.facade.is_session_listening());
            }
            SessionCommand::QueryMappedPorts { respond_to } => {
                let _ = respond_to.send(self.facade.mapped_ports());
            }
            SessionCommand::Shutdown { grace, respond_to } => {
                return Ok(Flow::Stop { grace, respond_to });
            }
        }

        self.drain_alerts().await;
        Ok(Flow::Continue)
    }

    fn handle_for(&self, id: Uuid) -> Result<Arc<EngineHandle>> {
        self.handles
            .get(&id)
            .cloned()
            .ok_or_else(|| SessionError::UnknownTorrent { torrent_id: id }.into())
    }

    async fn handle_reload(
        &mut self,
        id: Uuid,
        descriptor: &TorrentDescriptor,
        is_stopped: bool,
        mode: OperatingMode,
    ) -> Result<TorrentStatus> {
        let handle = self.handle_for(id)?;
        let coordinator = self.reload.clone();
        let params = descriptor.add_torrent_params();
        let outcome = tokio::task::spawn_blocking(move || {
            coordinator.reload(&handle, params, is_stopped, mode)
        })
        .await
        .map_err(|err| anyhow!("reload task did not complete: {err}"))
        .and_then(|result| result.map_err(anyhow::Error::from));

        self.metrics.inc_reload(if outcome.is_ok() {
            ReloadOutcome::Succeeded
        } else {
            ReloadOutcome::Failed
        });
        outcome
    }

    fn set_port_mapping_enabled(&mut self, enabled: bool) {
        let before = self.facade.mapped_ports();
        self.facade.set_port_mapping_enabled(enabled);
        if self.facade.mapped_ports() != before {
            self.publish_port_mappings();
        }
    }

    /// A loaded torrent either absorbs the descriptor's trackers and web seeds
    /// or is left to the engine, which reports the duplicate.
    fn add_torrent(&self, descriptor: &TorrentDescriptor, options: &AddTorrentOptions) {
        let existing = self
            .ids_by_hash
            .get(&descriptor.info_hash)
            .and_then(|id| self.handles.get(id));
        match existing {
            Some(handle) if self.merge_trackers => {
                handle.add_trackers(descriptor.trackers.clone());
                handle.add_url_seeds(&descriptor.url_seeds);
                info!(
                    torrent_id = %handle.id(),
                    info_hash = %descriptor.info_hash,
                    "merged trackers into loaded torrent"
                );
            }
            _ => self.facade.add_torrent_async(descriptor, options),
        }
    }

    fn apply_config(&mut self, config: &SessionRuntimeConfig) {
        self.merge_trackers = config.merge_trackers.is_enabled();
        self.set_port_mapping_enabled(config.port_mapping.is_enabled());
        self.facade.apply_settings(config.to_settings_pack());
        let pex_disabled = !config.enable_pex.is_enabled();
        for handle in self.handles.values() {
            handle.set_pex_disabled(pex_disabled);
        }
        info!(
            listen_port = config.listen_port,
            dht = config.enable_dht.is_enabled(),
            pex = config.enable_pex.is_enabled(),
            lsd = config.enable_lsd.is_enabled(),
            port_mapping = config.port_mapping.is_enabled(),
            merge_trackers = self.merge_trackers,
            "applied session runtime configuration"
        );
    }

    async fn drain_alerts(&mut self) {
        let alerts = self.facade.get_pending_alerts(Duration::ZERO);
        if alerts.is_empty() {
            return;
        }
        self.metrics.add_alerts_drained(alerts.len());
        for alert in alerts {
            debug!(alert = alert.kind(), "handling engine alert");
            self.handle_alert(alert).await;
        }
        self.metrics.set_active_torrents(self.handles.len());
    }

    async fn handle_alert(&mut self, alert: Alert) {
        match alert {
            Alert::AddTorrent {
                info_hash,
                name,
                result,
            } => self.on_add_finished(info_hash, name, result),
            Alert::TorrentRemoved { info_hash } => self.on_torrent_removed(info_hash).await,
            Alert::StateUpdate { statuses } => {
                debug!(changed = statuses.len(), "torrent status update");
            }
            Alert::SessionStats { counters } => {
                debug!(counters = counters.len(), "session stats received");
            }
            Alert::TrackerReply {
                info_hash,
                url,
                num_peers,
            } => {
                debug!(info_hash = %info_hash, url = %url, num_peers, "tracker reply");
                self.publish_tracker_update(info_hash, url);
            }
            Alert::TrackerError {
                info_hash,
                url,
                message,
            } => {
                warn!(info_hash = %info_hash, url = %url, error = %message, "tracker announce failed");
                self.publish_tracker_update(info_hash, url);
            }
            Alert::ListenSucceeded { endpoint } => {
                info!(endpoint = %endpoint, "session listening");
                self.set_listening(true);
                self.mark_recovered("listen");
            }
            Alert::ListenFailed { message } => {
                self.set_listening(false);
                self.mark_degraded("listen", Some(&message));
            }
            Alert::PortMapped {
                handle,
                external_port,
            } => {
                debug!(mapping = handle.0, external_port, "port mapped");
                self.mark_recovered("port_mapping");
            }
            Alert::PortMapError { handle, message } => {
                let detail = format!("mapping {}: {message}", handle.0);
                self.mark_degraded("port_mapping", Some(&detail));
            }
            Alert::SaveResumeData { info_hash, payload } => {
                self.persist_resume_data(info_hash, payload).await;
            }
            Alert::SaveResumeDataFailed { info_hash, message } => {
                warn!(info_hash = %info_hash, error = %message, "resume data generation failed");
            }
            Alert::MetadataReceived { info_hash } => {
                info!(info_hash = %info_hash, "metadata received");
                if let Some(handle) = self.handle_by_hash(&info_hash) {
                    handle.request_resume_data(ResumeDataFlags {
                        save_info_dict: true,
                        ..ResumeDataFlags::default()
                    });
                }
            }
            Alert::TorrentError { info_hash, message } => {
                let detail = format!("{info_hash}: {message}");
                self.mark_degraded("torrents", Some(&detail));
            }
        }
    }

    fn on_add_finished(
        &mut self,
        info_hash: InfoHash,
        name: String,
        result: Result<NativeTorrentRef, NativeError>,
    ) {
        let recheck = self.recheck_on_add.remove(&info_hash);
        match result {
            Ok(native) => {
                let id = Uuid::new_v4();
                let handle = Arc::new(EngineHandle::new(
                    id,
                    self.facade.native(),
                    native,
                    self.events.clone(),
                ));
                if recheck {
                    handle.force_recheck();
                }
                self.handles.insert(id, handle);
                self.ids_by_hash.insert(info_hash, id);
                info!(torrent_id = %id, info_hash = %info_hash, name = %name, "torrent added");
                self.publish(Event::TorrentAdded {
                    torrent_id: id,
                    info_hash: info_hash.to_hex(),
                    name,
                });
            }
            Err(err) => {
                warn!(
                    info_hash = %info_hash,
                    operation = err.operation,
                    error = %err.message,
                    "torrent add failed"
                );
                self.publish(Event::TorrentAddFailed {
                    info_hash: info_hash.to_hex(),
                    message: err.message,
                });
            }
        }
    }

    async fn on_torrent_removed(&mut self, info_hash: InfoHash) {
        let Some(id) = self.ids_by_hash.get(&info_hash).copied() else {
            return;
        };
        if self.handles.get(&id).is_some_and(|handle| handle.is_valid()) {
            debug!(torrent_id = %id, "removal superseded by reload");
            return;
        }
        self.ids_by_hash.remove(&info_hash);
        self.handles.remove(&id);
        if let Some(store) = &self.store
            && let Err(err) = store
                .offload(move |store| store.remove(&info_hash))
                .await
        {
            let detail = err.to_string();
            self.mark_degraded("resume_store", Some(&detail));
        }
        info!(torrent_id = %id, info_hash = %info_hash, "torrent removed");
        self.publish(Event::TorrentRemoved { torrent_id: id });
    }

    fn handle_by_hash(&self, info_hash: &InfoHash) -> Option<Arc<EngineHandle>> {
        self.ids_by_hash
            .get(info_hash)
            .and_then(|id| self.handles.get(id))
            .cloned()
    }

    fn publish_tracker_update(&self, info_hash: InfoHash, url: String) {
        if let Some(id) = self.ids_by_hash.get(&info_hash).copied() {
            self.publish(Event::TrackerEntriesUpdated {
                torrent_id: id,
                urls: vec![url],
            });
        }
    }

    fn publish_port_mappings(&self) {
        let mapped_ports = self.facade.mapped_ports();
        self.metrics.set_mapped_ports(mapped_ports.len());
        self.publish(Event::PortMappingChanged { mapped_ports });
    }

    fn set_listening(&mut self, listening: bool) {
        if self.listening != listening {
            self.listening = listening;
            self.publish(Event::ListenStateChanged { listening });
        }
    }

    async fn persist_resume_data(&mut self, info_hash: InfoHash, payload: Vec<u8>) {
        let Some(store) = &self.store else {
            return;
        };
        let saved = store
            .offload(move |store| store.save(&info_hash, &payload))
            .await;
        match saved {
            Ok(()) => self.mark_recovered("resume_store"),
            Err(err) => {
                let detail = err.to_string();
                self.mark_degraded("resume_store", Some(&detail));
            }
        }
    }

    async fn persist_queue_order(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let mut queued: Vec<(u32, InfoHash)> = self
            .handles
            .values()
            .filter_map(|handle| {
                handle
                    .native_handle()
                    .queue_position()
                    .map(|position| (position, handle.info_hash()))
            })
            .collect();
        queued.sort_unstable_by_key(|(position, _)| *position);
        let order: Vec<InfoHash> = queued.into_iter().map(|(_, hash)| hash).collect();
        if let Err(err) = store
            .offload(move |store| store.save_queue(&order))
            .await
        {
            let detail = err.to_string();
            self.mark_degraded("resume_store", Some(&detail));
        }
    }

    fn command_failed(&mut self, command: &'static str, err: &anyhow::Error) {
        if let Some(SessionError::UnknownTorrent { torrent_id }) =
            err.downcast_ref::<SessionError>()
        {
            warn!(command, torrent_id = %torrent_id, "command targets an unknown torrent");
            return;
        }
        let detail = err.to_string();
        self.mark_degraded("session", Some(&detail));
        warn!(command, error = %err, "session command handling failed");
    }

    async fn shutdown(mut self, grace: Duration) {
        if self.store.is_some() {
            for handle in self.handles.values() {
                handle.request_resume_data(ResumeDataFlags {
                    save_info_dict: true,
                    ..ResumeDataFlags::default()
                });
            }
            self.drain_alerts().await;
            self.persist_queue_order().await;
        }
        let torrents = self.handles.len();
        self.handles.clear();
        let proxy = self.facade.abort();
        proxy.dispose(grace).await;
        info!(torrents, "session worker stopped");
    }

    fn publish(&self, event: Event) {
        self.metrics.inc_event(event.kind());
        let _ = self.events.publish(event);
    }

    fn mark_degraded(&mut self, component: &str, detail: Option<&str>) {
        let inserted = self.health.insert(component.to_string());
        if inserted {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            self.publish(Event::HealthChanged { degraded });
            if let Some(detail) = detail {
                warn!(component, detail = %detail, "session component degraded");
            } else {
                warn!(component, "session component degraded");
            }
        } else if let Some(detail) = detail {
            warn!(component, detail = %detail, "session component still degraded");
        }
    }

    fn mark_recovered(&mut self, component: &str) {
        if self.health.remove(component) {
            let degraded = self.health.iter().cloned().collect::<Vec<_>>();
            self.publish(Event::HealthChanged { degraded });
            info!(component, "session component recovered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{MemoryEngine, NativeSession};
    use torrex_test_support::fixtures;
    use tokio::time::timeout;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn next_matching<F>(stream: &mut torrex_events::EventStream, mut pred: F) -> Result<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        loop {
            let envelope = timeout(TIMEOUT, stream.next())
                .await?
                .ok_or_else(|| anyhow!("event stream closed"))?;
            if pred(&envelope.event) {
                return Ok(envelope.event);
            }
        }
    }

    fn start(engine: &MemoryEngine, events: &EventBus) -> Result<mpsc::Sender<SessionCommand>> {
        let facade = SessionFacade::new(Arc::new(engine.clone()) as Arc<dyn NativeSession>);
        let (tx, rx) = mpsc::channel(8);
        spawn(facade, events.clone(), Metrics::new()?, None, rx);
        Ok(tx)
    }

    #[tokio::test]
    async fn add_failure_is_published_with_info_hash() -> Result<()> {
        let engine = MemoryEngine::new();
        engine.fail_next_add("disk full");
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let commands = start(&engine, &events)?;

        let descriptor = fixtures::descriptor_with_hash(9);
        commands
            .send(SessionCommand::Add {
                descriptor: Box::new(descriptor.clone()),
                options: crate::types::AddTorrentOptions::default(),
            })
            .await?;

        let event = next_matching(&mut stream, |event| {
            matches!(event, Event::TorrentAddFailed { .. })
        })
        .await?;
        assert_eq!(
            event,
            Event::TorrentAddFailed {
                info_hash: descriptor.info_hash.to_hex(),
                message: "disk full".to_string(),
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_add_merges_trackers_when_enabled() -> Result<()> {
        let engine = MemoryEngine::new();
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let commands = start(&engine, &events)?;

        let descriptor = fixtures::descriptor_with_hash(4);
        commands
            .send(SessionCommand::Add {
                descriptor: Box::new(descriptor.clone()),
                options: AddTorrentOptions::default(),
            })
            .await?;
        let added = next_matching(&mut stream, |event| {
            matches!(event, Event::TorrentAdded { .. })
        })
        .await?;
        let torrent_id = added
            .torrent_id()
            .ok_or_else(|| anyhow!("added event without torrent id"))?;

        commands
            .send(SessionCommand::ApplyConfig(Box::new(SessionRuntimeConfig {
                merge_trackers: crate::types::Toggle(true),
                ..SessionRuntimeConfig::default()
            })))
            .await?;
        let mut duplicate = descriptor.clone();
        duplicate
            .trackers
            .push(torrex_torrent_core::TrackerEntry::new("udp://extra.example:80", 1));
        commands
            .send(SessionCommand::Add {
                descriptor: Box::new(duplicate),
                options: AddTorrentOptions::default(),
            })
            .await?;

        let merged = next_matching(&mut stream, |event| {
            matches!(event, Event::TrackersAdded { .. } | Event::TorrentAddFailed { .. })
        })
        .await?;
        assert_eq!(
            merged,
            Event::TrackersAdded {
                torrent_id,
                urls: vec!["udp://extra.example:80".to_string()],
            }
        );
        assert_eq!(engine.torrent_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_torrent_does_not_degrade_health() -> Result<()> {
        let engine = MemoryEngine::new();
        let events = EventBus::new();
        let commands = start(&engine, &events)?;
        commands
            .send(SessionCommand::Stop { id: Uuid::new_v4() })
            .await?;
        let (tx, rx) = oneshot::channel();
        commands
            .send(SessionCommand::QueryTorrents { respond_to: tx })
            .await?;
        assert!(timeout(TIMEOUT, rx).await??.is_empty());

        let mut stream = events.subscribe(None);
        let (done_tx, done_rx) = oneshot::channel();
        commands
            .send(SessionCommand::Shutdown {
                grace: Duration::ZERO,
                respond_to: done_tx,
            })
            .await?;
        timeout(TIMEOUT, done_rx).await??;
        while let Ok(Some(envelope)) = timeout(Duration::from_millis(20), stream.next()).await {
            assert!(!matches!(envelope.event, Event::HealthChanged { .. }));
        }
        Ok(())
    }
}
