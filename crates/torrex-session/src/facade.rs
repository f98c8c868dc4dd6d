//! Single owner of the native session.
//!
//! # Design
//! - Every session-wide mutation goes through `&mut self` or `&self` on the one
//!   facade value owned by the session worker, so mutations are ordered.
//! - The engine's alert-ready callback only wakes a `tokio::sync::Notify`; it
//!   never calls back into the engine.
//! - Shutdown is two-phase: [`SessionFacade::abort`] detaches the engine into a
//!   [`SessionProxy`] that the caller disposes after a grace period.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use torrex_torrent_core::{AddTorrentParams, TorrentDescriptor};
use tracing::{debug, warn};

use crate::handle::EngineHandle;
use crate::native::{
    Alert, IpAccess, IpFilter, NativeResult, NativeSession, NativeSessionProxy, PeerClassFilter,
    PeerClassTypeFilter, PortProtocol, RemoveFlags, SettingKey, SettingsPack,
};
use crate::port_mapping::PortMappingRegistry;
use crate::types::AddTorrentOptions;

/// Serialization point for all session-wide native operations.
pub struct SessionFacade {
    native: Arc<dyn NativeSession>,
    port_mappings: PortMappingRegistry,
    port_mapping_enabled: bool,
    alerts_ready: Arc<Notify>,
}

impl SessionFacade {
    /// Take ownership of a native session and install the alert-ready callback.
    #[must_use]
    pub fn new(native: Arc<dyn NativeSession>) -> Self {
        let alerts_ready = Arc::new(Notify::new());
        let signal = Arc::clone(&alerts_ready);
        native.set_alert_notify(Box::new(move || signal.notify_one()));
        let settings = native.settings();
        let port_mapping_enabled = settings.get_bool(SettingKey::EnableUpnp).unwrap_or(false)
            || settings.get_bool(SettingKey::EnableNatpmp).unwrap_or(false);
        Self {
            native,
            port_mappings: PortMappingRegistry::new(),
            port_mapping_enabled,
            alerts_ready,
        }
    }

    /// Native session shared with per-torrent handles.
    #[must_use]
    pub fn native(&self) -> Arc<dyn NativeSession> {
        Arc::clone(&self.native)
    }

    /// Wake signal raised whenever the engine queues alerts.
    #[must_use]
    pub fn alerts_ready(&self) -> Arc<Notify> {
        Arc::clone(&self.alerts_ready)
    }

    /// Pause the session.
    pub fn pause(&self) {
        self.native.pause();
    }

    /// Resume the session.
    pub fn resume(&self) {
        self.native.resume();
    }

    /// Whether the session is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.native.is_paused()
    }

    /// Queue an add. The outcome arrives as [`Alert::AddTorrent`] keyed by info hash.
    pub fn add_torrent_async(&self, descriptor: &TorrentDescriptor, options: &AddTorrentOptions) {
        let params = options.apply(descriptor.add_torrent_params());
        debug!(info_hash = %descriptor.info_hash, name = %descriptor.name, "queueing torrent add");
        self.native.async_add_torrent(params);
    }

    /// Queue an add from prepared parameters such as decoded resume data.
    pub fn add_params_async(&self, params: AddTorrentParams) {
        debug!(info_hash = %params.info_hash, "queueing torrent add from parameters");
        self.native.async_add_torrent(params);
    }

    /// Decode a stored resume payload.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`crate::native::NativeError`] when the payload is unusable.
    pub fn read_resume_data(&self, payload: &[u8]) -> NativeResult<AddTorrentParams> {
        self.native.read_resume_data(payload)
    }

    /// Remove a torrent and its partial-piece file.
    pub fn remove_torrent(&self, handle: &EngineHandle) {
        let native = handle.native_handle();
        self.native.remove_torrent(&native, RemoveFlags::DELETE_PARTFILE);
    }

    /// Add a block rule for the single address `addr` on top of the current filter.
    pub fn block_ip(&self, addr: IpAddr) {
        let mut filter = self.native.ip_filter();
        filter.add_rule(addr, addr, IpAccess::Blocked);
        self.native.set_ip_filter(filter);
    }

    /// Replace the IP filter.
    pub fn set_ip_filter(&self, filter: IpFilter) {
        self.native.set_ip_filter(filter);
    }

    /// Replace both peer class filters.
    pub fn set_peer_filters(&self, class_filter: PeerClassFilter, type_filter: PeerClassTypeFilter) {
        self.native.set_peer_class_filter(class_filter);
        self.native.set_peer_class_type_filter(type_filter);
    }

    /// Whether port mapping is enabled.
    #[must_use]
    pub const fn is_port_mapping_enabled(&self) -> bool {
        self.port_mapping_enabled
    }

    /// Toggle both port mappers. Disabling forgets every registered port; the
    /// engine tears its mappings down itself.
    pub fn set_port_mapping_enabled(&mut self, enabled: bool) {
        if self.port_mapping_enabled == enabled {
            return;
        }
        self.port_mapping_enabled = enabled;
        if !enabled {
            self.port_mappings.clear();
        }
        let mut settings = SettingsPack::new();
        settings.set_bool(SettingKey::EnableUpnp, enabled);
        settings.set_bool(SettingKey::EnableNatpmp, enabled);
        self.native.apply_settings(settings);
    }

    /// Map each port not mapped yet. Returns whether the registry changed.
    pub fn add_mapped_ports(&mut self, ports: &[u16]) -> bool {
        if !self.port_mapping_enabled {
            return false;
        }
        let mut changed = false;
        for port in ports {
            let native = &self.native;
            let added = self
                .port_mappings
                .add(*port, || native.add_port_mapping(PortProtocol::Tcp, *port, *port));
            if !added && !self.port_mappings.contains(*port) {
                warn!(port = *port, "no port mapper produced a mapping");
            }
            changed |= added;
        }
        changed
    }

    /// Unmap each registered port. Returns whether the registry changed.
    pub fn remove_mapped_ports(&mut self, ports: &[u16]) -> bool {
        if !self.port_mapping_enabled {
            return false;
        }
        let mut changed = false;
        for port in ports {
            let native = &self.native;
            changed |= self
                .port_mappings
                .remove(*port, |handle| native.delete_port_mapping(handle));
        }
        changed
    }

    /// Ports currently in the registry.
    #[must_use]
    pub fn mapped_ports(&self) -> Vec<u16> {
        self.port_mappings.ports()
    }

    /// Apply a settings delta.
    pub fn apply_settings(&self, settings: SettingsPack) {
        self.native.apply_settings(settings);
    }

    /// Wait up to `timeout` for alerts, then drain the queue.
    ///
    /// A zero timeout polls. A non-zero timeout blocks the calling thread.
    #[must_use]
    pub fn get_pending_alerts(&self, timeout: Duration) -> Vec<Alert> {
        if !timeout.is_zero() {
            self.native.wait_for_alert(timeout);
        }
        self.native.pop_alerts()
    }

    /// Whether the engine has bound a listening socket.
    #[must_use]
    pub fn is_session_listening(&self) -> bool {
        self.native.is_listening()
    }

    /// Ask the engine for status alerts of changed torrents.
    pub fn post_torrent_updates(&self) {
        self.native.post_torrent_updates();
    }

    /// Ask the engine for a counters alert.
    pub fn post_session_stats(&self) {
        self.native.post_session_stats();
    }

    /// Detach the engine. The facade is consumed; dispose the proxy after the grace period.
    #[must_use]
    pub fn abort(self) -> SessionProxy {
        SessionProxy {
            inner: self.native.abort(),
        }
    }
}

/// Detached engine awaiting disposal.
pub struct SessionProxy {
    inner: Box<dyn NativeSessionProxy>,
}

impl SessionProxy {
    /// Wait `grace` for engine-internal work to drain, then release the engine.
    pub async fn dispose(self, grace: Duration) {
        if !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }
        let inner = self.inner;
        if let Err(err) = tokio::task::spawn_blocking(move || inner.shutdown()).await {
            warn!(error = %err, "native session shutdown did not complete");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::MemoryEngine;
    use std::net::Ipv4Addr;

    fn facade() -> (MemoryEngine, SessionFacade) {
        let engine = MemoryEngine::new();
        let facade = SessionFacade::new(Arc::new(engine.clone()));
        (engine, facade)
    }

    #[test]
    fn block_ip_preserves_existing_rules() {
        let (engine, facade) = facade();
        let low = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0));
        let high = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 255));
        let mut filter = IpFilter::new();
        filter.add_rule(low, high, IpAccess::Blocked);
        facade.set_ip_filter(filter);

        let single = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 9));
        facade.block_ip(single);

        let stored = engine.ip_filter();
        assert_eq!(stored.rules().len(), 2);
        assert_eq!(stored.access(single), IpAccess::Blocked);
        assert_eq!(
            stored.access(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 10))),
            IpAccess::Allowed
        );
    }

    #[test]
    fn port_mapping_add_remove_and_disable() {
        let (engine, mut facade) = facade();
        assert!(facade.is_port_mapping_enabled());

        assert!(facade.add_mapped_ports(&[6881, 6882]));
        assert!(!facade.add_mapped_ports(&[6881]));
        assert_eq!(engine.active_mappings().len(), 4);

        assert!(facade.remove_mapped_ports(&[6881, 9999]));
        assert_eq!(facade.mapped_ports(), vec![6882]);
        assert_eq!(engine.active_mappings().len(), 2);

        facade.set_port_mapping_enabled(false);
        assert!(facade.mapped_ports().is_empty());
        assert_eq!(engine.active_mappings().len(), 2);
        assert!(!facade.add_mapped_ports(&[7000]));
        assert_eq!(engine.settings().get_bool(SettingKey::EnableUpnp), Some(false));
    }

    #[test]
    fn zero_timeout_polls_without_blocking() {
        let (_engine, facade) = facade();
        let first = facade.get_pending_alerts(Duration::ZERO);
        assert!(first.iter().any(|alert| matches!(alert, Alert::ListenSucceeded { .. })));
        assert!(facade.get_pending_alerts(Duration::ZERO).is_empty());
        assert!(facade.get_pending_alerts(Duration::from_millis(5)).is_empty());
    }

    #[tokio::test]
    async fn abort_yields_disposable_proxy() {
        let (engine, facade) = facade();
        let proxy = facade.abort();
        assert!(!engine.is_listening());
        proxy.dispose(Duration::from_millis(1)).await;
        assert_eq!(engine.torrent_count(), 0);
    }
}
