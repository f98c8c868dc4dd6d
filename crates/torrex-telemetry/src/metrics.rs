//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters and gauges the session worker maintains.

use std::sync::Arc;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Outcome label recorded for a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The torrent was re-added.
    Succeeded,
    /// The re-add was rejected.
    Failed,
}

impl ReloadOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    alerts_drained_total: IntCounter,
    events_emitted_total: IntCounterVec,
    reloads_total: IntCounterVec,
    mapped_ports: IntGauge,
    active_torrents: IntGauge,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Total engine alerts drained.
    pub alerts_drained_total: u64,
    /// Ports currently mapped.
    pub mapped_ports: i64,
    /// Torrents currently loaded.
    pub active_torrents: i64,
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

impl Metrics {
    /// Construct a registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let alerts_drained_total = IntCounter::with_opts(Opts::new(
            "alerts_drained_total",
            "Engine alerts drained by the session worker",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "alerts_drained_total",
            source,
        })?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Domain events emitted by type"),
            &["type"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "events_emitted_total",
            source,
        })?;
        let reloads_total = IntCounterVec::new(
            Opts::new("torrent_reloads_total", "Torrent reloads by outcome"),
            &["outcome"],
        )
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "torrent_reloads_total",
            source,
        })?;
        let mapped_ports = IntGauge::with_opts(Opts::new("mapped_ports", "Ports mapped on the gateway"))
            .map_err(|source| TelemetryError::MetricsCollector {
                name: "mapped_ports",
                source,
            })?;
        let active_torrents =
            IntGauge::with_opts(Opts::new("active_torrents", "Number of loaded torrents"))
                .map_err(|source| TelemetryError::MetricsCollector {
                    name: "active_torrents",
                    source,
                })?;

        register(&registry, "alerts_drained_total", &alerts_drained_total)?;
        register(&registry, "events_emitted_total", &events_emitted_total)?;
        register(&registry, "torrent_reloads_total", &reloads_total)?;
        register(&registry, "mapped_ports", &mapped_ports)?;
        register(&registry, "active_torrents", &active_torrents)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                alerts_drained_total,
                events_emitted_total,
                reloads_total,
                mapped_ports,
                active_torrents,
            }),
        })
    }

    /// Add `count` drained alerts.
    pub fn add_alerts_drained(&self, count: usize) {
        self.inner
            .alerts_drained_total
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Record a reload outcome.
    pub fn inc_reload(&self, outcome: ReloadOutcome) {
        self.inner
            .reloads_total
            .with_label_values(&[outcome.label()])
            .inc();
    }

    /// Set the mapped port gauge.
    pub fn set_mapped_ports(&self, count: usize) {
        self.inner
            .mapped_ports
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Set the active torrent gauge.
    pub fn set_active_torrents(&self, count: usize) {
        self.inner
            .active_torrents
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            alerts_drained_total: self.inner.alerts_drained_total.get(),
            mapped_ports: self.inner.mapped_ports.get(),
            active_torrents: self.inner.active_torrents.get(),
        }
    }
}
