use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use torrex_events::{EventBus, EventStream};
use torrex_session::Session;
use torrex_session::native::{MemoryEngine, NativeSession};
use torrex_telemetry::{LoggingConfig, Metrics};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::session_config::SessionPlan;

/// Time the engine is given to finish outstanding work after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Dependencies required to run the session daemon.
pub(crate) struct BootstrapDependencies {
    plan: SessionPlan,
    events: EventBus,
    metrics: Metrics,
    native: Arc<dyn NativeSession>,
}

impl BootstrapDependencies {
    /// Construct production dependencies from the environment for the binary entrypoint.
    pub(crate) fn from_env() -> AppResult<Self> {
        let profile =
            torrex_config::load_profile().map_err(|err| AppError::config("config.load", err))?;
        Self::from_plan(SessionPlan::from_profile(&profile))
    }

    pub(crate) fn from_plan(plan: SessionPlan) -> AppResult<Self> {
        let metrics =
            Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let native: Arc<dyn NativeSession> =
            Arc::new(MemoryEngine::with_settings(plan.runtime.to_settings_pack()));
        Ok(Self {
            plan,
            events: EventBus::new(),
            metrics,
            native,
        })
    }
}

/// Entry point for the session daemon boot sequence.
///
/// # Errors
///
/// Returns an error if configuration loading, logging setup or the session
/// lifecycle fails.
pub async fn run_app() -> AppResult<()> {
    let dependencies = BootstrapDependencies::from_env()?;

    let logging = LoggingConfig {
        level: &dependencies.plan.effective.log_level,
        format: dependencies.plan.log_format(),
        build_sha: torrex_telemetry::build_sha(),
    };
    torrex_telemetry::init_logging(&logging)
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;
    info!("torrex session daemon starting");

    run_session(dependencies, async {
        tokio::signal::ctrl_c()
            .await
            .map_err(|source| AppError::Io {
                operation: "signal.ctrl_c",
                source,
            })
    })
    .await
}

/// Run the session until `shutdown` resolves, then persist and release it.
pub(crate) async fn run_session<F>(dependencies: BootstrapDependencies, shutdown: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let BootstrapDependencies {
        plan,
        events,
        metrics,
        native,
    } = dependencies;

    for warning in &plan.effective.warnings {
        warn!(warning = %warning, "configuration guard rail applied");
    }

    let logger = tokio::spawn(log_events(events.subscribe(None)));
    let session =
        Session::with_resume_store(native, events, metrics.clone(), plan.resume_store());
    session
        .apply_runtime_config(plan.runtime.clone())
        .await
        .map_err(|err| AppError::session("session.apply_config", err))?;
    if let Some(ports) = plan.mapped_ports() {
        session
            .add_mapped_ports(ports)
            .await
            .map_err(|err| AppError::session("session.add_mapped_ports", err))?;
    }
    info!(
        listen_port = plan.runtime.listen_port,
        resume_dir = %plan.effective.storage.resume_dir,
        "session ready"
    );

    let signal = shutdown.await;
    info!("shutting down session");
    let closed = session
        .shutdown(SHUTDOWN_GRACE)
        .await
        .map_err(|err| AppError::session("session.shutdown", err));

    logger.abort();
    if let Err(err) = logger.await
        && !err.is_cancelled()
    {
        warn!(error = %err, "event logger join failed");
    }

    let snapshot = metrics.snapshot();
    info!(
        alerts_drained = snapshot.alerts_drained_total,
        active_torrents = snapshot.active_torrents,
        mapped_ports = snapshot.mapped_ports,
        "session shutdown complete"
    );
    signal?;
    closed
}

async fn log_events(mut stream: EventStream) {
    while let Some(envelope) = stream.next().await {
        match envelope.event.torrent_id() {
            Some(torrent_id) => info!(
                event_id = envelope.id,
                kind = envelope.event.kind(),
                torrent_id = %torrent_id,
                "session event"
            ),
            None => debug!(
                event_id = envelope.id,
                kind = envelope.event.kind(),
                "session event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrex_config::SessionProfile;

    fn plan_in(dir: &std::path::Path, mapped_ports: Vec<i32>) -> SessionPlan {
        SessionPlan::from_profile(&SessionProfile {
            listen_port: None,
            mapped_ports,
            resume_dir: dir.join("resume").to_string_lossy().into_owned(),
            ..SessionProfile::default()
        })
    }

    #[tokio::test]
    async fn session_runs_until_shutdown_resolves() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let mut dependencies = BootstrapDependencies::from_plan(plan_in(dir.path(), vec![7_000]))?;
        dependencies.native = Arc::new(engine.clone());

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let run = tokio::spawn(run_session(dependencies, async move {
            let _ = stop_rx.await;
            Ok(())
        }));

        tokio::time::timeout(Duration::from_secs(2), async {
            while !engine
                .active_mappings()
                .iter()
                .any(|(_, port)| *port == 7_000)
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await?;
        assert!(dir.path().join("resume").is_dir());

        let _ = stop_tx.send(());
        tokio::time::timeout(Duration::from_secs(10), run).await???;
        Ok(())
    }

    #[tokio::test]
    async fn failed_shutdown_signal_is_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dependencies = BootstrapDependencies::from_plan(plan_in(dir.path(), Vec::new()))?;
        let result = run_session(dependencies, async {
            Err(AppError::Io {
                operation: "signal.ctrl_c",
                source: std::io::Error::other("no signal handler"),
            })
        })
        .await;
        assert!(matches!(
            result,
            Err(AppError::Io {
                operation: "signal.ctrl_c",
                ..
            })
        ));
        Ok(())
    }
}
