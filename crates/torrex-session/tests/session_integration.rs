use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tempfile::TempDir;
use torrex_events::{Event, EventBus, EventStream};
use torrex_session::native::{AnnounceOutcome, MemoryEngine, NativeSession};
use torrex_session::{
    AddTorrentOptions, ResumeDataStore, Session, SessionRuntimeConfig, Toggle, TorrentSession,
};
use torrex_telemetry::Metrics;
use torrex_test_support::events::wait_for_event;
use torrex_test_support::fixtures;
use torrex_torrent_core::{OperatingMode, ResumeDataFlags, TorrentError};
use uuid::Uuid;

async fn added_id(stream: &mut EventStream) -> Result<Uuid> {
    match wait_for_event(stream, |event| matches!(event, Event::TorrentAdded { .. })).await? {
        Event::TorrentAdded { torrent_id, .. } => Ok(torrent_id),
        other => Err(anyhow!("unexpected event {other:?}")),
    }
}

fn session(engine: &MemoryEngine, events: &EventBus) -> Result<Session> {
    Ok(Session::new(
        Arc::new(engine.clone()) as Arc<dyn NativeSession>,
        events.clone(),
        Metrics::new()?,
    ))
}

#[tokio::test]
async fn reload_keeps_queue_position_and_handle_identity() -> Result<()> {
    let engine = MemoryEngine::new();
    let events = EventBus::new();
    let mut stream = events.subscribe(None);
    let session = session(&engine, &events)?;

    let mut ids = Vec::new();
    for byte in 1..=3 {
        session
            .add_torrent(fixtures::descriptor_with_hash(byte), AddTorrentOptions::default())
            .await?;
        ids.push(added_id(&mut stream).await?);
    }

    let status = session
        .reload_torrent(
            ids[1],
            fixtures::descriptor_with_hash(2),
            false,
            OperatingMode::Forced,
        )
        .await?;
    assert_eq!(status.queue_position, Some(1));

    let reloaded = wait_for_event(&mut stream, |event| {
        matches!(event, Event::TorrentReloaded { .. })
    })
    .await?;
    assert_eq!(
        reloaded,
        Event::TorrentReloaded {
            torrent_id: ids[1],
            status: status.snapshot(),
        }
    );

    let mut expected = ids.clone();
    expected.sort_unstable();
    assert_eq!(session.torrents().await?, expected);
    let handle = session
        .handle(ids[1])
        .await?
        .ok_or_else(|| anyhow!("handle missing after reload"))?;
    assert!(handle.is_valid());
    assert_eq!(handle.native_handle().queue_position(), Some(1));

    session.shutdown(Duration::ZERO).await?;
    Ok(())
}

#[tokio::test]
async fn reload_failure_is_reported_and_torrent_is_dropped() -> Result<()> {
    let engine = MemoryEngine::new();
    let events = EventBus::new();
    let mut stream = events.subscribe(None);
    let session = session(&engine, &events)?;

    session
        .add_torrent(fixtures::descriptor_with_hash(7), AddTorrentOptions::default())
        .await?;
    let id = added_id(&mut stream).await?;

    engine.fail_next_add("rejected");
    let outcome = session
        .reload_torrent(
            id,
            fixtures::descriptor_with_hash(7),
            true,
            OperatingMode::AutoManaged,
        )
        .await;
    assert!(outcome.is_err());

    wait_for_event(&mut stream, |event| {
        matches!(event, Event::TorrentReloadFailed { torrent_id, .. } if *torrent_id == id)
    })
    .await?;
    wait_for_event(&mut stream, |event| {
        matches!(event, Event::TorrentRemoved { torrent_id } if *torrent_id == id)
    })
    .await?;
    assert!(session.torrents().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn reload_for_another_torrent_leaves_the_handle_removable() -> Result<()> {
    let engine = MemoryEngine::new();
    let events = EventBus::new();
    let mut stream = events.subscribe(None);
    let session = session(&engine, &events)?;

    session
        .add_torrent(fixtures::descriptor_with_hash(1), AddTorrentOptions::default())
        .await?;
    let id = added_id(&mut stream).await?;

    let outcome = session
        .reload_torrent(
            id,
            fixtures::descriptor_with_hash(2),
            false,
            OperatingMode::Forced,
        )
        .await;
    let err = outcome.err().ok_or_else(|| anyhow!("mismatched reload succeeded"))?;
    assert!(matches!(
        err.downcast_ref::<TorrentError>(),
        Some(TorrentError::InfoHashMismatch { torrent_id, .. }) if *torrent_id == id
    ));
    assert_eq!(engine.torrent_count(), 1);

    session.remove_torrent(id).await?;
    wait_for_event(&mut stream, |event| {
        matches!(event, Event::TorrentRemoved { torrent_id } if *torrent_id == id)
    })
    .await?;
    assert_eq!(engine.torrent_count(), 0);
    assert!(session.torrents().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn port_mapping_changes_are_published() -> Result<()> {
    let engine = MemoryEngine::new();
    let events = EventBus::new();
    let mut stream = events.subscribe(None);
    let session = session(&engine, &events)?;

    session.add_mapped_ports(vec![6881, 6882]).await?;
    let event = wait_for_event(&mut stream, |event| {
        matches!(event, Event::PortMappingChanged { .. })
    })
    .await?;
    assert_eq!(
        event,
        Event::PortMappingChanged {
            mapped_ports: vec![6881, 6882],
        }
    );
    assert_eq!(session.mapped_ports().await?, vec![6881, 6882]);

    session
        .apply_runtime_config(SessionRuntimeConfig {
            port_mapping: Toggle(false),
            ..SessionRuntimeConfig::default()
        })
        .await?;
    let event = wait_for_event(&mut stream, |event| {
        matches!(event, Event::PortMappingChanged { .. })
    })
    .await?;
    assert_eq!(
        event,
        Event::PortMappingChanged {
            mapped_ports: Vec::new(),
        }
    );
    assert!(session.mapped_ports().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn tracker_replies_surface_as_entry_updates() -> Result<()> {
    let engine = MemoryEngine::new();
    let events = EventBus::new();
    let mut stream = events.subscribe(None);
    let session = session(&engine, &events)?;

    let descriptor = fixtures::sample_descriptor();
    let url = descriptor.trackers[0].url.clone();
    session
        .add_torrent(descriptor.clone(), AddTorrentOptions::default())
        .await?;
    let id = added_id(&mut stream).await?;

    engine.announce(
        &descriptor.info_hash,
        &url,
        &AnnounceOutcome::Working {
            peers: 12,
            seeds: 4,
            leeches: 8,
            downloaded: 30,
            interval: Duration::from_secs(1_800),
        },
    );
    let event = wait_for_event(&mut stream, |event| {
        matches!(event, Event::TrackerEntriesUpdated { .. })
    })
    .await?;
    assert_eq!(
        event,
        Event::TrackerEntriesUpdated {
            torrent_id: id,
            urls: vec![url],
        }
    );
    Ok(())
}

#[tokio::test]
async fn resume_store_round_trips_across_sessions() -> Result<()> {
    let downloads = TempDir::new()?;
    let resume = TempDir::new()?;
    let store = ResumeDataStore::new(resume.path());
    let descriptor = fixtures::sample_descriptor();
    let options = AddTorrentOptions {
        save_path: Some(downloads.path().to_path_buf()),
        ..AddTorrentOptions::default()
    };

    {
        let engine = MemoryEngine::new();
        let events = EventBus::new();
        let mut stream = events.subscribe(None);
        let session = Session::with_resume_store(
            Arc::new(engine.clone()) as Arc<dyn NativeSession>,
            events.clone(),
            Metrics::new()?,
            store.clone(),
        );
        session.add_torrent(descriptor.clone(), options).await?;
        let id = added_id(&mut stream).await?;
        session
            .request_resume_data(id, ResumeDataFlags::default())
            .await?;
        session.shutdown(Duration::ZERO).await?;
    }

    let stored = store.load_all()?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].info_hash, descriptor.info_hash);

    let engine = MemoryEngine::new();
    let events = EventBus::new();
    let mut stream = events.subscribe(None);
    let session = Session::with_resume_store(
        Arc::new(engine.clone()) as Arc<dyn NativeSession>,
        events.clone(),
        Metrics::new()?,
        store.clone(),
    );
    let event = wait_for_event(&mut stream, |event| {
        matches!(event, Event::TorrentAdded { .. })
    })
    .await?;
    let Event::TorrentAdded { torrent_id, info_hash, .. } = event else {
        return Err(anyhow!("expected torrent added"));
    };
    assert_eq!(info_hash, descriptor.info_hash.to_hex());

    session.remove_torrent(torrent_id).await?;
    wait_for_event(&mut stream, |event| {
        matches!(event, Event::TorrentRemoved { .. })
    })
    .await?;
    assert!(store.load_all()?.is_empty());
    assert_eq!(engine.torrent_count(), 0);
    Ok(())
}

#[tokio::test]
async fn commands_fail_once_the_worker_stopped() -> Result<()> {
    let engine = MemoryEngine::new();
    let events = EventBus::new();
    let session = session(&engine, &events)?;
    session.shutdown(Duration::from_millis(1)).await?;
    assert!(session.pause_session().await.is_err());
    assert!(!engine.is_listening());
    Ok(())
}
