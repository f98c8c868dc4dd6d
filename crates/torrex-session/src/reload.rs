//! Replace a torrent's native object in place.
//!
//! # Design
//! - The queue position is captured before removal and reapplied after the re-add.
//! - The re-add runs under the handle's write lock, so readers observe either the
//!   old reference or the new one.
//! - Parameters for a different info hash are rejected before anything is removed.
//! - A rejected re-add is reported as [`TorrentError::ReloadFailed`]; the torrent
//!   is then absent from the session and the handle keeps its stale reference.

use torrex_events::{Event, EventBus};
use torrex_torrent_core::{
    AddTorrentParams, ExtensionData, OperatingMode, TorrentError, TorrentFlags, TorrentResult,
    TorrentStatus,
};
use tracing::{info, warn};

use crate::handle::{EngineHandle, ReloadState};
use crate::native::RemoveFlags;

/// Runs the remove + re-add protocol and reports the outcome on the event bus.
#[derive(Clone)]
pub struct ReloadCoordinator {
    events: EventBus,
}

impl ReloadCoordinator {
    /// Coordinator publishing to `events`.
    #[must_use]
    pub const fn new(events: EventBus) -> Self {
        Self { events }
    }

    /// Reload `handle` with `params`.
    ///
    /// # Errors
    ///
    /// Returns [`TorrentError::InfoHashMismatch`] when `params` names another
    /// torrent, and [`TorrentError::ReloadFailed`] when the engine rejects the re-add.
    pub fn reload(
        &self,
        handle: &EngineHandle,
        mut params: AddTorrentParams,
        is_stopped: bool,
        mode: OperatingMode,
    ) -> TorrentResult<TorrentStatus> {
        if params.info_hash != handle.info_hash() {
            warn!(
                torrent_id = %handle.id(),
                expected = %handle.info_hash(),
                actual = %params.info_hash,
                "reload rejected: info hash mismatch"
            );
            return Err(TorrentError::InfoHashMismatch {
                torrent_id: handle.id(),
                expected: handle.info_hash(),
                actual: params.info_hash,
            });
        }

        handle.set_reload_state(ReloadState::Reloading);

        let previous = handle.native_handle();
        let queue_position = previous.queue_position();
        handle
            .session()
            .remove_torrent(&previous, RemoveFlags::DELETE_PARTFILE);
        drop(previous);

        params.flags |= TorrentFlags::UPDATE_SUBSCRIBE
            | TorrentFlags::OVERRIDE_TRACKERS
            | TorrentFlags::OVERRIDE_WEB_SEEDS;
        apply_start_flags(&mut params.flags, is_stopped, mode);

        let extension = ExtensionData::new();
        params.userdata = Some(extension.clone());

        let outcome = handle.replace_native(|session| session.add_torrent(params));
        handle.set_reload_state(ReloadState::Stable);

        let native = match outcome {
            Ok(native) => native,
            Err(err) => {
                warn!(
                    torrent_id = %handle.id(),
                    operation = err.operation,
                    error = %err.message,
                    "torrent reload failed"
                );
                let _ = self.events.publish(Event::TorrentReloadFailed {
                    torrent_id: handle.id(),
                    message: err.message.clone(),
                });
                return Err(TorrentError::ReloadFailed {
                    torrent_id: handle.id(),
                    source: Box::new(err),
                });
            }
        };

        if let Some(position) = queue_position {
            native.queue_position_set(position);
        }

        let mut status = extension
            .initial_status()
            .unwrap_or_else(|| native.status());
        status.queue_position = queue_position;

        info!(
            torrent_id = %handle.id(),
            queue_position = ?queue_position,
            state = ?status.state,
            "torrent reloaded"
        );
        let _ = self.events.publish(Event::TorrentReloaded {
            torrent_id: handle.id(),
            status: status.snapshot(),
        });
        Ok(status)
    }
}

fn apply_start_flags(flags: &mut TorrentFlags, is_stopped: bool, mode: OperatingMode) {
    if is_stopped {
        flags.insert(TorrentFlags::PAUSED);
        flags.remove(TorrentFlags::AUTO_MANAGED);
    } else if mode == OperatingMode::AutoManaged {
        flags.insert(TorrentFlags::PAUSED | TorrentFlags::AUTO_MANAGED);
    } else {
        flags.remove(TorrentFlags::PAUSED);
        flags.remove(TorrentFlags::AUTO_MANAGED);
    }
}
