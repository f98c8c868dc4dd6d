//! # Design
//!
//! - Keep error messages constant; store operational context in fields.
//! - Native failures are wrapped, never stringified into the message.

use std::path::PathBuf;

use thiserror::Error;
use torrex_torrent_core::TorrentError;
use uuid::Uuid;

use crate::native::NativeError;

/// Errors surfaced by the session client and facade.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The background worker is gone.
    #[error("session command channel closed")]
    CommandChannelClosed {
        /// Command that could not be delivered.
        command: &'static str,
    },
    /// The worker dropped a query before answering it.
    #[error("session response dropped")]
    ResponseDropped {
        /// Query whose responder was dropped.
        query: &'static str,
    },
    /// A native engine call failed.
    #[error("native session operation failed")]
    Native {
        /// Underlying engine failure.
        #[from]
        source: NativeError,
    },
    /// A per-torrent operation failed.
    #[error("torrent operation failed")]
    Torrent {
        /// Underlying torrent failure.
        #[from]
        source: TorrentError,
    },
    /// A resume data file could not be read or written.
    #[error("resume store io failure")]
    ResumeStoreIo {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The torrent is not loaded in the session.
    #[error("torrent not loaded")]
    UnknownTorrent {
        /// Identifier that was looked up.
        torrent_id: Uuid,
    },
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn messages_are_constant_and_sources_chain() {
        let err = SessionError::from(NativeError::new("add_torrent", "duplicate"));
        assert_eq!(err.to_string(), "native session operation failed");
        assert!(err.source().is_some());

        let closed = SessionError::CommandChannelClosed { command: "pause" };
        assert_eq!(closed.to_string(), "session command channel closed");
        assert!(closed.source().is_none());
    }
}
