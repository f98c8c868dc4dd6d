//! Error types for torrent core services.

use std::error::Error;

use thiserror::Error;
use uuid::Uuid;

use crate::model::InfoHash;

/// Primary error type for torrent operations.
#[derive(Debug, Error)]
pub enum TorrentError {
    /// Operation is not supported by the underlying engine.
    #[error("torrent operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Operation failed in the underlying engine.
    #[error("torrent operation failed")]
    OperationFailed {
        /// Operation identifier.
        operation: &'static str,
        /// Torrent identifier when available.
        torrent_id: Option<Uuid>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Torrent was not found.
    #[error("torrent not found")]
    NotFound {
        /// Missing torrent identifier.
        torrent_id: Uuid,
    },
    /// The engine rejected the re-add step of a reload; the torrent is no longer loaded.
    #[error("torrent reload failed")]
    ReloadFailed {
        /// Torrent whose reload failed.
        torrent_id: Uuid,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Reload parameters describe a different torrent than the handle.
    #[error("reload parameters do not match the torrent")]
    InfoHashMismatch {
        /// Torrent being reloaded.
        torrent_id: Uuid,
        /// Info hash of the loaded torrent.
        expected: InfoHash,
        /// Info hash carried by the reload parameters.
        actual: InfoHash,
    },
    /// An offloaded engine query did not run to completion.
    #[error("torrent query aborted")]
    FetchAborted {
        /// Query identifier.
        operation: &'static str,
        /// Torrent the query targeted.
        torrent_id: Uuid,
    },
}

impl TorrentError {
    /// Build an [`TorrentError::OperationFailed`] from any error source.
    pub fn operation_failed(
        operation: &'static str,
        torrent_id: Option<Uuid>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::OperationFailed {
            operation,
            torrent_id,
            source: source.into(),
        }
    }
}

/// Convenience alias for torrent operation results.
pub type TorrentResult<T> = Result<T, TorrentError>;

/// Failures raised while parsing a magnet URI.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MagnetError {
    /// The input was not a syntactically valid URI.
    #[error("invalid magnet uri")]
    InvalidUri {
        /// Parser detail.
        detail: String,
    },
    /// The URI scheme was not `magnet`.
    #[error("not a magnet uri")]
    NotMagnet {
        /// Scheme found in the input.
        scheme: String,
    },
    /// No `xt=urn:btih:` parameter was present.
    #[error("magnet uri has no info hash")]
    MissingInfoHash,
    /// The info hash parameter could not be decoded.
    #[error("invalid info hash")]
    InvalidInfoHash {
        /// Offending value.
        value: String,
    },
}

/// Failures raised while renaming a file or folder inside a torrent.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenameError {
    /// Path contained characters the filesystem cannot represent, or was empty.
    #[error("invalid path")]
    InvalidPath {
        /// Offending path.
        path: String,
    },
    /// Destination path was absolute.
    #[error("absolute path is not allowed")]
    AbsolutePath {
        /// Offending path.
        path: String,
    },
    /// A file already exists at the destination.
    #[error("file already exists")]
    FileExists {
        /// Conflicting path.
        path: String,
    },
    /// A folder already exists at the destination.
    #[error("folder already exists")]
    FolderExists {
        /// Conflicting path.
        path: String,
    },
    /// The source path matched neither a file nor a folder.
    #[error("no such file or folder")]
    NotFound {
        /// Path that was looked up.
        path: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn operation_failed_keeps_source() {
        let err = TorrentError::operation_failed(
            "torrent.connect_peer",
            Some(Uuid::nil()),
            io::Error::other("boom"),
        );
        assert_eq!(err.to_string(), "torrent operation failed");
        assert!(err.source().is_some());
    }

    #[test]
    fn rename_errors_use_constant_messages() {
        let err = RenameError::FolderExists {
            path: "a/b".to_string(),
        };
        assert_eq!(err.to_string(), "folder already exists");
    }
}
