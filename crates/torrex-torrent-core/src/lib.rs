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

//! Engine-agnostic torrent types, descriptor parsing, and collaborator traits.

pub mod error;
pub mod magnet;
pub mod model;
pub mod source;

pub use error::{MagnetError, RenameError, TorrentError, TorrentResult};
pub use magnet::parse_magnet;
pub use model::{
    AddTorrentParams, DescriptorKind, DownloadPriority, EndpointKey, ExtensionData, FileSpec,
    INFO_HASH_LEN, InfoHash, OperatingMode, PeerInfo, PieceIndex, ResumeDataFlags, SslParameters,
    TorrentDescriptor, TorrentFileInfo, TorrentFlags, TorrentMetadata, TorrentStatus,
    TrackerEndpointEntry, TrackerEntry, TrackerStatus, parse_tracker_entries,
};
pub use source::{ContentSource, FileStorage, TrackerSource};
