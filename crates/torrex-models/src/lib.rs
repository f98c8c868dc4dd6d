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

//! Hierarchical state models reconciled from asynchronous torrent updates.
//!
//! Two models share one notification vocabulary:
//! - [`FileTreeModel`] folds a flat file list into folders and files with
//!   aggregated progress, priority and availability.
//! - [`TrackerListModel`] keeps one row per tracker URL, endpoint rows beneath
//!   them and three sticky rows for DHT, PeX and LSD.
//!
//! Both record what changed as [`ModelChange`] values that a view drains with
//! `take_changes()` after each update.

pub mod change;
pub mod file_tree;
pub mod tracker_list;

pub use change::{ChangeQueue, ModelChange};
pub use file_tree::{
    CheckState, FileColumn, FileTreeChange, FileTreeModel, FileValue, Node, NodeId, NodeKind,
};
pub use tracker_list::{
    ANNOUNCE_REFRESH_INTERVAL, PeerCountRequest, RowId, STICKY_ROW_COUNT, SessionFeatures,
    TrackerColumn, TrackerListChange, TrackerListModel, TrackerRow, announce_refresh_loop,
};
