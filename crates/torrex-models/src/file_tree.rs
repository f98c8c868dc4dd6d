//! Folder and file tree built from a torrent's flat file list.
//!
//! # Design
//! - Nodes live in an arena indexed by [`NodeId`]; folders own their children
//!   by id and every node keeps its parent id for upward walks.
//! - Folder values are derived: size is the sum of children, progress and
//!   availability are size weighted over non-ignored children, and priority is
//!   the common child priority or `Mixed`.
//! - Every update re-aggregates first and then queues data changes for the
//!   touched node, its ancestors and its whole subtree.

use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use torrex_torrent_core::{ContentSource, DownloadPriority};
use tracing::{debug, warn};

use crate::change::{ChangeQueue, ModelChange};

/// Notification type emitted by [`FileTreeModel`].
pub type FileTreeChange = ModelChange<NodeId, FileColumn>;

/// Arena index of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

const ROOT: NodeId = NodeId(0);

/// Columns exposed by the file tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FileColumn {
    /// Item name and check state.
    Name,
    /// Total size in bytes.
    Size,
    /// Downloaded fraction.
    Progress,
    /// Download priority.
    Priority,
    /// Bytes left to download.
    Remaining,
    /// Fraction available from connected peers.
    Availability,
}

/// Whether a node is a folder or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Folder synthesised from a path prefix.
    Folder,
    /// File at `index` in the torrent's file list.
    File {
        /// Position in the source file list.
        index: usize,
    },
}

/// Tri-state selection shown next to an item name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    /// Excluded from download.
    Unchecked,
    /// Folder with both selected and excluded descendants.
    PartiallyChecked,
    /// Selected for download.
    Checked,
}

impl CheckState {
    const fn priority(self) -> DownloadPriority {
        match self {
            Self::Unchecked => DownloadPriority::Ignored,
            Self::PartiallyChecked => DownloadPriority::Mixed,
            Self::Checked => DownloadPriority::Normal,
        }
    }

    const fn of(priority: DownloadPriority) -> Self {
        match priority {
            DownloadPriority::Ignored => Self::Unchecked,
            DownloadPriority::Mixed => Self::PartiallyChecked,
            DownloadPriority::Normal | DownloadPriority::High | DownloadPriority::Maximum => {
                Self::Checked
            }
        }
    }
}

/// Typed cell value returned by [`FileTreeModel::data`].
#[derive(Debug, Clone, PartialEq)]
pub enum FileValue {
    /// Text cell.
    Text(String),
    /// Byte count.
    Bytes(u64),
    /// Fraction between 0 and 1.
    Ratio(f64),
    /// Priority cell.
    Priority(DownloadPriority),
    /// No data yet.
    Unknown,
}

/// One folder or file.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    row: usize,
    children: Vec<NodeId>,
    size: u64,
    progress: f64,
    remaining: u64,
    priority: DownloadPriority,
    availability: f64,
}

impl Node {
    const fn folder(name: String) -> Self {
        Self {
            name,
            kind: NodeKind::Folder,
            parent: None,
            row: 0,
            children: Vec::new(),
            size: 0,
            progress: 0.0,
            remaining: 0,
            priority: DownloadPriority::Normal,
            availability: -1.0,
        }
    }

    const fn file(name: String, index: usize, size: u64) -> Self {
        Self {
            name,
            kind: NodeKind::File { index },
            parent: None,
            row: 0,
            children: Vec::new(),
            size,
            progress: 0.0,
            remaining: size,
            priority: DownloadPriority::Normal,
            availability: -1.0,
        }
    }

    /// Display name (last path component).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Folder or file.
    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Whether this node is a folder.
    #[must_use]
    pub const fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }

    /// Position in the torrent's file list, for files.
    #[must_use]
    pub const fn file_index(&self) -> Option<usize> {
        match self.kind {
            NodeKind::File { index } => Some(index),
            NodeKind::Folder => None,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Downloaded fraction; empty items count as complete.
    #[must_use]
    pub const fn progress(&self) -> f64 {
        if self.size > 0 { self.progress } else { 1.0 }
    }

    /// Bytes left to download; ignored items have nothing left.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        if self.priority.is_ignored() {
            0
        } else {
            self.remaining
        }
    }

    /// Download priority.
    #[must_use]
    pub const fn priority(&self) -> DownloadPriority {
        self.priority
    }

    /// Available fraction, `-1` when unknown and `0` for empty items.
    #[must_use]
    pub const fn availability(&self) -> f64 {
        if self.size > 0 { self.availability } else { 0.0 }
    }

    /// Check state derived from the priority.
    #[must_use]
    pub const fn check_state(&self) -> CheckState {
        CheckState::of(self.priority)
    }
}

/// Two-level folder/file model over a [`ContentSource`].
pub struct FileTreeModel {
    source: Option<Arc<dyn ContentSource>>,
    nodes: Vec<Node>,
    files: Vec<NodeId>,
    changes: ChangeQueue<NodeId, FileColumn>,
}

impl Default for FileTreeModel {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTreeModel {
    /// Empty model without a source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            nodes: vec![Node::folder(String::new())],
            files: Vec::new(),
            changes: ChangeQueue::default(),
        }
    }

    /// Replace the content source, discarding all derived state.
    ///
    /// The tree is rebuilt right away when the new source already has
    /// metadata; otherwise it stays empty until [`Self::populate`].
    pub fn set_content_source(&mut self, source: Option<Arc<dyn ContentSource>>) {
        self.changes.push(ModelChange::ResetBegin);
        self.clear();
        self.source = source;
        if self
            .source
            .as_ref()
            .is_some_and(|source| source.has_metadata())
        {
            self.build();
        }
        self.changes.push(ModelChange::ResetEnd);
    }

    /// Current content source.
    #[must_use]
    pub const fn content_source(&self) -> Option<&Arc<dyn ContentSource>> {
        self.source.as_ref()
    }

    /// Rebuild the tree once the source received metadata.
    pub fn populate(&mut self) {
        let Some(source) = self.source.clone() else {
            warn!("file tree populate requested without a content source");
            return;
        };
        if !source.has_metadata() {
            debug!("file tree populate skipped: metadata not available");
            return;
        }
        self.changes.push(ModelChange::ResetBegin);
        self.clear();
        self.build();
        self.changes.push(ModelChange::ResetEnd);
    }

    /// Re-read priorities, progress and availability from the source.
    pub fn refresh(&mut self) {
        let Some(source) = self.source.clone() else {
            return;
        };
        if !source.has_metadata() {
            return;
        }
        self.update_files_priorities(&source.file_priorities());
        self.update_files_progress(&source.files_progress());
        self.update_files_availability(&source.available_file_fractions());
    }

    /// Apply per-file progress in file order.
    pub fn update_files_progress(&mut self, progress: &[f64]) {
        if self.apply_progress(progress) {
            self.notify_subtree_updated(
                ROOT,
                &[
                    FileColumn::Progress..=FileColumn::Progress,
                    FileColumn::Remaining..=FileColumn::Remaining,
                ],
            );
        }
    }

    /// Apply per-file priorities in file order.
    pub fn update_files_priorities(&mut self, priorities: &[DownloadPriority]) {
        if self.apply_priorities(priorities) {
            self.notify_subtree_updated(
                ROOT,
                &[
                    FileColumn::Name..=FileColumn::Name,
                    FileColumn::Priority..=FileColumn::Priority,
                ],
            );
        }
    }

    /// Apply per-file availability in file order.
    pub fn update_files_availability(&mut self, availability: &[f64]) {
        if self.apply_availability(availability) {
            self.notify_subtree_updated(
                ROOT,
                &[FileColumn::Availability..=FileColumn::Availability],
            );
        }
    }

    /// Set the priority of a file or folder.
    ///
    /// A folder pushes any priority other than `Mixed` down to every
    /// descendant. Returns `false` when nothing changed.
    pub fn set_priority(&mut self, id: NodeId, priority: DownloadPriority) -> bool {
        let Some(previous) = self.write_priority(id, priority) else {
            return false;
        };
        if previous.is_ignored() || priority.is_ignored() {
            self.changes.push(ModelChange::FilteredFilesChanged);
        }
        true
    }

    /// Set the check state of a file or folder.
    ///
    /// Returns `false` when nothing changed.
    pub fn set_check_state(&mut self, id: NodeId, state: CheckState) -> bool {
        if self.write_priority(id, state.priority()).is_none() {
            return false;
        }
        self.changes.push(ModelChange::FilteredFilesChanged);
        true
    }

    /// Rename a node in the view. Returns `false` when nothing changed.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> bool {
        if id == ROOT {
            return false;
        }
        let name = name.into();
        let Some(node) = self.nodes.get_mut(id.0) else {
            return false;
        };
        if node.name == name {
            return false;
        }
        node.name = name;
        let (parent, row) = (node.parent.unwrap_or(ROOT), node.row);
        self.changes.push(ModelChange::DataChanged {
            parent: view_id(parent),
            rows: row..=row,
            columns: FileColumn::Name..=FileColumn::Name,
        });
        true
    }

    /// Invisible root folder.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        ROOT
    }

    /// Children of a folder, in insertion order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id.0)
            .map_or(&[], |node| node.children.as_slice())
    }

    /// Parent of a node; `None` for the root.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|node| node.parent)
    }

    /// Node data.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Check state of a node.
    #[must_use]
    pub fn check_state(&self, id: NodeId) -> Option<CheckState> {
        self.node(id).map(Node::check_state)
    }

    /// Cell value of a visible node.
    #[must_use]
    pub fn data(&self, id: NodeId, column: FileColumn) -> Option<FileValue> {
        if id == ROOT {
            return None;
        }
        let node = self.node(id)?;
        let value = match column {
            FileColumn::Name => FileValue::Text(node.name.clone()),
            FileColumn::Size => FileValue::Bytes(node.size),
            FileColumn::Progress => FileValue::Ratio(node.progress()),
            FileColumn::Priority => FileValue::Priority(node.priority),
            FileColumn::Remaining => FileValue::Bytes(node.remaining()),
            FileColumn::Availability => {
                let availability = node.availability();
                if availability >= 0.0 {
                    FileValue::Ratio(availability)
                } else {
                    FileValue::Unknown
                }
            }
        };
        Some(value)
    }

    /// Number of files in the tree.
    #[must_use]
    pub const fn files_count(&self) -> usize {
        self.files.len()
    }

    /// Leaf node of a file index.
    #[must_use]
    pub fn file_node(&self, index: usize) -> Option<NodeId> {
        self.files.get(index).copied()
    }

    /// Priority of every file, in file order.
    #[must_use]
    pub fn file_priorities(&self) -> Vec<DownloadPriority> {
        self.files
            .iter()
            .map(|id| self.nodes[id.0].priority)
            .collect()
    }

    /// Whether every file is excluded from download.
    #[must_use]
    pub fn all_filtered(&self) -> bool {
        self.files
            .iter()
            .all(|id| self.nodes[id.0].priority.is_ignored())
    }

    /// Row of each ancestor from the top level down to `id`.
    #[must_use]
    pub fn row_path(&self, id: NodeId) -> Vec<usize> {
        let mut rows = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ROOT {
                break;
            }
            let Some(node) = self.nodes.get(node_id.0) else {
                return Vec::new();
            };
            rows.push(node.row);
            current = node.parent;
        }
        rows.reverse();
        rows
    }

    /// `/` separated path of a node relative to the torrent root.
    #[must_use]
    pub fn path(&self, id: NodeId) -> Option<String> {
        if id == ROOT {
            return None;
        }
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ROOT {
                break;
            }
            let node = self.nodes.get(node_id.0)?;
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Drain queued notifications.
    pub fn take_changes(&mut self) -> Vec<FileTreeChange> {
        self.changes.take()
    }

    fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[ROOT.0] = Node::folder(String::new());
        self.files.clear();
    }

    fn build(&mut self) {
        let Some(source) = self.source.clone() else {
            return;
        };
        let count = source.files_count();
        let mut folders: HashMap<String, NodeId> = HashMap::new();
        self.files.reserve(count);
        for index in 0..count {
            let path = source.file_path(index);
            let mut parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
            let file_name = parts.pop().unwrap_or_default().to_string();
            let parent = self.folder_for(&parts, &mut folders);
            let leaf = self.append(parent, Node::file(file_name, index, source.file_size(index)));
            self.files.push(leaf);
        }
        debug!(files = count, folders = folders.len(), "file tree populated");

        self.apply_priorities(&source.file_priorities());
        self.apply_progress(&source.files_progress());
        self.apply_availability(&source.available_file_fractions());
    }

    fn folder_for(&mut self, parts: &[&str], folders: &mut HashMap<String, NodeId>) -> NodeId {
        let mut current = ROOT;
        let mut prefix = String::new();
        for part in parts {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            current = if let Some(existing) = folders.get(&prefix) {
                *existing
            } else {
                let created = self.append(current, Node::folder((*part).to_string()));
                folders.insert(prefix.clone(), created);
                created
            };
        }
        current
    }

    fn append(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        let size = node.size;
        node.parent = Some(parent);
        node.row = self.nodes[parent.0].children.len();
        self.nodes.push(node);
        self.nodes[parent.0].children.push(id);

        let mut ancestor = Some(parent);
        while let Some(folder) = ancestor {
            let folder = &mut self.nodes[folder.0];
            folder.size += size;
            folder.remaining += size;
            ancestor = folder.parent;
        }
        id
    }

    fn matches_file_count(&self, update: &'static str, received: usize) -> bool {
        if received == self.files.len() {
            return true;
        }
        warn!(
            update,
            expected = self.files.len(),
            received,
            "ignoring file update with mismatched length"
        );
        false
    }

    fn apply_progress(&mut self, progress: &[f64]) -> bool {
        if !self.matches_file_count("progress", progress.len()) {
            return false;
        }
        for (id, value) in self.files.iter().zip(progress) {
            let node = &mut self.nodes[id.0];
            node.progress = value.clamp(0.0, 1.0);
            node.remaining = remaining_bytes(node.size, node.progress);
        }
        self.recalculate_progress(ROOT);
        self.recalculate_availability(ROOT);
        true
    }

    fn apply_priorities(&mut self, priorities: &[DownloadPriority]) -> bool {
        if !self.matches_file_count("priorities", priorities.len()) {
            return false;
        }
        for (id, priority) in self.files.iter().zip(priorities) {
            if priority.is_valid_for_file() {
                self.nodes[id.0].priority = *priority;
            }
        }
        self.recalculate_priority(ROOT);
        self.recalculate_progress(ROOT);
        self.recalculate_availability(ROOT);
        true
    }

    fn apply_availability(&mut self, availability: &[f64]) -> bool {
        if !self.matches_file_count("availability", availability.len()) {
            return false;
        }
        for (id, value) in self.files.iter().zip(availability) {
            self.nodes[id.0].availability = *value;
        }
        self.recalculate_availability(ROOT);
        true
    }

    /// Returns the previous priority when the write changed anything.
    fn write_priority(&mut self, id: NodeId, priority: DownloadPriority) -> Option<DownloadPriority> {
        if id == ROOT {
            return None;
        }
        let node = self.nodes.get(id.0)?;
        if !node.is_folder() && !priority.is_valid_for_file() {
            return None;
        }
        let previous = node.priority;
        if previous == priority {
            return None;
        }

        self.assign_priority(id, priority);
        self.refresh_ancestor_priorities(id);
        self.recalculate_progress(ROOT);
        self.recalculate_availability(ROOT);
        self.notify_subtree_updated(
            id,
            &[
                FileColumn::Name..=FileColumn::Name,
                FileColumn::Priority..=FileColumn::Priority,
            ],
        );
        Some(previous)
    }

    fn assign_priority(&mut self, id: NodeId, priority: DownloadPriority) {
        self.nodes[id.0].priority = priority;
        if priority == DownloadPriority::Mixed {
            return;
        }
        let children = self.nodes[id.0].children.clone();
        for child in children {
            self.assign_priority(child, priority);
        }
    }

    fn aggregate_priority(&self, children: &[NodeId]) -> Option<DownloadPriority> {
        let mut priorities = children.iter().map(|child| self.nodes[child.0].priority);
        let first = priorities.next()?;
        if priorities.all(|priority| priority == first) {
            Some(first)
        } else {
            Some(DownloadPriority::Mixed)
        }
    }

    fn recalculate_priority(&mut self, id: NodeId) {
        let children = self.nodes[id.0].children.clone();
        for child in &children {
            if self.nodes[child.0].is_folder() {
                self.recalculate_priority(*child);
            }
        }
        if let Some(priority) = self.aggregate_priority(&children) {
            self.nodes[id.0].priority = priority;
        }
    }

    fn refresh_ancestor_priorities(&mut self, id: NodeId) {
        let mut ancestor = self.nodes[id.0].parent;
        while let Some(folder) = ancestor {
            if let Some(priority) = self.aggregate_priority(&self.nodes[folder.0].children) {
                self.nodes[folder.0].priority = priority;
            }
            ancestor = self.nodes[folder.0].parent;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn recalculate_progress(&mut self, id: NodeId) {
        let children = self.nodes[id.0].children.clone();
        let mut weighted = 0.0_f64;
        let mut size = 0_u64;
        let mut remaining = 0_u64;
        for child in children {
            if self.nodes[child.0].priority.is_ignored() {
                continue;
            }
            if self.nodes[child.0].is_folder() {
                self.recalculate_progress(child);
            }
            let node = &self.nodes[child.0];
            weighted = node.progress().mul_add(node.size as f64, weighted);
            size += node.size;
            remaining += node.remaining();
        }
        if size > 0 {
            let folder = &mut self.nodes[id.0];
            folder.progress = weighted / size as f64;
            folder.remaining = remaining;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn recalculate_availability(&mut self, id: NodeId) {
        let children = self.nodes[id.0].children.clone();
        let mut weighted = 0.0_f64;
        let mut size = 0_u64;
        let mut found_any = false;
        for child in children {
            if self.nodes[child.0].priority.is_ignored() {
                continue;
            }
            if self.nodes[child.0].is_folder() {
                self.recalculate_availability(child);
            }
            let node = &self.nodes[child.0];
            let availability = node.availability();
            if availability >= 0.0 {
                weighted = availability.mul_add(node.size as f64, weighted);
                found_any = true;
            }
            size += node.size;
        }
        self.nodes[id.0].availability = if size > 0 && found_any {
            weighted / size as f64
        } else {
            -1.0
        };
    }

    fn notify_subtree_updated(&mut self, id: NodeId, columns: &[RangeInclusive<FileColumn>]) {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ROOT {
                break;
            }
            let node = &self.nodes[node_id.0];
            let parent = view_id(node.parent.unwrap_or(ROOT));
            for range in columns {
                self.changes.push(ModelChange::DataChanged {
                    parent,
                    rows: node.row..=node.row,
                    columns: range.clone(),
                });
            }
            current = node.parent;
        }

        let mut pending = Vec::new();
        if !self.nodes[id.0].children.is_empty() {
            pending.push(id);
        }
        while let Some(folder) = pending.pop() {
            let children = &self.nodes[folder.0].children;
            let last = children.len() - 1;
            for range in columns {
                self.changes.push(ModelChange::DataChanged {
                    parent: view_id(folder),
                    rows: 0..=last,
                    columns: range.clone(),
                });
            }
            pending.extend(
                children
                    .iter()
                    .copied()
                    .filter(|child| !self.nodes[child.0].children.is_empty()),
            );
        }
    }
}

fn view_id(id: NodeId) -> Option<NodeId> {
    (id != ROOT).then_some(id)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn remaining_bytes(size: u64, progress: f64) -> u64 {
    ((size as f64) * (1.0 - progress)).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrex_test_support::fixtures;
    use torrex_test_support::sources::StaticContentSource;
    use torrex_torrent_core::{FileSpec, TorrentMetadata};

    fn metadata(files: &[(&str, u64)]) -> TorrentMetadata {
        TorrentMetadata {
            name: "root".to_string(),
            piece_length: 16,
            files: files
                .iter()
                .map(|(path, size)| FileSpec {
                    path: (*path).to_string(),
                    size: *size,
                })
                .collect(),
            info_bytes: Vec::new(),
            private: false,
        }
    }

    fn model_for(metadata: TorrentMetadata) -> FileTreeModel {
        let mut model = FileTreeModel::new();
        model.set_content_source(Some(Arc::new(StaticContentSource::new(metadata))));
        model.take_changes();
        model
    }

    fn close(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn populate_creates_each_folder_once() -> anyhow::Result<()> {
        let model = model_for(fixtures::sample_metadata());

        let top = model.children(model.root());
        assert_eq!(top.len(), 1);
        let album = top[0];
        let album_node = model.node(album).ok_or_else(|| anyhow::anyhow!("album"))?;
        assert_eq!(album_node.name(), "album");
        assert!(album_node.is_folder());
        assert_eq!(album_node.size(), 40);

        let names: Vec<&str> = model
            .children(album)
            .iter()
            .filter_map(|id| model.node(*id).map(Node::name))
            .collect();
        assert_eq!(names, vec!["a.flac", "b.flac", "cover"]);

        let cover = model.file_node(2).ok_or_else(|| anyhow::anyhow!("cover file"))?;
        assert_eq!(model.path(cover).as_deref(), Some("album/cover/front.jpg"));
        assert_eq!(model.row_path(cover), vec![0, 2, 0]);
        assert_eq!(model.files_count(), 3);
        Ok(())
    }

    #[test]
    fn source_without_metadata_resets_to_empty() {
        let mut model = model_for(fixtures::sample_metadata());
        model.set_content_source(Some(Arc::new(StaticContentSource::without_metadata())));
        assert!(model.children(model.root()).is_empty());
        assert_eq!(
            model.take_changes(),
            vec![ModelChange::ResetBegin, ModelChange::ResetEnd]
        );

        model.populate();
        assert!(model.take_changes().is_empty());
    }

    #[test]
    fn populate_again_does_not_duplicate_nodes() {
        let mut model = model_for(fixtures::sample_metadata());
        model.populate();
        assert_eq!(model.children(model.root()).len(), 1);
        assert_eq!(model.files_count(), 3);
    }

    #[test]
    fn folder_progress_is_weighted_by_size() -> anyhow::Result<()> {
        let mut model = model_for(metadata(&[("dir/f1", 10), ("dir/f2", 30)]));
        model.update_files_progress(&[1.0, 0.0]);

        let dir = model.children(model.root())[0];
        let node = model.node(dir).ok_or_else(|| anyhow::anyhow!("dir"))?;
        assert!(close(node.progress(), 0.25));
        assert_eq!(node.remaining(), 30);
        Ok(())
    }

    #[test]
    fn mismatched_update_leaves_model_untouched() {
        let mut model = model_for(fixtures::sample_metadata());
        let before = model.nodes.clone();

        model.update_files_progress(&[0.5]);
        model.update_files_priorities(&[DownloadPriority::High; 4]);
        model.update_files_availability(&[]);

        assert_eq!(model.nodes, before);
        assert!(model.take_changes().is_empty());
    }

    #[test]
    fn folder_priority_follows_children() {
        let mut model = model_for(metadata(&[("dir/a", 1), ("dir/b", 1)]));
        let dir = model.children(model.root())[0];
        let priority = |model: &FileTreeModel| model.node(dir).map(Node::priority);

        model.update_files_priorities(&[DownloadPriority::Ignored, DownloadPriority::Ignored]);
        assert_eq!(priority(&model), Some(DownloadPriority::Ignored));

        model.update_files_priorities(&[DownloadPriority::Ignored, DownloadPriority::Normal]);
        assert_eq!(priority(&model), Some(DownloadPriority::Mixed));

        model.update_files_priorities(&[DownloadPriority::High, DownloadPriority::High]);
        assert_eq!(priority(&model), Some(DownloadPriority::High));
    }

    #[test]
    fn ignoring_a_file_reports_filtered_change_once() -> anyhow::Result<()> {
        let mut model = model_for(fixtures::sample_metadata());
        let file = model.file_node(0).ok_or_else(|| anyhow::anyhow!("file"))?;

        assert!(model.set_priority(file, DownloadPriority::High));
        assert!(
            !model
                .take_changes()
                .contains(&ModelChange::FilteredFilesChanged)
        );

        assert!(model.set_priority(file, DownloadPriority::Ignored));
        assert!(
            model
                .take_changes()
                .contains(&ModelChange::FilteredFilesChanged)
        );

        assert!(!model.set_priority(file, DownloadPriority::Ignored));
        assert!(!model.set_priority(file, DownloadPriority::Mixed));
        Ok(())
    }

    #[test]
    fn unchecking_a_folder_ignores_its_subtree() {
        let mut model = model_for(fixtures::sample_metadata());
        let album = model.children(model.root())[0];

        assert!(model.set_check_state(album, CheckState::Unchecked));
        assert!(model.all_filtered());
        assert_eq!(
            model.file_priorities(),
            vec![DownloadPriority::Ignored; 3]
        );
        assert!(
            model
                .take_changes()
                .contains(&ModelChange::FilteredFilesChanged)
        );
        assert_eq!(model.check_state(album), Some(CheckState::Unchecked));
    }

    #[test]
    fn priority_change_notifies_ancestors_and_descendants() -> anyhow::Result<()> {
        let mut model = model_for(fixtures::sample_metadata());
        let front = model.file_node(2).ok_or_else(|| anyhow::anyhow!("front"))?;
        let cover = model.parent(front).ok_or_else(|| anyhow::anyhow!("cover"))?;
        let album = model.parent(cover).ok_or_else(|| anyhow::anyhow!("album"))?;

        assert!(model.set_priority(front, DownloadPriority::High));
        let changes = model.take_changes();
        let priority_row = |parent: Option<NodeId>, row: usize| ModelChange::DataChanged {
            parent,
            rows: row..=row,
            columns: FileColumn::Priority..=FileColumn::Priority,
        };
        assert!(changes.contains(&priority_row(Some(cover), 0)));
        assert!(changes.contains(&priority_row(Some(album), 2)));
        assert!(changes.contains(&priority_row(None, 0)));
        assert_eq!(
            model.node(album).map(Node::priority),
            Some(DownloadPriority::Mixed)
        );

        assert!(model.set_priority(album, DownloadPriority::Maximum));
        let changes = model.take_changes();
        assert!(changes.contains(&ModelChange::DataChanged {
            parent: Some(cover),
            rows: 0..=0,
            columns: FileColumn::Priority..=FileColumn::Priority,
        }));
        assert_eq!(
            model.file_priorities(),
            vec![DownloadPriority::Maximum; 3]
        );
        Ok(())
    }

    #[test]
    fn availability_is_unknown_until_reported() -> anyhow::Result<()> {
        let mut model = model_for(metadata(&[("dir/a", 10), ("dir/b", 30), ("empty", 0)]));
        let dir = model.children(model.root())[0];
        assert_eq!(model.data(dir, FileColumn::Availability), Some(FileValue::Unknown));

        model.update_files_availability(&[1.0, -1.0, -1.0]);
        assert_eq!(
            model.data(dir, FileColumn::Availability),
            Some(FileValue::Ratio(0.25))
        );

        let empty = model.file_node(2).ok_or_else(|| anyhow::anyhow!("empty"))?;
        assert_eq!(model.data(empty, FileColumn::Progress), Some(FileValue::Ratio(1.0)));
        assert_eq!(
            model.data(empty, FileColumn::Availability),
            Some(FileValue::Ratio(0.0))
        );
        assert_eq!(model.data(model.root(), FileColumn::Name), None);
        Ok(())
    }

    #[test]
    fn ignored_files_have_nothing_remaining() -> anyhow::Result<()> {
        let mut model = model_for(metadata(&[("a", 10), ("b", 30)]));
        let first = model.file_node(0).ok_or_else(|| anyhow::anyhow!("a"))?;
        assert_eq!(model.data(first, FileColumn::Remaining), Some(FileValue::Bytes(10)));

        model.set_priority(first, DownloadPriority::Ignored);
        assert_eq!(model.data(first, FileColumn::Remaining), Some(FileValue::Bytes(0)));
        Ok(())
    }

    #[test]
    fn renaming_only_touches_the_name_cell() -> anyhow::Result<()> {
        let mut model = model_for(fixtures::sample_metadata());
        let file = model.file_node(1).ok_or_else(|| anyhow::anyhow!("file"))?;
        let album = model.parent(file).ok_or_else(|| anyhow::anyhow!("album"))?;

        assert!(model.set_name(file, "renamed.flac"));
        assert!(!model.set_name(file, "renamed.flac"));
        assert_eq!(
            model.take_changes(),
            vec![ModelChange::DataChanged {
                parent: Some(album),
                rows: 1..=1,
                columns: FileColumn::Name..=FileColumn::Name,
            }]
        );
        assert_eq!(model.path(file).as_deref(), Some("album/renamed.flac"));
        Ok(())
    }

    #[test]
    fn refresh_pulls_values_from_the_source() -> anyhow::Result<()> {
        let source = Arc::new(StaticContentSource::new(metadata(&[("a", 10), ("b", 10)])));
        let mut model = FileTreeModel::new();
        model.set_content_source(Some(source.clone()));

        source.set_progress(vec![1.0, 0.5]);
        source.set_priorities(vec![DownloadPriority::Normal, DownloadPriority::Ignored]);
        model.refresh();

        let second = model.file_node(1).ok_or_else(|| anyhow::anyhow!("b"))?;
        assert_eq!(
            model.data(second, FileColumn::Priority),
            Some(FileValue::Priority(DownloadPriority::Ignored))
        );
        let root_children = model.children(model.root()).to_vec();
        assert_eq!(root_children.len(), 2);
        Ok(())
    }
}
