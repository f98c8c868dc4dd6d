//! Change notifications emitted by the state models.
//!
//! # Design
//! - A model appends changes while it mutates and the view drains them afterwards.
//! - Structural changes are bracketed (`RowsAboutToBe*` before the mutation,
//!   `Rows*` after) and always precede data changes caused by the same update.
//! - `parent: None` addresses the invisible top level.

use std::ops::RangeInclusive;

/// One notification about a model mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChange<N, C> {
    /// The whole model is about to be rebuilt.
    ResetBegin,
    /// The rebuild finished; views must re-read everything.
    ResetEnd,
    /// Rows are about to be inserted under `parent`.
    RowsAboutToBeInserted {
        /// Owner of the new rows.
        parent: Option<N>,
        /// Row positions the new rows will occupy.
        rows: RangeInclusive<usize>,
    },
    /// Rows were inserted under `parent`.
    RowsInserted {
        /// Owner of the new rows.
        parent: Option<N>,
        /// Row positions the new rows occupy.
        rows: RangeInclusive<usize>,
    },
    /// Rows are about to be removed from `parent`.
    RowsAboutToBeRemoved {
        /// Owner of the rows.
        parent: Option<N>,
        /// Row positions being removed.
        rows: RangeInclusive<usize>,
    },
    /// Rows were removed from `parent`.
    RowsRemoved {
        /// Owner of the rows.
        parent: Option<N>,
        /// Row positions that were removed.
        rows: RangeInclusive<usize>,
    },
    /// Cell values changed in a block of rows and columns.
    DataChanged {
        /// Owner of the rows.
        parent: Option<N>,
        /// Affected rows.
        rows: RangeInclusive<usize>,
        /// Affected columns.
        columns: RangeInclusive<C>,
    },
    /// The set of files excluded from download changed.
    FilteredFilesChanged,
}

/// Ordered buffer of pending notifications.
#[derive(Debug, Clone)]
pub struct ChangeQueue<N, C> {
    pending: Vec<ModelChange<N, C>>,
}

impl<N, C> Default for ChangeQueue<N, C> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
        }
    }
}

impl<N, C> ChangeQueue<N, C> {
    /// Append a notification.
    pub fn push(&mut self, change: ModelChange<N, C>) {
        self.pending.push(change);
    }

    /// Whether nothing is pending.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending notifications, oldest first.
    #[must_use]
    pub fn pending(&self) -> &[ModelChange<N, C>] {
        &self.pending
    }

    /// Remove and return everything pending.
    pub fn take(&mut self) -> Vec<ModelChange<N, C>> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_drains_in_order() {
        let mut queue: ChangeQueue<u32, u8> = ChangeQueue::default();
        queue.push(ModelChange::ResetBegin);
        queue.push(ModelChange::RowsInserted {
            parent: Some(4),
            rows: 0..=1,
        });
        queue.push(ModelChange::ResetEnd);

        let drained = queue.take();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0], ModelChange::ResetBegin);
        assert_eq!(drained[2], ModelChange::ResetEnd);
        assert!(queue.is_empty());
    }
}
