//! Delivery failures reported by [`crate::EventBus::try_publish`].
//!
//! Publishing never loses an event outright: every envelope enters the replay
//! ring first. The ring holds the most recent `capacity` envelopes, so an
//! undelivered event stays recoverable through
//! [`crate::EventBus::subscribe`] until newer events evict it.

use thiserror::Error;

use crate::payloads::EventId;

/// Error emitted when an event reached the replay ring but no live receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EventBusError {
    /// No live subscriber received the event.
    #[error("event had no live subscribers")]
    NoSubscribers {
        /// Identifier assigned to the event.
        event_id: EventId,
        /// Event kind string for filtering in logs.
        event_kind: &'static str,
    },
}

impl EventBusError {
    /// Identifier assigned to the undelivered event.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        match self {
            Self::NoSubscribers { event_id, .. } => *event_id,
        }
    }

    /// Kind of the undelivered event.
    #[must_use]
    pub const fn event_kind(&self) -> &'static str {
        match self {
            Self::NoSubscribers { event_kind, .. } => event_kind,
        }
    }

    /// `since_id` to pass to [`crate::EventBus::subscribe`] so the replayed
    /// backlog starts with the undelivered event.
    #[must_use]
    pub const fn replay_since(&self) -> EventId {
        self.event_id().saturating_sub(1)
    }
}

/// Result wrapper for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;
