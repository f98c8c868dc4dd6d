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

//! Event bus shared by the session backend and its state models.
//!
//! The bus provides a typed event enum, sequential identifiers, and support for
//! replaying recent events when subscribers attach late. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped for lagging receivers.

mod error;
mod payloads;

pub use error::{EventBusError, EventBusResult};
pub use payloads::{
    DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId, TorrentSnapshot, TorrentState,
};

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, so dropped events affect both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let (id, _) = self.dispatch(event);
        id
    }

    /// Publish an event and report whether any live subscriber received it.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::NoSubscribers`] when the event was only recorded
    /// in the replay ring.
    pub fn try_publish(&self, event: Event) -> EventBusResult<EventId> {
        let kind = event.kind();
        let (id, delivered) = self.dispatch(event);
        if delivered {
            Ok(id)
        } else {
            Err(EventBusError::NoSubscribers {
                event_id: id,
                event_kind: kind,
            })
        }
    }

    fn dispatch(&self, event: Event) -> (EventId, bool) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let delivered = self.sender.send(envelope).is_ok();
        (id, delivered)
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        let receiver = self.sender.subscribe();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock();
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }

        EventStream {
            backlog,
            receiver,
            last_seen: None,
        }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.buffer.lock().back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
    last_seen: Option<EventId>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    ///
    /// Events already yielded from the backlog are skipped when they also
    /// arrive on the live channel.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            self.last_seen = Some(event.id);
            return Some(event);
        }

        loop {
            let envelope = match self.receiver.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            };
            if self.last_seen.is_some_and(|seen| envelope.id <= seen) {
                continue;
            }
            self.last_seen = Some(envelope.id);
            return Some(envelope);
        }
    }

    /// Convert into a `Stream`, dropping lag notifications.
    pub fn into_stream(self) -> impl Stream<Item = EventEnvelope> {
        let last_seen = self.backlog.back().map(|event| event.id).or(self.last_seen);
        let live = BroadcastStream::new(self.receiver)
            .filter_map(Result::ok)
            .filter(move |envelope| last_seen.is_none_or(|seen| envelope.id > seen));
        tokio_stream::iter(self.backlog).chain(live)
    }
}
