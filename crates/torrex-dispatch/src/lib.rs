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

//! Serial request dispatcher: at most one request in flight per channel.
//!
//! # Design
//! - Requests are queued in submission order and only the head is processed.
//! - A processor either finishes synchronously (`Processing::Done`) or reports
//!   completion later through [`SerialRequestDispatcher::on_processing_done`].
//! - Synchronous completions are drained in a loop, never by recursion, so a
//!   long run of instant answers keeps FIFO order and a flat stack.

use std::collections::VecDeque;
use std::fmt;

use tracing::{trace, warn};

/// Sequence number assigned to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw sequence value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of starting to process a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processing<R> {
    /// Finished immediately with a response.
    Done(R),
    /// Still running; the owner calls `on_processing_done` when it finishes.
    Pending,
}

/// Work performed for each queued request.
pub trait RequestProcessor {
    /// Request payload.
    type Request;
    /// Caller supplied context carried alongside the request.
    type Context;
    /// Result of processing.
    type Response;

    /// Start processing the queue head.
    fn process(
        &mut self,
        id: RequestId,
        request: &Self::Request,
        context: &Self::Context,
    ) -> Processing<Self::Response>;

    /// Completion hook, called once per request in submission order.
    fn processing_done(&mut self, id: RequestId, response: Self::Response);
}

struct Queued<Req, Ctx> {
    id: RequestId,
    request: Req,
    context: Ctx,
}

/// FIFO queue that hands one request at a time to its processor.
pub struct SerialRequestDispatcher<P: RequestProcessor> {
    processor: P,
    queue: VecDeque<Queued<P::Request, P::Context>>,
    next_id: u64,
}

impl<P: RequestProcessor> SerialRequestDispatcher<P> {
    /// Dispatcher with an empty queue.
    #[must_use]
    pub const fn new(processor: P) -> Self {
        Self {
            processor,
            queue: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Queue a request; it starts right away when nothing else is queued.
    pub fn submit(&mut self, request: P::Request, context: P::Context) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let idle = self.queue.is_empty();
        self.queue.push_back(Queued {
            id,
            request,
            context,
        });
        trace!(request_id = %id, queued = self.queue.len(), "request submitted");
        if idle {
            self.drive();
        }
        id
    }

    /// Complete the request currently in flight and start the next one.
    pub fn on_processing_done(&mut self, response: P::Response) {
        let Some(head) = self.queue.pop_front() else {
            warn!("processing finished with no request in flight");
            return;
        };
        self.processor.processing_done(head.id, response);
        self.drive();
    }

    /// Id of the request in flight.
    #[must_use]
    pub fn in_flight(&self) -> Option<RequestId> {
        self.queue.front().map(|queued| queued.id)
    }

    /// Number of queued requests, including the one in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Shared access to the processor.
    #[must_use]
    pub const fn processor(&self) -> &P {
        &self.processor
    }

    /// Exclusive access to the processor.
    pub const fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    fn drive(&mut self) {
        while let Some(head) = self.queue.front() {
            let outcome = self.processor.process(head.id, &head.request, &head.context);
            let Processing::Done(response) = outcome else {
                return;
            };
            if let Some(done) = self.queue.pop_front() {
                self.processor.processing_done(done.id, response);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        started: Vec<u64>,
        completed: Vec<(u64, String)>,
        synchronous: bool,
    }

    impl RequestProcessor for Recorder {
        type Request = String;
        type Context = u64;
        type Response = String;

        fn process(
            &mut self,
            id: RequestId,
            request: &Self::Request,
            context: &Self::Context,
        ) -> Processing<Self::Response> {
            self.started.push(id.get());
            if self.synchronous {
                Processing::Done(format!("{request}:{context}"))
            } else {
                Processing::Pending
            }
        }

        fn processing_done(&mut self, id: RequestId, response: Self::Response) {
            self.completed.push((id.get(), response));
        }
    }

    #[test]
    fn only_the_head_is_processed() {
        let mut dispatcher = SerialRequestDispatcher::new(Recorder::default());
        let first = dispatcher.submit("r1".to_string(), 1);
        let second = dispatcher.submit("r2".to_string(), 2);

        assert_eq!(dispatcher.processor().started, vec![first.get()]);
        assert_eq!(dispatcher.in_flight(), Some(first));
        assert_eq!(dispatcher.len(), 2);

        dispatcher.on_processing_done("done-1".to_string());
        assert_eq!(dispatcher.processor().started, vec![first.get(), second.get()]);
        assert_eq!(
            dispatcher.processor().completed,
            vec![(first.get(), "done-1".to_string())]
        );

        dispatcher.on_processing_done("done-2".to_string());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn synchronous_completion_keeps_fifo_order() {
        let mut dispatcher = SerialRequestDispatcher::new(Recorder {
            synchronous: true,
            ..Recorder::default()
        });
        for (request, context) in [("r1", 1), ("r2", 2), ("r3", 3)] {
            dispatcher.submit(request.to_string(), context);
        }

        let completed: Vec<&str> = dispatcher
            .processor()
            .completed
            .iter()
            .map(|(_, response)| response.as_str())
            .collect();
        assert_eq!(completed, vec!["r1:1", "r2:2", "r3:3"]);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn queued_requests_drain_synchronously_after_a_pending_head() {
        let mut dispatcher = SerialRequestDispatcher::new(Recorder::default());
        dispatcher.submit("r1".to_string(), 1);
        dispatcher.submit("r2".to_string(), 2);
        dispatcher.submit("r3".to_string(), 3);

        dispatcher.processor_mut().synchronous = true;
        dispatcher.on_processing_done("async".to_string());

        let ids: Vec<u64> = dispatcher
            .processor()
            .completed
            .iter()
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn completion_without_request_is_ignored() {
        let mut dispatcher = SerialRequestDispatcher::new(Recorder::default());
        dispatcher.on_processing_done("stray".to_string());
        assert!(dispatcher.processor().completed.is_empty());
    }

    #[test]
    fn ids_wrap_to_zero() {
        let mut dispatcher = SerialRequestDispatcher::new(Recorder {
            synchronous: true,
            ..Recorder::default()
        });
        dispatcher.next_id = u64::MAX;

        let last = dispatcher.submit("max".to_string(), 0);
        let wrapped = dispatcher.submit("zero".to_string(), 0);
        assert_eq!(last.get(), u64::MAX);
        assert_eq!(wrapped.get(), 0);
    }
}
