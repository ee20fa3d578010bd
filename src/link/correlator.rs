//! FIFO request/response correlation.
//!
//! The controller answers one line per command, in the order commands were
//! received. The link therefore pairs the Nth pending request with the Nth
//! inbound line; no identifiers travel on the wire. A controller that
//! reorders its answers will have them misrouted.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::models::{CommandResult, Response};

/// Receiving side of a pending request.
pub type PendingReply = oneshot::Receiver<CommandResult>;

/// Sending side of a pending request, held in the queue.
pub type PendingSlot = oneshot::Sender<CommandResult>;

/// Queue of requests written to the controller but not yet answered.
///
/// Every slot is resolved exactly once: by [`resolve_next`] or by
/// [`fail_all`].
///
/// [`resolve_next`]: Correlator::resolve_next
/// [`fail_all`]: Correlator::fail_all
#[derive(Debug, Default)]
pub struct Correlator {
    pending: VecDeque<PendingSlot>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new pending request and return the handle to await.
    ///
    /// Standalone entry point for callers without their own channel. The
    /// link task already holds the caller's sender and uses [`push`].
    ///
    /// [`push`]: Correlator::push
    pub fn register(&mut self) -> PendingReply {
        let (slot, reply) = oneshot::channel();
        self.push(slot);
        reply
    }

    /// Append a caller-supplied slot.
    pub fn push(&mut self, slot: PendingSlot) {
        self.pending.push_back(slot);
    }

    /// Resolve the oldest pending request with `response`.
    ///
    /// Returns `false` when nothing was pending; the response is logged and
    /// dropped.
    pub fn resolve_next(&mut self, response: Response) -> bool {
        let Some(slot) = self.pending.pop_front() else {
            warn!("Dropping response with no pending request: {:?}", response);
            return false;
        };

        // The caller may have stopped waiting (timeout). The slot is still
        // consumed so later requests stay aligned.
        if slot.send(CommandResult::from(response)).is_err() {
            debug!("Response arrived for an abandoned request");
        }
        true
    }

    /// Fail every pending request with `reason` and empty the queue.
    ///
    /// Returns the number of requests failed.
    pub fn fail_all(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        for slot in self.pending.drain(..) {
            let _ = slot.send(CommandResult::failure(reason));
        }
        if count > 0 {
            debug!("Failed {} pending requests: {}", count, reason);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
