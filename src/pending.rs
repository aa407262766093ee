//! Pending-request table.
//!
//! Maps request ids to their resolvers. An entry is inserted when the
//! request is posted and removed when the matching response or error
//! arrives; removal happens before the resolver fires, so a continuation
//! that immediately issues a new request can never observe stale state.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

use crate::message::{EncodedValue, Id};

/// What a request ultimately resolved to: the encoded result, or the peer's
/// error string.
pub(crate) type Outcome = Result<EncodedValue, String>;

#[derive(Default)]
pub(crate) struct PendingTable {
    slots: Mutex<HashMap<Id, oneshot::Sender<Outcome>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a slot for `id` and hand back the receiving half.
    pub fn register(&self, id: Id) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(id, tx);
        rx
    }

    /// Resolve the slot for `id`, if any.
    ///
    /// Unknown ids are ignored; they belong to another session or to a
    /// request that already completed.
    pub fn complete(&self, id: &Id, outcome: Outcome) {
        let slot = self.slots.lock().remove(id);
        match slot {
            // The waiter may have been dropped; resolving into the void is
            // fine either way.
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => trace!("discarding reply for unknown request {id}"),
        }
    }
}
