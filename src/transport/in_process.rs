//! In-process endpoint pair.
//!
//! The message-port analogue: two linked endpoints where a value posted on
//! one side is delivered, in FIFO order, to every subscriber of the other.
//! This is the substrate the integration tests run the whole protocol over,
//! and the natural glue between two bridge sessions inside one process.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{MessageEndpoint, MessageSubscription, SubscriberSet};
use crate::error::TransportError;

/// One half of a linked endpoint pair.
#[derive(Clone)]
pub struct InProcessEndpoint {
    /// Subscribers on the peer half; posting delivers to these.
    peer: Arc<SubscriberSet>,
    /// Subscribers on this half.
    local: Arc<SubscriberSet>,
}

/// Create two linked endpoints.
///
/// Messages posted on the first are observed by subscribers of the second
/// and vice versa. Cloning a half gives another handle onto the same side.
pub fn endpoint_pair() -> (InProcessEndpoint, InProcessEndpoint) {
    let left = Arc::new(SubscriberSet::new());
    let right = Arc::new(SubscriberSet::new());
    (
        InProcessEndpoint {
            peer: right.clone(),
            local: left.clone(),
        },
        InProcessEndpoint {
            peer: left,
            local: right,
        },
    )
}

#[async_trait]
impl MessageEndpoint for InProcessEndpoint {
    async fn post(&self, message: Value) -> Result<(), TransportError> {
        self.peer.deliver(&message);
        Ok(())
    }

    fn subscribe(&self) -> MessageSubscription {
        self.local.subscribe()
    }
}
