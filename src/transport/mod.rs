//! # Transport Abstraction Module
//!
//! The bridge talks to the outside world through one trait: a duplex message
//! endpoint that can post a single structured value and surface incoming
//! values to any number of subscribers. Everything above it — the sub-channel
//! multiplexer, the proxy engine, the dispatcher — is written against this
//! contract and never against a concrete socket.
//!
//! ```text
//! ┌──────────────────┐    ┌───────────────────┐    ┌──────────────────┐
//! │  Proxy engine /  │───▶│  MessageEndpoint  │───▶│  In-process pair │
//! │   Dispatcher     │    │      trait        │    │  TCP adapter, …  │
//! └──────────────────┘    └───────────────────┘    └──────────────────┘
//! ```
//!
//! ## Contract
//!
//! - `post` delivers the message at most once to each subscriber on the peer
//!   side; ordering within one endpoint is FIFO.
//! - Every subscriber in the same realm observes every incoming message;
//!   dropping the subscription unsubscribes.
//! - Backpressure is the transport's concern; the core treats an endpoint
//!   that stops delivering as a permanently pending state.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;

pub mod in_process;
pub mod tcp;

pub use in_process::{endpoint_pair, InProcessEndpoint};
pub use tcp::{TcpEndpoint, TcpEndpointListener};

/// An endpoint shared between sessions and sub-channels.
pub type SharedEndpoint = Arc<dyn MessageEndpoint>;

/// A bidirectional message endpoint.
///
/// Implementations deliver whole structured values; framing below one value
/// per message is their concern, not the bridge's.
#[async_trait]
pub trait MessageEndpoint: Send + Sync {
    /// Post one message towards the peer.
    ///
    /// May fail synchronously on a closed transport; the RPC layer logs such
    /// failures instead of propagating them into pending requests.
    async fn post(&self, message: Value) -> Result<(), TransportError>;

    /// Subscribe to incoming messages.
    ///
    /// Each subscription observes every message arriving after the call, in
    /// arrival order.
    fn subscribe(&self) -> MessageSubscription;
}

/// A live subscription on an endpoint.
///
/// Dropping the subscription unsubscribes the handler.
pub struct MessageSubscription {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl MessageSubscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { rx }
    }

    /// Wait for the next incoming message; `None` once the endpoint is gone.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }

    /// Take an already-delivered message without waiting.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }
}

/// Fan-out registry behind an endpoint's receive side.
///
/// Senders that report a dropped receiver are pruned on the next delivery.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    senders: Mutex<Vec<mpsc::UnboundedSender<Value>>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> MessageSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().push(tx);
        MessageSubscription::new(rx)
    }

    /// Deliver one message to every live subscriber.
    pub fn deliver(&self, message: &Value) {
        self.senders
            .lock()
            .retain(|tx| tx.send(message.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn every_subscriber_sees_every_message() {
        let set = SubscriberSet::new();
        let mut first = set.subscribe();
        let mut second = set.subscribe();

        set.deliver(&json!(1));
        set.deliver(&json!(2));

        assert_eq!(first.recv().await, Some(json!(1)));
        assert_eq!(first.recv().await, Some(json!(2)));
        assert_eq!(second.recv().await, Some(json!(1)));
        assert_eq!(second.recv().await, Some(json!(2)));
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let set = SubscriberSet::new();
        let first = set.subscribe();
        let mut second = set.subscribe();
        drop(first);

        set.deliver(&json!("still delivered"));
        assert_eq!(second.recv().await, Some(json!("still delivered")));
    }
}
