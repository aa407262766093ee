//! Sub-channel multiplexing.
//!
//! A sub-channel turns one physical endpoint into any number of logical
//! ones, partitioned by a tag. Posting on the sub-channel wraps the value in
//! a `{channel, payload}` envelope; subscribing surfaces only the payloads
//! of envelopes carrying the matching tag. Untagged traffic belongs to the
//! bare RPC stream and is invisible to every sub-channel.
//!
//! Sub-channels are full endpoints, so they nest: the codec exposes wrapped
//! values on sub-channels, and values wrapped inside those sessions land on
//! sub-channels of the same physical endpoint again.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::TransportError;
use crate::message::{ChannelEnvelope, Id, CHANNEL_FIELD, PAYLOAD_FIELD};
use crate::transport::{MessageEndpoint, MessageSubscription, SharedEndpoint};

/// A logical endpoint multiplexed over a parent endpoint by tag.
pub struct SubChannel {
    parent: SharedEndpoint,
    tag: Id,
}

impl SubChannel {
    pub fn new(parent: SharedEndpoint, tag: Id) -> Self {
        Self { parent, tag }
    }

    /// The tag partitioning this channel's traffic.
    pub fn tag(&self) -> &Id {
        &self.tag
    }
}

/// Derive the logical endpoint `endpoint/tag`.
///
/// Multiple channels with the same tag are permitted; each receives its own
/// copy of matching messages.
pub fn create_channel(endpoint: SharedEndpoint, tag: Id) -> SubChannel {
    SubChannel::new(endpoint, tag)
}

#[async_trait]
impl MessageEndpoint for SubChannel {
    async fn post(&self, message: Value) -> Result<(), TransportError> {
        let envelope = ChannelEnvelope {
            channel: self.tag.clone(),
            payload: message,
        };
        self.parent.post(serde_json::to_value(envelope)?).await
    }

    fn subscribe(&self) -> MessageSubscription {
        let mut parent_sub = self.parent.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let tag = self.tag.clone();

        // Filter the parent stream down to this tag's payloads. The task
        // ends when the parent endpoint goes away or the subscriber drops.
        tokio::spawn(async move {
            while let Some(raw) = parent_sub.recv().await {
                let Some(map) = raw.as_object() else { continue };
                let Some(channel) = map.get(CHANNEL_FIELD) else {
                    // Bare-stream traffic; not ours.
                    continue;
                };
                let matches = serde_json::from_value::<Id>(channel.clone())
                    .map(|t| t == tag)
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
                // Malformed payloads are the RPC layer's problem; pass them
                // through unchanged.
                let payload = map.get(PAYLOAD_FIELD).cloned().unwrap_or(Value::Null);
                if tx.send(payload).is_err() {
                    trace!("sub-channel subscriber dropped, ending filter");
                    break;
                }
            }
        });

        MessageSubscription::new(rx)
    }
}
