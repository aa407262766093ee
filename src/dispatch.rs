//! Server-side dispatcher.
//!
//! [`expose`] binds a value to an endpoint: every valid request arriving on
//! the bare stream is resolved against that root by walking its key chain
//! over own properties, performing the requested operation, and replying
//! with the encoded result. Each request runs in its own task, so exposed
//! callables are free to await (including calls back across the bridge).
//!
//! Nothing in here throws into the transport handler: failures become error
//! replies addressed by the request id, and a failure to deliver the reply
//! itself is logged and dropped.

use serde_json::Value;
use tracing::{debug, warn};

use crate::codec;
use crate::error::BridgeError;
use crate::message::{self, EncodedValue, Reply, Request};
use crate::transport::SharedEndpoint;
use crate::value::BridgeValue;

/// Install a dispatcher for `value` on `endpoint`.
///
/// The root itself stays bare: only operation results are wrapped, so
/// exposing is never re-entrant.
pub fn expose(value: BridgeValue, endpoint: SharedEndpoint) {
    let mut sub = endpoint.subscribe();
    tokio::spawn(async move {
        while let Some(raw) = sub.recv().await {
            if message::is_channel_tagged(&raw) {
                // Sub-channel traffic belongs to the sessions running there.
                continue;
            }
            let root = value.clone();
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                handle_message(root, endpoint, raw).await;
            });
        }
        debug!("dispatcher listener finished");
    });
}

async fn handle_message(root: BridgeValue, endpoint: SharedEndpoint, raw: Value) {
    let request = match crate::validate::parse_request(&raw) {
        Ok(request) => request,
        Err(error) => {
            match message::request_id(&raw) {
                Some(id) => send_reply(&endpoint, Reply::Error { id, error: error.to_string() }).await,
                None => warn!("dropping invalid message without usable id: {error}"),
            }
            return;
        }
    };

    let id = request.id().clone();
    let reply = match perform(root, &endpoint, request).await {
        Ok(data) => Reply::Response { id, data },
        Err(error) => Reply::Error {
            id,
            error: error.to_string(),
        },
    };
    send_reply(&endpoint, reply).await;
}

async fn send_reply(endpoint: &SharedEndpoint, reply: Reply) {
    let raw = match serde_json::to_value(&reply) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("reply does not serialise: {e}");
            return;
        }
    };
    if let Err(e) = endpoint.post(raw).await {
        warn!("failed to deliver reply: {e}");
    }
}

async fn perform(
    root: BridgeValue,
    endpoint: &SharedEndpoint,
    request: Request,
) -> Result<EncodedValue, BridgeError> {
    match request {
        Request::Await { key_chain, .. } => {
            let target = walk(&root, &key_chain)?;
            codec::encode(endpoint, target)
        }
        Request::Call {
            key_chain, args, ..
        } => {
            let args = codec::decode_args(endpoint, args);
            let result = match walk(&root, &key_chain)? {
                BridgeValue::Function(function) => function(args).await?,
                // A proxied value is invoked back in its home realm.
                BridgeValue::Remote(proxy) => proxy.call(args).await?,
                _ => return Err(BridgeError::NotCallable(chain_text(&key_chain))),
            };
            codec::encode(endpoint, result)
        }
        Request::Construct {
            key_chain, args, ..
        } => {
            let args = codec::decode_args(endpoint, args);
            let instance = match walk(&root, &key_chain)? {
                BridgeValue::Constructor(constructor) => constructor(args).await?,
                BridgeValue::Remote(proxy) => proxy.construct(args).await?,
                _ => return Err(BridgeError::NotConstructible(chain_text(&key_chain))),
            };
            // Instances cross by reference unconditionally, so the caller
            // holds the live object rather than a snapshot of it.
            codec::encode_wrapped(endpoint, instance)
        }
    }
}

/// Resolve a key chain against the root by own-property access.
///
/// Hitting a remote handle forwards the rest of the chain to the value's
/// home session; anything else must own each key as a direct property.
fn walk(root: &BridgeValue, chain: &[String]) -> Result<BridgeValue, BridgeError> {
    let mut current = root.clone().into_unmarked();
    for (index, key) in chain.iter().enumerate() {
        if let BridgeValue::Remote(proxy) = current {
            let forwarded = chain[index..]
                .iter()
                .fold(proxy, |node, key| node.prop(key.as_str()));
            return Ok(BridgeValue::Remote(forwarded));
        }
        current = match current {
            BridgeValue::Object(map) => map
                .get(key)
                .cloned()
                .ok_or_else(|| BridgeError::MissingProperty(key.clone()))?,
            BridgeValue::Data(Value::Object(fields)) => fields
                .get(key)
                .map(|value| BridgeValue::Data(value.clone()))
                .ok_or_else(|| BridgeError::MissingProperty(key.clone()))?,
            _ => return Err(BridgeError::MissingProperty(key.clone())),
        }
        .into_unmarked();
    }
    Ok(current)
}

fn chain_text(chain: &[String]) -> String {
    if chain.is_empty() {
        "<root>".to_string()
    } else {
        chain.join(".")
    }
}
