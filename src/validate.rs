//! Inbound message validation.
//!
//! Everything arriving over a transport is untrusted. The dispatcher runs
//! [`parse_request`] before touching the exposed root, and the client side
//! runs [`parse_reply`] before resolving a pending request. Failures are
//! reported through the error path; nothing here ever panics into a
//! transport handler.

use serde_json::Value;

use crate::error::BridgeError;
use crate::message::{Reply, Request, CHANNEL_FIELD};

/// Property-name fragments that never reach the chain walk.
///
/// The check is substring-based rather than exact-match: it also rejects
/// benign names like `myConstructor`, which is the intended trade — near
/// misses stay out.
pub const RESERVED_KEY_SUBSTRINGS: [&str; 3] = ["__proto__", "prototype", "constructor"];

/// Reject any key chain touching a reserved property name.
pub fn check_keys<S: AsRef<str>>(keys: &[S]) -> Result<(), BridgeError> {
    for key in keys {
        let key = key.as_ref();
        if RESERVED_KEY_SUBSTRINGS
            .iter()
            .any(|reserved| key.contains(reserved))
        {
            return Err(BridgeError::UnsafeKey(key.to_string()));
        }
    }
    Ok(())
}

/// Validate and parse an inbound request.
///
/// Structural rules first (object shape, id, type, key chain, args), then
/// key safety, then the typed parse. Channel-tagged traffic must already be
/// filtered out by the caller.
pub fn parse_request(raw: &Value) -> Result<Request, BridgeError> {
    let map = raw
        .as_object()
        .ok_or_else(|| BridgeError::Protocol("request is not an object".to_string()))?;

    if map.get("id").map_or(true, Value::is_null) {
        return Err(BridgeError::Protocol("request has no id".to_string()));
    }

    let kind = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| BridgeError::Protocol("request has no type".to_string()))?;
    if !matches!(kind, "call" | "construct" | "await") {
        return Err(BridgeError::Protocol(format!(
            "unknown request type `{kind}`"
        )));
    }

    let chain = map
        .get("keyChain")
        .and_then(Value::as_array)
        .ok_or_else(|| BridgeError::Protocol("keyChain must be an array".to_string()))?;
    let mut keys = Vec::with_capacity(chain.len());
    for entry in chain {
        keys.push(entry.as_str().ok_or_else(|| {
            BridgeError::Protocol("keyChain entries must be strings".to_string())
        })?);
    }
    check_keys(&keys)?;

    if matches!(kind, "call" | "construct")
        && map.get("args").and_then(Value::as_array).is_none()
    {
        return Err(BridgeError::Protocol("args must be an array".to_string()));
    }

    serde_json::from_value(raw.clone())
        .map_err(|e| BridgeError::Protocol(format!("malformed request: {e}")))
}

/// Parse an inbound reply on the requesting side.
///
/// Anything that is not a well-formed response or error for this session —
/// sub-channel envelopes, requests travelling the other way, junk — yields
/// `None` and is ignored by the caller.
pub fn parse_reply(raw: &Value) -> Option<Reply> {
    let map = raw.as_object()?;
    if map.contains_key(CHANNEL_FIELD) {
        return None;
    }
    if map.get("id").map_or(true, Value::is_null) {
        return None;
    }
    match map.get("type").and_then(Value::as_str)? {
        "response" | "error" => serde_json::from_value(raw.clone()).ok(),
        _ => None,
    }
}
