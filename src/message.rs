//! Wire message types.
//!
//! Every value travelling on a bare (non-sub-channel) stream is one of
//! [`Request`] or [`Reply`]; sub-channel traffic is a [`ChannelEnvelope`]
//! whose payload is again one of the former, recursively. Field names are
//! case-sensitive and part of the wire contract, including the historical
//! misspelling `wraped` on the by-reference encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field tagging a message as sub-channel traffic.
pub const CHANNEL_FIELD: &str = "channel";

/// Field carrying the inner message of a sub-channel envelope.
pub const PAYLOAD_FIELD: &str = "payload";

/// A request or object identifier: an integer in the common case, a string
/// once the allocator has switched to its random regime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Num(u64),
    Str(String),
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Id::Num(n) => write!(f, "{n}"),
            Id::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Num(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Str(s.to_string())
    }
}

/// A value crossing the bridge, either copied inline or exposed by reference
/// on a sub-channel of the same endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EncodedValue {
    /// Inline: the data rides along and is copied by the transport.
    #[serde(rename = "any")]
    Inline { data: Value },

    /// By reference: the sender exposed the value on sub-channel `id`.
    ///
    /// The historical spelling `wraped` is what existing peers put on the
    /// wire; changing it would break interop.
    #[serde(rename = "wraped")]
    Wrapped { id: Id },
}

/// A request travelling towards the exposed root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Invoke the function at the key chain.
    #[serde(rename = "call")]
    Call {
        id: Id,
        #[serde(rename = "keyChain")]
        key_chain: Vec<String>,
        args: Vec<EncodedValue>,
    },

    /// Instantiate the constructor at the key chain.
    #[serde(rename = "construct")]
    Construct {
        id: Id,
        #[serde(rename = "keyChain")]
        key_chain: Vec<String>,
        args: Vec<EncodedValue>,
    },

    /// Resolve the value at the key chain.
    #[serde(rename = "await")]
    Await {
        id: Id,
        #[serde(rename = "keyChain")]
        key_chain: Vec<String>,
    },
}

impl Request {
    /// The request id, matched against the pending table by the issuer.
    pub fn id(&self) -> &Id {
        match self {
            Request::Call { id, .. } | Request::Construct { id, .. } | Request::Await { id, .. } => {
                id
            }
        }
    }

    /// The property path this request resolves against the exposed root.
    pub fn key_chain(&self) -> &[String] {
        match self {
            Request::Call { key_chain, .. }
            | Request::Construct { key_chain, .. }
            | Request::Await { key_chain, .. } => key_chain,
        }
    }
}

/// A reply travelling back to the requesting side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reply {
    /// Successful outcome carrying the encoded result.
    #[serde(rename = "response")]
    Response { id: Id, data: EncodedValue },

    /// Failed outcome carrying the error message.
    #[serde(rename = "error")]
    Error { id: Id, error: String },
}

/// One message of sub-channel traffic on a shared endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    pub channel: Id,
    pub payload: Value,
}

/// Whether a raw endpoint message belongs to a sub-channel.
///
/// Bare-stream handlers skip these; only the multiplexer looks inside.
pub fn is_channel_tagged(raw: &Value) -> bool {
    raw.as_object().is_some_and(|map| map.contains_key(CHANNEL_FIELD))
}

/// Best-effort extraction of a message id, used to address error replies for
/// messages that fail validation.
pub fn request_id(raw: &Value) -> Option<Id> {
    let id = raw.as_object()?.get("id")?;
    serde_json::from_value(id.clone()).ok()
}
