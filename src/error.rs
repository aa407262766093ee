//! Error types shared across the bridge.
//!
//! The dispatcher never lets an error escape an incoming-message handler:
//! everything in [`BridgeError`] is either turned into an error reply carrying
//! the request id, or logged and dropped when no reply can be produced.

use thiserror::Error;

/// Failures raised by the RPC layer.
///
/// The variants map onto the error replies travelling over the wire: whatever
/// `Display` produces for a variant is exactly the `error` string the peer
/// receives, and [`BridgeError::Remote`] is the mirror image on the receiving
/// side.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The inbound message is not a structurally valid request or reply.
    #[error("malformed message: {0}")]
    Protocol(String),

    /// The key chain contains a reserved property name.
    #[error("unsafe property names in key chain: `{0}`")]
    UnsafeKey(String),

    /// The chain walk hit a property the target does not own.
    #[error("missing property `{0}` on exposed target")]
    MissingProperty(String),

    /// A `call` request reached a terminal value that is not a function.
    #[error("`{0}` is not a function")]
    NotCallable(String),

    /// A `construct` request reached a terminal value that is not a
    /// constructor.
    #[error("`{0}` is not a constructor")]
    NotConstructible(String),

    /// An exposed callable failed; the message crosses the wire verbatim.
    #[error("{0}")]
    User(String),

    /// The peer replied with an error; carries the peer's message verbatim.
    #[error("{0}")]
    Remote(String),

    /// A value with callables below its top level cannot be copied inline.
    #[error("value cannot be copied over the transport: {0}")]
    Uncopyable(String),

    /// Posting a message on the endpoint failed.
    #[error("transport send failed: {0}")]
    Transport(#[from] TransportError),

    /// The session listener is gone, so the pending request can never be
    /// resolved by a reply.
    #[error("endpoint closed before a reply arrived")]
    ChannelClosed,
}

impl BridgeError {
    /// Failure raised from inside an exposed function or constructor.
    ///
    /// The message is what the calling side observes as its rejection.
    pub fn user(message: impl Into<String>) -> Self {
        BridgeError::User(message.into())
    }
}

/// Failures raised by a transport endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint is closed and can no longer carry messages.
    #[error("endpoint is closed")]
    Closed,

    /// An I/O failure from the underlying stream.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// The message could not be serialised into a frame.
    #[error("message could not be serialised: {0}")]
    Serialize(#[from] serde_json::Error),
}
