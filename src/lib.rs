//! # Object Bridge
//!
//! A transport-agnostic remote-object bridge: one side exposes a value on a
//! bidirectional message endpoint, the other side wraps the endpoint and
//! receives a proxy that looks local. Property chains, calls, constructions
//! and awaits on the proxy become request/response messages; results that
//! carry callables are automatically re-exported on logical sub-channels
//! multiplexed over the same physical transport, recursively.
//!
//! ```no_run
//! use std::sync::Arc;
//! use object_bridge::{endpoint_pair, expose, wrap, BridgeValue};
//!
//! # async fn demo() -> Result<(), object_bridge::BridgeError> {
//! let (client_side, server_side) = endpoint_pair();
//!
//! expose(
//!     BridgeValue::object([(
//!         "add",
//!         BridgeValue::function(|args| async move {
//!             let a = args[0].as_data().and_then(|v| v.as_i64()).unwrap_or(0);
//!             let b = args[1].as_data().and_then(|v| v.as_i64()).unwrap_or(0);
//!             Ok(BridgeValue::data(a + b))
//!         }),
//!     )]),
//!     Arc::new(server_side),
//! );
//!
//! let remote = wrap(Arc::new(client_side));
//! let sum = remote.prop("add").call(vec![
//!     BridgeValue::data(2),
//!     BridgeValue::data(3),
//! ]).await?;
//! assert_eq!(sum.as_data().and_then(|v| v.as_i64()), Some(5));
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod codec;
pub mod dispatch;
pub mod error;
pub mod ident;
pub mod message;
mod pending;
pub mod proxy;
pub mod transport;
pub mod validate;
pub mod value;

pub use channel::{create_channel, SubChannel};
pub use dispatch::expose;
pub use error::{BridgeError, TransportError};
pub use message::{EncodedValue, Id, Reply, Request};
pub use proxy::{wrap, ObjectProxy};
pub use transport::{
    endpoint_pair, InProcessEndpoint, MessageEndpoint, MessageSubscription, SharedEndpoint,
    TcpEndpoint, TcpEndpointListener,
};
pub use value::BridgeValue;

/// The current version of the bridge crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
