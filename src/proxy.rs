//! Client-side proxy engine.
//!
//! [`wrap`] installs a session on an endpoint and hands back an
//! [`ObjectProxy`]: an opaque handle standing in for the value the peer
//! exposed. Growing a property chain is free and posts nothing; the
//! terminal operations — [`ObjectProxy::call`], [`ObjectProxy::construct`],
//! [`ObjectProxy::get`] — each allocate a request id, post one message, and
//! resolve when the matching reply arrives. Replies are matched strictly by
//! id, so out-of-order completion on the peer is fine.
//!
//! A proxy is nothing but a session plus an accumulated key chain, with the
//! three operations spelled out as methods. Awaiting a proxy directly
//! (`IntoFuture`) is shorthand for [`ObjectProxy::get`], so
//! `proxy.prop("a").await` resolves to the remote value at `a`.

use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::codec;
use crate::error::BridgeError;
use crate::ident;
use crate::message::{self, EncodedValue, Reply, Request};
use crate::pending::PendingTable;
use crate::transport::SharedEndpoint;
use crate::validate;
use crate::value::BridgeValue;

/// Per-`wrap` session state shared by every proxy node derived from it.
struct Session {
    endpoint: SharedEndpoint,
    pending: Arc<PendingTable>,
}

impl Session {
    /// Post a request and wait for its outcome.
    async fn request(&self, request: Request) -> Result<EncodedValue, BridgeError> {
        let id = request.id().clone();
        let rx = self.pending.register(id.clone());

        let raw = serde_json::to_value(&request)
            .map_err(|e| BridgeError::Protocol(format!("request does not serialise: {e}")))?;
        if let Err(e) = self.endpoint.post(raw).await {
            // A failed send is logged, not propagated: the request simply
            // stays pending, as it would on a silent transport.
            warn!("request {id} could not be posted: {e}");
        }

        match rx.await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(error)) => Err(BridgeError::Remote(error)),
            Err(_) => Err(BridgeError::ChannelClosed),
        }
    }
}

struct ProxyNode {
    session: Arc<Session>,
    chain: Vec<String>,
    children: Mutex<HashMap<String, ObjectProxy>>,
}

/// Handle standing in for a value exposed on the other side of an endpoint.
///
/// Cheap to clone; clones refer to the same node. Equality is node
/// identity, and repeated [`ObjectProxy::prop`] calls with the same key
/// return the identical handle.
#[derive(Clone)]
pub struct ObjectProxy {
    node: Arc<ProxyNode>,
}

/// Install a client session on `endpoint` and return the root proxy.
pub fn wrap(endpoint: SharedEndpoint) -> ObjectProxy {
    let pending = Arc::new(PendingTable::new());
    spawn_reply_listener(&endpoint, pending.clone());

    ObjectProxy {
        node: Arc::new(ProxyNode {
            session: Arc::new(Session { endpoint, pending }),
            chain: Vec::new(),
            children: Mutex::new(HashMap::new()),
        }),
    }
}

fn spawn_reply_listener(endpoint: &SharedEndpoint, pending: Arc<PendingTable>) {
    let mut sub = endpoint.subscribe();
    tokio::spawn(async move {
        while let Some(raw) = sub.recv().await {
            if message::is_channel_tagged(&raw) {
                // Sub-channel traffic belongs to another session.
                continue;
            }
            match validate::parse_reply(&raw) {
                Some(Reply::Response { id, data }) => pending.complete(&id, Ok(data)),
                Some(Reply::Error { id, error }) => pending.complete(&id, Err(error)),
                None => trace!("ignoring non-reply traffic on proxy session"),
            }
        }
        debug!("proxy session listener finished");
    });
}

impl ObjectProxy {
    /// The sub-proxy for property `key`.
    ///
    /// Posts nothing; chains only materialise into traffic at a terminal
    /// operation. The handle is cached, so the same key always yields the
    /// same proxy.
    pub fn prop(&self, key: impl Into<String>) -> ObjectProxy {
        let key = key.into();
        let mut children = self.node.children.lock();
        children
            .entry(key.clone())
            .or_insert_with(|| {
                let mut chain = self.node.chain.clone();
                chain.push(key);
                ObjectProxy {
                    node: Arc::new(ProxyNode {
                        session: self.node.session.clone(),
                        chain,
                        children: Mutex::new(HashMap::new()),
                    }),
                }
            })
            .clone()
    }

    /// The property path this proxy stands for, relative to the exposed
    /// root.
    pub fn path(&self) -> &[String] {
        &self.node.chain
    }

    /// Resolve the remote value at this chain.
    pub async fn get(&self) -> Result<BridgeValue, BridgeError> {
        let request = Request::Await {
            id: ident::next_id(),
            key_chain: self.node.chain.clone(),
        };
        self.round_trip(request).await
    }

    /// Invoke the remote function at this chain.
    pub async fn call(&self, args: Vec<BridgeValue>) -> Result<BridgeValue, BridgeError> {
        let endpoint = self.node.session.endpoint.clone();
        let request = Request::Call {
            id: ident::next_id(),
            key_chain: self.node.chain.clone(),
            args: codec::encode_args(&endpoint, args)?,
        };
        self.round_trip(request).await
    }

    /// Instantiate the remote constructor at this chain.
    ///
    /// The result is always a handle to the live instance, never a copy.
    pub async fn construct(&self, args: Vec<BridgeValue>) -> Result<BridgeValue, BridgeError> {
        let endpoint = self.node.session.endpoint.clone();
        let request = Request::Construct {
            id: ident::next_id(),
            key_chain: self.node.chain.clone(),
            args: codec::encode_args(&endpoint, args)?,
        };
        self.round_trip(request).await
    }

    async fn round_trip(&self, request: Request) -> Result<BridgeValue, BridgeError> {
        let data = self.node.session.request(request).await?;
        Ok(codec::decode(&self.node.session.endpoint, data))
    }
}

impl PartialEq for ObjectProxy {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for ObjectProxy {}

impl std::fmt::Debug for ObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectProxy")
            .field("chain", &self.node.chain)
            .finish()
    }
}

impl IntoFuture for ObjectProxy {
    type Output = Result<BridgeValue, BridgeError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    /// Awaiting a proxy resolves the remote value at its chain.
    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.get().await })
    }
}

impl IntoFuture for &ObjectProxy {
    type Output = Result<BridgeValue, BridgeError>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        self.clone().into_future()
    }
}
