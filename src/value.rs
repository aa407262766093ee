//! Host value model.
//!
//! The bridge moves values between realms, and a realm needs a way to say
//! "this is plain data" versus "this is something callable that must stay
//! home". [`BridgeValue`] is that distinction made explicit: data and
//! property maps can be copied inline, callables and remote handles always
//! cross by reference on a sub-channel.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::BridgeError;
use crate::proxy::ObjectProxy;

/// Future returned by a native callable.
pub type NativeResult = Pin<Box<dyn Future<Output = Result<BridgeValue, BridgeError>> + Send>>;

/// A callable exposed across the bridge.
pub type NativeFn = Arc<dyn Fn(Vec<BridgeValue>) -> NativeResult + Send + Sync>;

/// A value that can live on either side of the bridge.
#[derive(Clone)]
pub enum BridgeValue {
    /// Plain data, inlined over the transport.
    Data(Value),

    /// Named own properties; may contain callables.
    Object(HashMap<String, BridgeValue>),

    /// An async function.
    Function(NativeFn),

    /// A constructible factory. Instances are always wrapped so the caller
    /// holds a live object rather than a snapshot.
    Constructor(NativeFn),

    /// A handle to a value living on the peer, produced by decoding a
    /// by-reference encoding.
    Remote(ObjectProxy),

    /// Marker forcing the codec to wrap the inner value even when it would
    /// classify as inline data.
    ForceWrapped(Box<BridgeValue>),
}

impl BridgeValue {
    /// Plain data from anything JSON-shaped.
    pub fn data(value: impl Into<Value>) -> Self {
        BridgeValue::Data(value.into())
    }

    /// An async function from a closure.
    pub fn function<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<BridgeValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BridgeValue, BridgeError>> + Send + 'static,
    {
        BridgeValue::Function(Arc::new(move |args| Box::pin(f(args))))
    }

    /// A constructor from a closure returning the new instance.
    pub fn constructor<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<BridgeValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BridgeValue, BridgeError>> + Send + 'static,
    {
        BridgeValue::Constructor(Arc::new(move |args| Box::pin(f(args))))
    }

    /// A property map from `(name, value)` pairs.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, BridgeValue)>,
    {
        BridgeValue::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value))
                .collect(),
        )
    }

    /// Mark a value so the codec wraps it regardless of classification.
    pub fn force_wrapped(value: BridgeValue) -> Self {
        BridgeValue::ForceWrapped(Box::new(value))
    }

    /// Peel any force-wrap markers off the value.
    pub fn into_unmarked(self) -> Self {
        let mut value = self;
        while let BridgeValue::ForceWrapped(inner) = value {
            value = *inner;
        }
        value
    }

    /// Whether the codec must expose this value on a sub-channel instead of
    /// copying it.
    ///
    /// Callables and remote handles always cross by reference, as does any
    /// property map holding one of them at its top level. The probe is
    /// deliberately shallow; deeper callables surface as an encode error.
    pub fn crosses_by_reference(&self) -> bool {
        match self {
            BridgeValue::Function(_)
            | BridgeValue::Constructor(_)
            | BridgeValue::Remote(_)
            | BridgeValue::ForceWrapped(_) => true,
            BridgeValue::Object(map) => map.values().any(|v| {
                matches!(
                    v,
                    BridgeValue::Function(_)
                        | BridgeValue::Constructor(_)
                        | BridgeValue::Remote(_)
                        | BridgeValue::ForceWrapped(_)
                )
            }),
            BridgeValue::Data(_) => false,
        }
    }

    /// Deep-copy the value into plain JSON for inline transfer.
    pub fn into_inline(self) -> Result<Value, BridgeError> {
        match self {
            BridgeValue::Data(value) => Ok(value),
            BridgeValue::Object(map) => {
                let mut fields = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    fields.insert(key, value.into_inline()?);
                }
                Ok(Value::Object(fields))
            }
            BridgeValue::Function(_) | BridgeValue::Constructor(_) => Err(
                BridgeError::Uncopyable("a callable has no inline representation".to_string()),
            ),
            BridgeValue::Remote(proxy) => Err(BridgeError::Uncopyable(format!(
                "remote handle `{}` has no inline representation",
                proxy.path().join(".")
            ))),
            BridgeValue::ForceWrapped(_) => Err(BridgeError::Uncopyable(
                "value is marked to cross by reference".to_string(),
            )),
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            BridgeValue::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_remote(&self) -> Option<&ObjectProxy> {
        match self {
            BridgeValue::Remote(proxy) => Some(proxy),
            _ => None,
        }
    }
}

impl From<Value> for BridgeValue {
    fn from(value: Value) -> Self {
        BridgeValue::Data(value)
    }
}

impl fmt::Debug for BridgeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeValue::Data(value) => f.debug_tuple("Data").field(value).finish(),
            BridgeValue::Object(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                f.debug_tuple("Object").field(&keys).finish()
            }
            BridgeValue::Function(_) => f.write_str("Function"),
            BridgeValue::Constructor(_) => f.write_str("Constructor"),
            BridgeValue::Remote(proxy) => f.debug_tuple("Remote").field(&proxy.path()).finish(),
            BridgeValue::ForceWrapped(inner) => {
                f.debug_tuple("ForceWrapped").field(inner).finish()
            }
        }
    }
}
