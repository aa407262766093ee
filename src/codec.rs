//! Wire codec: classify, wrap, inline.
//!
//! Encoding decides how a host value crosses the bridge. Data goes inline
//! and is copied by the transport; anything callable (or explicitly marked)
//! is exposed on a freshly allocated sub-channel of the same endpoint and
//! crosses as a reference. Decoding is the mirror image: inline data comes
//! back as data, references come back as sub-proxies speaking the full
//! protocol over their sub-channel.

use std::sync::Arc;

use tracing::debug;

use crate::channel::create_channel;
use crate::dispatch::expose;
use crate::error::BridgeError;
use crate::ident;
use crate::message::EncodedValue;
use crate::proxy::wrap;
use crate::transport::SharedEndpoint;
use crate::value::BridgeValue;

/// Encode one value for transfer on `endpoint`.
pub fn encode(endpoint: &SharedEndpoint, value: BridgeValue) -> Result<EncodedValue, BridgeError> {
    if value.crosses_by_reference() {
        encode_wrapped(endpoint, value)
    } else {
        Ok(EncodedValue::Inline {
            data: value.into_inline()?,
        })
    }
}

/// Expose `value` on a new sub-channel and encode the reference.
///
/// Used directly by the dispatcher for constructor results, which cross by
/// reference even when they hold no callables.
pub fn encode_wrapped(
    endpoint: &SharedEndpoint,
    value: BridgeValue,
) -> Result<EncodedValue, BridgeError> {
    let id = ident::next_id();
    debug!("exposing wrapped value on sub-channel {id}");
    let sub: SharedEndpoint = Arc::new(create_channel(endpoint.clone(), id.clone()));
    expose(value.into_unmarked(), sub);
    Ok(EncodedValue::Wrapped { id })
}

/// Encode an argument list element-wise.
pub fn encode_args(
    endpoint: &SharedEndpoint,
    args: Vec<BridgeValue>,
) -> Result<Vec<EncodedValue>, BridgeError> {
    args.into_iter()
        .map(|value| encode(endpoint, value))
        .collect()
}

/// Decode one received value on `endpoint`.
pub fn decode(endpoint: &SharedEndpoint, encoded: EncodedValue) -> BridgeValue {
    match encoded {
        EncodedValue::Inline { data } => BridgeValue::Data(data),
        EncodedValue::Wrapped { id } => {
            let sub: SharedEndpoint = Arc::new(create_channel(endpoint.clone(), id));
            BridgeValue::Remote(wrap(sub))
        }
    }
}

/// Decode an argument list element-wise.
pub fn decode_args(endpoint: &SharedEndpoint, args: Vec<EncodedValue>) -> Vec<BridgeValue> {
    args.into_iter()
        .map(|encoded| decode(endpoint, encoded))
        .collect()
}
