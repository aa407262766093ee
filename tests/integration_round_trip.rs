//! End-to-end protocol tests over an in-process endpoint pair, covering the
//! observable wire traffic as well as the resolved values.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use object_bridge::{endpoint_pair, expose, wrap, BridgeError, BridgeValue, MessageEndpoint};
use serde_json::{json, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn math_root() -> BridgeValue {
    BridgeValue::object([(
        "add",
        BridgeValue::function(|args| async move {
            let term = |n: usize| {
                args.get(n)
                    .and_then(|v| v.as_data())
                    .and_then(Value::as_i64)
                    .ok_or_else(|| BridgeError::user("add takes two integers"))
            };
            Ok(BridgeValue::data(term(0)? + term(1)?))
        }),
    )])
}

/// Scenario: a primitive call resolves to its inline result, with the exact
/// request and response shapes on the wire.
#[tokio::test]
async fn primitive_call_round_trip() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    let mut outbound = b.subscribe();
    let mut inbound = a.subscribe();
    expose(math_root(), Arc::new(b));
    let remote = wrap(Arc::new(a));

    let result = remote
        .prop("add")
        .call(vec![BridgeValue::data(2), BridgeValue::data(3)])
        .await?;
    assert_eq!(result.as_data(), Some(&json!(5)));

    let request = outbound.recv().await.unwrap();
    assert_eq!(request["type"], json!("call"));
    assert_eq!(request["keyChain"], json!(["add"]));
    assert_eq!(
        request["args"],
        json!([{"type": "any", "data": 2}, {"type": "any", "data": 3}])
    );

    let reply = inbound.recv().await.unwrap();
    assert_eq!(reply["type"], json!("response"));
    assert_eq!(reply["data"], json!({"type": "any", "data": 5}));
    assert_eq!(reply["id"], request["id"]);
    Ok(())
}

/// Scenario: awaiting a deep property chain issues one `await` request and
/// resolves to the nested value.
#[tokio::test]
async fn deep_property_await() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    let mut outbound = b.subscribe();
    expose(
        BridgeValue::object([("a", BridgeValue::data(json!({"b": {"c": 7}})))]),
        Arc::new(b),
    );
    let remote = wrap(Arc::new(a));

    let value = remote.prop("a").prop("b").prop("c").await?;
    assert_eq!(value.as_data(), Some(&json!(7)));

    let request = outbound.recv().await.unwrap();
    assert_eq!(request["type"], json!("await"));
    assert_eq!(request["keyChain"], json!(["a", "b", "c"]));
    Ok(())
}

/// Scenario: a function argument crosses as a reference, the exposed side
/// calls it back over a sub-channel, and the final result is inline.
#[tokio::test]
async fn callback_argument_round_trips_over_a_sub_channel() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    let mut outbound = b.subscribe();
    let mut inbound = a.subscribe();
    expose(
        BridgeValue::object([(
            "apply",
            BridgeValue::function(|mut args| async move {
                if args.len() != 2 {
                    return Err(BridgeError::user("apply takes an array and a callable"));
                }
                let callback = args.pop().unwrap();
                let items = args
                    .pop()
                    .unwrap()
                    .as_data()
                    .and_then(Value::as_array)
                    .cloned()
                    .ok_or_else(|| BridgeError::user("first argument must be an array"))?;
                let BridgeValue::Remote(callback) = callback else {
                    return Err(BridgeError::user("second argument must be callable"));
                };

                let mut mapped = Vec::with_capacity(items.len());
                for item in items {
                    let result = callback.call(vec![BridgeValue::data(item)]).await?;
                    mapped.push(result.as_data().cloned().unwrap_or(Value::Null));
                }
                Ok(BridgeValue::data(Value::Array(mapped)))
            }),
        )]),
        Arc::new(b),
    );
    let remote = wrap(Arc::new(a));

    let invocations = Arc::new(AtomicUsize::new(0));
    let double = {
        let invocations = invocations.clone();
        BridgeValue::function(move |args| {
            let invocations = invocations.clone();
            async move {
                invocations.fetch_add(1, Ordering::SeqCst);
                let x = args[0].as_data().and_then(Value::as_i64).unwrap_or(0);
                Ok(BridgeValue::data(x * 2))
            }
        })
    };

    let result = remote
        .prop("apply")
        .call(vec![BridgeValue::data(json!([1, 2, 3])), double])
        .await?;
    assert_eq!(result.as_data(), Some(&json!([2, 4, 6])));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);

    // The callable argument went out as a reference...
    let request = outbound.recv().await.unwrap();
    assert_eq!(request["args"][0]["type"], json!("any"));
    assert_eq!(request["args"][1]["type"], json!("wraped"));
    let callback_channel = request["args"][1]["id"].clone();

    // ...and the exposed side reached it through that sub-channel, once per
    // element, before replying inline.
    let mut callback_calls = 0;
    let mut final_reply = None;
    while let Some(message) = inbound.try_recv() {
        if message["channel"] == callback_channel {
            callback_calls += 1;
        } else if message["type"] == json!("response") {
            final_reply = Some(message);
        }
    }
    assert_eq!(callback_calls, 3);
    let final_reply = final_reply.expect("no final response observed");
    assert_eq!(
        final_reply["data"],
        json!({"type": "any", "data": [2, 4, 6]})
    );
    Ok(())
}

/// Scenario: constructing returns a handle to the live instance, and method
/// calls on the handle reach that instance's state.
#[tokio::test]
async fn constructed_instances_stay_live_on_the_exposing_side() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    let mut inbound = a.subscribe();
    expose(
        BridgeValue::object([(
            "Counter",
            BridgeValue::constructor(|args| async move {
                let start = args
                    .first()
                    .and_then(|v| v.as_data())
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                let count = Arc::new(AtomicI64::new(start));
                Ok(BridgeValue::object([(
                    "inc",
                    BridgeValue::function(move |_| {
                        let count = count.clone();
                        async move {
                            Ok(BridgeValue::data(count.fetch_add(1, Ordering::SeqCst) + 1))
                        }
                    }),
                )]))
            }),
        )]),
        Arc::new(b),
    );
    let remote = wrap(Arc::new(a));

    let instance = remote
        .prop("Counter")
        .construct(vec![BridgeValue::data(10)])
        .await?;
    let BridgeValue::Remote(counter) = instance else {
        panic!("constructor results must cross by reference");
    };

    // The first reply on the bare stream is the construct response, and it
    // is a reference even though the instance held no data the transport
    // could not have copied.
    let reply = inbound.recv().await.unwrap();
    assert_eq!(reply["type"], json!("response"));
    assert_eq!(reply["data"]["type"], json!("wraped"));

    assert_eq!(
        counter.prop("inc").call(Vec::new()).await?.as_data(),
        Some(&json!(11))
    );
    assert_eq!(
        counter.prop("inc").call(Vec::new()).await?.as_data(),
        Some(&json!(12))
    );
    Ok(())
}

/// Scenario: a throwing exposed function rejects the caller with exactly the
/// thrown message.
#[tokio::test]
async fn user_failures_propagate_as_rejections() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    let mut inbound = a.subscribe();
    expose(
        BridgeValue::object([(
            "boom",
            BridgeValue::function(|_| async { Err::<BridgeValue, _>(BridgeError::user("bad")) }),
        )]),
        Arc::new(b),
    );
    let remote = wrap(Arc::new(a));

    let err = remote.prop("boom").call(Vec::new()).await.unwrap_err();
    assert!(matches!(err, BridgeError::Remote(_)));
    assert_eq!(err.to_string(), "bad");

    let reply = inbound.recv().await.unwrap();
    assert_eq!(reply["type"], json!("error"));
    assert_eq!(reply["error"], json!("bad"));
    Ok(())
}

/// Scenario: a chain touching reserved names is refused before the walk, and
/// nothing on the exposed side runs.
#[tokio::test]
async fn unsafe_chains_are_refused_without_side_effects() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    let mut inbound = a.subscribe();

    let touched = Arc::new(AtomicUsize::new(0));
    let root = {
        let touched = touched.clone();
        BridgeValue::object([(
            "touch",
            BridgeValue::function(move |_| {
                let touched = touched.clone();
                async move {
                    touched.fetch_add(1, Ordering::SeqCst);
                    Ok(BridgeValue::data(Value::Null))
                }
            }),
        )])
    };
    expose(root, Arc::new(b));

    a.post(json!({
        "id": 9,
        "type": "call",
        "keyChain": ["__proto__", "constructor"],
        "args": [],
    }))
    .await?;

    let reply = inbound.recv().await.unwrap();
    assert_eq!(reply["id"], json!(9));
    assert_eq!(reply["type"], json!("error"));
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .contains("unsafe property names"));
    assert_eq!(touched.load(Ordering::SeqCst), 0);
    Ok(())
}

/// Requests complete out of order on the exposing side; each caller still
/// gets its own result because replies are matched by id.
#[tokio::test]
async fn out_of_order_completion_resolves_by_id() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    expose(
        BridgeValue::object([
            (
                "slow",
                BridgeValue::function(|_| async {
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    Ok(BridgeValue::data("slow"))
                }),
            ),
            (
                "fast",
                BridgeValue::function(|_| async { Ok(BridgeValue::data("fast")) }),
            ),
        ]),
        Arc::new(b),
    );
    let remote = wrap(Arc::new(a));

    let slow_node = remote.prop("slow");
    let fast_node = remote.prop("fast");
    let (slow, fast) = tokio::join!(slow_node.call(Vec::new()), fast_node.call(Vec::new()));

    assert_eq!(slow?.as_data(), Some(&json!("slow")));
    assert_eq!(fast?.as_data(), Some(&json!("fast")));
    Ok(())
}

/// Missing properties, non-callable call targets and non-constructible
/// construct targets all come back as addressed error replies.
#[tokio::test]
async fn dispatch_failures_reject_the_caller() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    expose(
        BridgeValue::object([("n", BridgeValue::data(1))]),
        Arc::new(b),
    );
    let remote = wrap(Arc::new(a));

    let err = remote.prop("nope").get().await.unwrap_err();
    assert!(err.to_string().contains("missing property"));

    let err = remote.prop("n").call(Vec::new()).await.unwrap_err();
    assert!(err.to_string().contains("is not a function"));

    let err = remote.prop("n").construct(Vec::new()).await.unwrap_err();
    assert!(err.to_string().contains("is not a constructor"));
    Ok(())
}

/// Awaiting the root chain resolves the exposed value itself.
#[tokio::test]
async fn awaiting_the_root_resolves_the_exposed_value() -> Result<()> {
    init_tracing();
    let (a, b) = endpoint_pair();
    expose(BridgeValue::data(json!({"answer": 42})), Arc::new(b));
    let remote = wrap(Arc::new(a));

    let value = remote.await?;
    assert_eq!(value.as_data(), Some(&json!({"answer": 42})));
    Ok(())
}
