// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection management properties against in-process endpoints.

mod common;

use common::eventually;
use hdds_remote::{
    ClientContext, ConnectionDescriptor, ConnectionState, ConnectivityKind, InvocationTarget, InvokeError,
    MemTransport, ReconnectPolicy, TargetSelector,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const B: &str = "server-two:8080";
const C: &str = "server-three:8080";

fn transport() -> MemTransport {
    let transport = MemTransport::new();
    for (authority, prefix) in [(B, "ECHO:"), (C, "THREE:")] {
        transport.register(authority, move |_: &InvocationTarget, payload: &[u8]| {
            if payload == b"fail" {
                return Err("component raised an error".to_string());
            }
            let mut reply = prefix.as_bytes().to_vec();
            reply.extend_from_slice(payload);
            Ok(reply)
        });
    }
    transport
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        enabled: true,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(100),
        scan_interval: Duration::from_millis(10),
    }
}

fn context(policy: ReconnectPolicy) -> ClientContext<MemTransport> {
    let context = ClientContext::new("server-one", transport(), policy);
    for (name, module) in [("server-two", "server-two-module"), ("server-three", "server-three-module")] {
        context
            .add_destination(
                ConnectionDescriptor::new(name, name, 8080)
                    .with_connect_timeout(Duration::from_millis(300))
                    .with_invoke_timeout(Duration::from_millis(300)),
            )
            .expect("destination");
        context
            .add_receiver(name, vec![TargetSelector::module(module)])
            .expect("receiver");
    }
    context
}

fn two() -> InvocationTarget {
    InvocationTarget::new("server-two-module", "EchoOnServerTwo", "RemoteEcho")
}

fn three() -> InvocationTarget {
    InvocationTarget::new("server-three-module", "Echo", "RemoteEcho")
}

#[tokio::test]
async fn test_lazy_success_after_late_start() {
    let context = context(ReconnectPolicy::disabled());
    let dest = context.destination("server-two").expect("destination");
    assert_eq!(dest.state(), ConnectionState::Disconnected);

    assert!(context.invoke(&two(), b"Hellooooo!").await.is_err());

    context.transport().start(B);
    let reply = context.invoke(&two(), b"Hellooooo!").await.expect("invoke");
    assert_eq!(reply, b"ECHO:Hellooooo!");
    assert_eq!(dest.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_fail_fast_while_down() {
    let context = context(ReconnectPolicy::disabled());

    let start = Instant::now();
    let err = context.invoke(&two(), b"x").await.expect_err("down");
    assert!(start.elapsed() < Duration::from_millis(300));
    assert!(err.is_connectivity());
    assert!(!err.is_no_receiver());

    // Endpoint that accepts but never finishes the handshake.
    context.transport().start(B);
    context.transport().set_open_delay(B, Duration::from_secs(10));

    let start = Instant::now();
    let err = context.invoke(&two(), b"x").await.expect_err("hangs");
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_reconnect_after_drop() {
    let context = context(fast_policy());
    let transport = Arc::clone(context.transport());
    transport.start(B);

    assert_eq!(context.invoke(&two(), b"a").await.expect("invoke"), b"ECHO:a");

    transport.stop(B);
    let dest = context.destination("server-two").expect("destination");
    assert!(eventually(Duration::from_secs(1), || !dest.is_usable()).await);

    let err = context.invoke(&two(), b"b").await.expect_err("down");
    assert!(err.is_connectivity());

    transport.start(B);
    assert!(eventually(Duration::from_secs(2), || dest.is_usable()).await);
    assert_eq!(context.invoke(&two(), b"c").await.expect("invoke"), b"ECHO:c");
}

#[tokio::test]
async fn test_independent_targets_isolated() {
    let context = context(fast_policy());
    context.transport().start(C);

    for _ in 0..5 {
        assert!(context.invoke(&two(), b"x").await.is_err());
        assert_eq!(context.invoke(&three(), b"x").await.expect("invoke"), b"THREE:x");
    }

    let snapshots = context.destinations();
    assert_eq!(snapshots[0].name, "server-three");
    assert_eq!(snapshots[0].state, ConnectionState::Connected);
    assert_eq!(snapshots[1].name, "server-two");
    assert!(snapshots[1].failures > 0);
}

#[tokio::test]
async fn test_connect_coalescing() {
    let context = Arc::new(context(ReconnectPolicy::disabled()));
    context.transport().start(B);
    context.transport().set_open_delay(B, Duration::from_millis(50));

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let context = Arc::clone(&context);
        tasks.spawn(async move {
            let payload = i.to_string();
            context.invoke(&two(), payload.as_bytes()).await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.expect("join").expect("invoke");
    }

    assert_eq!(context.transport().open_count(B), 1);
    let dest = context.destination("server-two").expect("destination");
    assert_eq!(dest.state(), ConnectionState::Connected);
    assert_eq!(dest.stats().snapshot().invocations, 16);
}

#[tokio::test]
async fn test_remote_error_passthrough() {
    let context = context(ReconnectPolicy::disabled());
    context.transport().start(B);

    let err = context.invoke(&two(), b"fail").await.expect_err("remote");
    match err {
        InvokeError::Remote(remote) => assert_eq!(remote.message, "component raised an error"),
        other => panic!("expected remote error, got {other:?}"),
    }

    let dest = context.destination("server-two").expect("destination");
    assert_eq!(dest.state(), ConnectionState::Connected);
    assert_eq!(dest.failures(), 0);
    assert_eq!(context.invoke(&two(), b"ok").await.expect("invoke"), b"ECHO:ok");
}

#[tokio::test]
async fn test_no_receiver_is_not_connectivity() {
    let context = context(fast_policy());
    let unknown = InvocationTarget::new("elsewhere", "Bean", "Iface");

    let err = context.invoke(&unknown, b"x").await.expect_err("no receiver");
    assert!(err.is_no_receiver());
    assert!(!err.is_connectivity());
}

#[tokio::test]
async fn test_mid_call_loss_is_not_retried() {
    let context = Arc::new(context(ReconnectPolicy::disabled()));
    let transport = Arc::clone(context.transport());
    transport.start(B);
    transport.start(C);
    context
        .add_receiver("server-three", vec![TargetSelector::module("server-two-module")])
        .expect("fallback receiver");

    assert_eq!(context.invoke(&two(), b"x").await.expect("invoke"), b"ECHO:x");

    transport.set_reply_delay(B, Duration::from_millis(100));
    let caller = Arc::clone(&context);
    let pending = tokio::spawn(async move { caller.invoke(&two(), b"y").await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    transport.drop_connections(B);

    let err = pending.await.expect("join").expect_err("dropped mid-call");
    match &err {
        InvokeError::Connectivity(failure) => {
            assert_eq!(failure.attempts.len(), 1);
            assert_eq!(failure.attempts[0].destination, "server-two");
            assert_eq!(failure.attempts[0].kind, ConnectivityKind::Closed);
        }
        other => panic!("expected connectivity failure, got {other:?}"),
    }
    let fallback = context.destination("server-three").expect("destination");
    assert_eq!(fallback.stats().snapshot().invocations, 0);
}

#[tokio::test]
async fn test_supervisor_backs_off() {
    let policy = ReconnectPolicy {
        enabled: true,
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        scan_interval: Duration::from_millis(5),
    };
    let context = context(policy);

    tokio::time::sleep(Duration::from_millis(350)).await;
    // Attempts at ~0, ~100, ~300 ms rather than one per scan.
    let attempts = context.transport().open_count(B);
    assert!((2..=5).contains(&attempts), "attempts: {attempts}");
}

#[tokio::test]
async fn test_unloaded_destination_is_forgotten() {
    let context = context(fast_policy());
    context.transport().start(B);
    assert!(context.invoke(&two(), b"x").await.is_ok());

    assert_eq!(context.unload_destination("server-two").expect("unload"), 1);
    let err = context.invoke(&two(), b"x").await.expect_err("unloaded");
    assert!(err.is_no_receiver());

    let opens = context.transport().open_count(B);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(context.transport().open_count(B), opens);
}
