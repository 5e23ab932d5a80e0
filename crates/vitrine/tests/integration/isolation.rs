use std::sync::Arc;

use serde_json::json;

use super::{engine, request};

#[tokio::test]
async fn no_state_survives_between_executions() {
    let engine = engine();

    let first = engine
        .execute(request("leak-1", "globalThis.secret = 42; return 1;"))
        .await;
    assert!(first.is_success());

    // A fresh runtime per request: the global set above must be gone.
    let second = engine
        .execute(request("leak-2", "return typeof globalThis.secret;"))
        .await;
    assert_eq!(second.outcome.unwrap(), json!("undefined"));
}

#[tokio::test]
async fn guest_has_no_host_capabilities() {
    let engine = engine();
    let result = engine
        .execute(request(
            "caps-1",
            "return [typeof require, typeof process, typeof fetch, typeof os];",
        ))
        .await;
    assert_eq!(
        result.outcome.unwrap(),
        json!(["undefined", "undefined", "undefined", "undefined"])
    );
}

#[tokio::test]
async fn concurrent_requests_correlate_exactly() {
    let engine = Arc::new(engine());
    engine.ready().await.unwrap();

    let mut executions = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        executions.push(tokio::spawn(async move {
            let id = format!("concurrent-{i}");
            let req = request(&id, "return inputs.a * 3;").with_input("a", i);
            engine.execute(req).await
        }));
    }

    for (i, execution) in executions.into_iter().enumerate() {
        let result = execution.await.unwrap();
        assert_eq!(result.id, format!("concurrent-{i}"));
        assert_eq!(result.outcome.unwrap(), json!(i as f64 * 3.0));
    }

    // N sessions ran, N heaps were created, and all N are gone.
    assert_eq!(engine.live_guest_instances(), 0);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn one_failing_request_does_not_affect_others() {
    let engine = Arc::new(engine());
    engine.ready().await.unwrap();

    let failing = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.execute(request("mixed-bad", "throw 'down';")).await })
    };
    let passing = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .execute(request("mixed-good", "return 'up';").with_input("a", 1))
                .await
        })
    };

    assert!(!failing.await.unwrap().is_success());
    assert_eq!(passing.await.unwrap().outcome.unwrap(), json!("up"));
}
