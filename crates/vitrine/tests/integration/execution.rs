use serde_json::json;
use vitrine::ExecutionError;

use super::{engine, request};

#[tokio::test]
async fn success_scenario_doubles_input() {
    let engine = engine();
    let request = request("success-1", "return inputs.a * 2;").with_input("a", 3);

    let result = engine.execute(request).await;

    assert_eq!(result.id, "success-1");
    assert_eq!(result.outcome.unwrap(), json!(6));
}

#[tokio::test]
async fn script_can_return_structured_data() {
    let engine = engine();
    let request = request(
        "structured-1",
        "return { sum: inputs.a + inputs.b, items: [inputs.a, inputs.b] };",
    )
    .with_input("a", 1)
    .with_input("b", 2);

    let result = engine.execute(request).await;
    assert_eq!(
        result.outcome.unwrap(),
        json!({"sum": 3.0, "items": [1.0, 2.0]})
    );
}

#[tokio::test]
async fn script_without_return_yields_null() {
    let engine = engine();
    let result = engine.execute(request("no-return-1", "let x = 1 + 1;")).await;
    assert_eq!(result.outcome.unwrap(), json!(null));
}

#[tokio::test]
async fn compile_error_scenario_never_runs_body() {
    let engine = engine();
    // Unbalanced braces: must fail at compilation, so the throw can never run.
    let result = engine
        .execute(request("compile-1", "throw new Error('ran anyway'); if (true) {"))
        .await;

    match result.outcome {
        Err(ExecutionError::Compile(message)) => {
            assert!(!message.contains("ran anyway"));
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[tokio::test]
async fn runtime_error_scenario_carries_thrown_message() {
    let engine = engine();
    let result = engine
        .execute(request("runtime-1", "throw new Error('boom');"))
        .await;

    match result.outcome {
        Err(ExecutionError::Runtime(message)) => assert!(message.contains("boom")),
        other => panic!("expected runtime error, got {other:?}"),
    }

    // The session is fully disposed afterwards.
    assert_eq!(engine.live_guest_instances(), 0);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn function_result_is_a_runtime_error() {
    let engine = engine();
    let result = engine
        .execute(request("undumpable-1", "return function() { return 1; };"))
        .await;
    assert!(matches!(result.outcome, Err(ExecutionError::Runtime(_))));
}

#[tokio::test]
async fn duplicate_in_flight_id_is_rejected() {
    let engine = std::sync::Arc::new(super::engine_with_budget(2000));
    engine.ready().await.unwrap();

    // Park one request in a long loop, then reuse its id while in flight.
    let blocker = {
        let engine = std::sync::Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .execute(request("dup-1", "while (true) {}"))
                .await
        })
    };

    // Wait until the first request is registered.
    while engine.in_flight() == 0 {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let second = engine.execute(request("dup-1", "return 1;")).await;
    match second.outcome {
        Err(ExecutionError::Sandbox(message)) => assert!(message.contains("already in flight")),
        other => panic!("expected sandbox error, got {other:?}"),
    }

    engine.cancel("dup-1");
    let first = blocker.await.unwrap();
    assert!(!first.is_success());
}
