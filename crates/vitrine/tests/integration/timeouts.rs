use std::sync::Arc;
use std::time::{Duration, Instant};

use vitrine::ExecutionError;

use super::{engine_with_budget, request};

#[tokio::test]
async fn unbounded_loop_times_out_within_budget() {
    let engine = engine_with_budget(250);
    engine.ready().await.unwrap();

    let started = Instant::now();
    let result = engine.execute(request("loop-1", "while (true) {}")).await;
    let elapsed = started.elapsed();

    assert_eq!(result.outcome, Err(ExecutionError::Timeout(250)));
    // Budget plus scheduling overhead; never the full default budget.
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[tokio::test]
async fn timed_out_worker_context_is_reclaimed() {
    let engine = engine_with_budget(200);
    engine.ready().await.unwrap();

    let result = engine.execute(request("loop-2", "while (true) {}")).await;
    assert!(matches!(result.outcome, Err(ExecutionError::Timeout(_))));
    assert_eq!(engine.in_flight(), 0);

    // The abandoned worker unwinds at the next interpreter interrupt check;
    // give it a moment, then the heap must be gone.
    let deadline = Instant::now() + Duration::from_secs(2);
    while engine.live_guest_instances() != 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(engine.live_guest_instances(), 0);

    // The engine stays usable: the terminated context was replaced, not reused.
    let next = engine
        .execute(request("after-loop", "return 41 + 1;"))
        .await;
    assert_eq!(next.outcome.unwrap(), serde_json::json!(42));
}

#[tokio::test]
async fn per_request_budget_overrides_engine_default() {
    let engine = engine_with_budget(60_000);
    engine.ready().await.unwrap();

    let settings = vitrine::ExecutionSettings::new().with_timeout_ms(200);
    let started = Instant::now();
    let result = engine
        .execute_with(request("loop-3", "while (true) {}"), Some(&settings))
        .await;

    assert_eq!(result.outcome, Err(ExecutionError::Timeout(200)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn cancellation_yields_a_distinct_sandbox_outcome() {
    let engine = Arc::new(engine_with_budget(60_000));
    engine.ready().await.unwrap();

    let execution = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.execute(request("cancel-1", "while (true) {}")).await })
    };

    // Wait for the request to register, then abort it.
    while engine.in_flight() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(engine.cancel("cancel-1"));

    let result = execution.await.unwrap();
    match result.outcome {
        Err(ExecutionError::Sandbox(message)) => assert_eq!(message, "cancelled"),
        other => panic!("expected cancelled sandbox outcome, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_after_completion_reports_nothing_in_flight() {
    let engine = engine_with_budget(2000);
    engine.ready().await.unwrap();

    let result = engine.execute(request("cancel-2", "return 1;")).await;
    assert!(result.is_success());
    assert!(!engine.cancel("cancel-2"));
}
