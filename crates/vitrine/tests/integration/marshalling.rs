use serde_json::json;
use vitrine::HostValue;

use super::{engine, request};

#[tokio::test]
async fn input_narrowing_is_visible_from_the_guest() {
    let engine = engine();
    // {a: 5, b: "hello", c: true} must reach the guest as {a: 5, b: 5, c: 0}.
    let request = request("narrow-1", "return [inputs.a, inputs.b, inputs.c];")
        .with_input("a", 5)
        .with_input("b", "hello")
        .with_input("c", true);

    let result = engine.execute(request).await;
    assert_eq!(result.outcome.unwrap(), json!([5.0, 5.0, 0.0]));
}

#[tokio::test]
async fn every_input_reaches_the_guest_as_a_number() {
    let engine = engine();
    let request = request(
        "narrow-2",
        "return [typeof inputs.a, typeof inputs.b, typeof inputs.c, typeof inputs.d];",
    )
    .with_input("a", 5)
    .with_input("b", "hello")
    .with_input("c", true)
    .with_input("d", HostValue::Other(json!({"nested": [1, 2]})));

    let result = engine.execute(request).await;
    assert_eq!(
        result.outcome.unwrap(),
        json!(["number", "number", "number", "number"])
    );
}

#[tokio::test]
async fn missing_inputs_are_undefined_in_the_guest() {
    let engine = engine();
    let result = engine
        .execute(request("narrow-3", "return typeof inputs.missing;"))
        .await;
    assert_eq!(result.outcome.unwrap(), json!("undefined"));
}

#[tokio::test]
async fn non_finite_results_dump_as_null() {
    let engine = engine();
    let result = engine
        .execute(request("narrow-4", "return [0 / 0, 1 / 0, -1 / 0];"))
        .await;
    assert_eq!(result.outcome.unwrap(), json!([null, null, null]));
}
