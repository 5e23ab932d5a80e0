//! Integration tests for vitrine
//!
//! These tests drive the full engine: real guest runtimes, worker threads,
//! budgets and the wire protocol. The embedded interpreter ships with the
//! crate, so no external binaries are required.
//!
//! Run with: cargo test -p vitrine --test integration

use vitrine::{Engine, EngineConfig, ExecutionRequest};

mod execution;
mod isolation;
mod marshalling;
mod timeouts;

/// Engine with default configuration.
pub(crate) fn engine() -> Engine {
    Engine::with_defaults()
}

/// Engine with a short execution budget, for timeout scenarios.
pub(crate) fn engine_with_budget(timeout_ms: u64) -> Engine {
    let config = EngineConfig::parse_toml(&format!("timeout_ms = {timeout_ms}"))
        .expect("test config should parse");
    Engine::new(config)
}

/// Request with no inputs.
pub(crate) fn request(id: &str, code: &str) -> ExecutionRequest {
    ExecutionRequest::new(id, code)
}
