//! Execution session
//!
//! One session runs one request from source text to terminal outcome on a
//! dedicated worker thread. The phases are strictly linear — created,
//! compiling, running, disposed — and never branch back; disposal of the
//! guest runtime happens by scope on every exit path, including unwinds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize};

use indexmap::IndexMap;
use tracing::{debug, instrument};

use crate::guest::{GuestError, GuestInstance};
use crate::types::{ExecutionError, HostValue, OutputValue};

/// Resolved resource limits for one session.
#[derive(Debug, Clone)]
pub(crate) struct SessionLimits {
    /// Guest heap ceiling in bytes.
    pub memory_limit: usize,

    /// Maximum nesting depth when dumping the result.
    pub max_result_depth: usize,
}

/// Run one execution session to its terminal outcome.
#[instrument(skip_all, fields(code_len = code.len()))]
pub(crate) fn run(
    code: &str,
    inputs: &IndexMap<String, HostValue>,
    limits: &SessionLimits,
    interrupt: Arc<AtomicBool>,
    live_instances: Arc<AtomicUsize>,
) -> Result<OutputValue, ExecutionError> {
    let instance = GuestInstance::create(limits.memory_limit, interrupt)
        .map_err(|e| ExecutionError::Sandbox(e.to_string()))?
        .with_counter(live_instances);

    debug!("compiling submitted code");
    let program = instance.compile(code).map_err(classify)?;

    debug!("invoking compiled program");
    let outcome = instance
        .call(&program, inputs, limits.max_result_depth)
        .map_err(classify);

    debug!(success = outcome.is_ok(), "session reached terminal state");
    outcome
    // instance (and with it the guest heap) drops here on every path
}

/// Map a guest-boundary error onto the caller-facing taxonomy.
///
/// Interruption is reported as a sandbox sentinel; the scheduler replaces
/// it with the true terminal outcome (timeout or cancellation), so the
/// text here is never caller-visible on those paths.
fn classify(error: GuestError) -> ExecutionError {
    match error {
        GuestError::Compile(message) => ExecutionError::Compile(message),
        GuestError::Thrown(message) | GuestError::Undumpable(message) => {
            ExecutionError::Runtime(message)
        }
        GuestError::Interrupted => ExecutionError::Sandbox("execution interrupted".to_string()),
        other => ExecutionError::Sandbox(other.to_string()),
    }
}
