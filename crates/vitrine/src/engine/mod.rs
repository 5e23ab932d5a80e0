//! Isolation boundary and scheduler
//!
//! Dispatches each execution request onto a dedicated worker thread running
//! a fresh guest runtime, enforces the wall-clock budget by forcibly
//! terminating the worker context, and delivers exactly one result per
//! request. Nothing is shared between concurrent sessions; the in-flight
//! registry below is the engine's only shared mutable state.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore, oneshot, watch};
use tracing::{debug, instrument, warn};

use crate::config::EngineConfig;
use crate::engine::session::SessionLimits;
use crate::guest::GuestInstance;
use crate::types::{
    ExecutionError, ExecutionRequest, ExecutionResult, ExecutionSettings, OutputValue,
};

pub(crate) mod session;

/// Readiness of the engine's embedded runtime dependency.
#[derive(Debug, Clone)]
enum ReadyState {
    Starting,
    Ready,
    Failed(String),
}

/// Control handles for one in-flight session.
///
/// The interrupt flag is the forced-termination mechanism: once set, the
/// guest interpreter aborts at its next check and the worker thread
/// unwinds, reclaiming the entire runtime heap.
#[derive(Debug, Clone)]
struct SessionControl {
    interrupt: Arc<AtomicBool>,
    cancelled: Arc<Notify>,
}

impl SessionControl {
    fn new() -> Self {
        Self {
            interrupt: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(Notify::new()),
        }
    }

    fn terminate(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }
}

/// Removes an id from the in-flight registry on terminal outcome.
///
/// Also trips the session's interrupt: if the awaiting future is dropped
/// before completion, the worker must still be terminated. After a normal
/// completion the worker has already exited and the trip is a no-op.
struct InFlightGuard {
    registry: Arc<Mutex<HashMap<String, SessionControl>>>,
    id: String,
    control: SessionControl,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.control.terminate();
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(&self.id);
        }
    }
}

/// Sandboxed script execution engine
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Each request
/// runs on its own worker thread with its own guest runtime, so an
/// unbounded loop in one request can never block the caller or any other
/// request.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    workers: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashMap<String, SessionControl>>>,
    live_instances: Arc<AtomicUsize>,
    ready: watch::Receiver<ReadyState>,
}

impl Engine {
    /// Create an engine and start its readiness probe.
    ///
    /// The probe constructs, exercises and disposes one guest runtime on a
    /// background thread; submissions wait for it before dispatching.
    pub fn new(config: EngineConfig) -> Self {
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Starting);

        let spawned = std::thread::Builder::new()
            .name("vitrine-probe".to_string())
            .spawn(move || {
                let state = match GuestInstance::probe() {
                    Ok(()) => ReadyState::Ready,
                    Err(e) => ReadyState::Failed(e.to_string()),
                };
                let _ = ready_tx.send(state);
            });
        if let Err(e) = spawned {
            // The dropped sender closes the channel; ready() reports this.
            warn!(error = %e, "failed to spawn readiness probe");
        }

        Self {
            workers: Arc::new(Semaphore::new(config.max_workers)),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            live_instances: Arc::new(AtomicUsize::new(0)),
            ready: ready_rx,
            config,
        }
    }

    /// Create an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wait until the embedded runtime dependency has initialised.
    pub async fn ready(&self) -> Result<(), ExecutionError> {
        let mut ready = self.ready.clone();
        loop {
            let state = ready.borrow_and_update().clone();
            match state {
                ReadyState::Ready => return Ok(()),
                ReadyState::Failed(message) => {
                    return Err(ExecutionError::Sandbox(format!(
                        "guest runtime unavailable: {message}"
                    )));
                }
                ReadyState::Starting => {
                    if ready.changed().await.is_err() {
                        return Err(ExecutionError::Sandbox(
                            "readiness probe vanished before reporting".to_string(),
                        ));
                    }
                }
            }
        }
    }

    /// Execute a request with engine-default settings.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.execute_with(request, None).await
    }

    /// Execute a request, optionally overriding the engine defaults.
    ///
    /// Always produces exactly one result carrying the request's id; every
    /// failure mode is folded into the outcome, so this never panics the
    /// caller and never goes unanswered.
    #[instrument(skip_all, fields(id = %request.id))]
    pub async fn execute_with(
        &self,
        request: ExecutionRequest,
        settings: Option<&ExecutionSettings>,
    ) -> ExecutionResult {
        let id = request.id.clone();
        let outcome = self.dispatch(request, settings).await;
        if let Err(ref error) = outcome {
            debug!(%error, "execution failed");
        }
        ExecutionResult { id, outcome }
    }

    async fn dispatch(
        &self,
        request: ExecutionRequest,
        settings: Option<&ExecutionSettings>,
    ) -> Result<OutputValue, ExecutionError> {
        self.ready().await?;

        let effective = self.config.effective_settings(settings);
        let timeout_ms = effective.timeout_ms.unwrap_or(self.config.timeout_ms);
        let limits = SessionLimits {
            memory_limit: effective.memory_limit.unwrap_or(self.config.memory_limit),
            max_result_depth: self.config.max_result_depth,
        };

        // Insert-on-dispatch: the id is registered before any work starts,
        // so a response can never be produced for an unregistered id.
        let control = SessionControl::new();
        {
            let mut registry = self.in_flight.lock().expect("in-flight registry poisoned");
            match registry.entry(request.id.clone()) {
                Entry::Occupied(_) => {
                    return Err(ExecutionError::Sandbox(format!(
                        "request id '{}' is already in flight",
                        request.id
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(control.clone());
                }
            }
        }
        // Remove-on-terminal-outcome, on every path out of this function.
        let _guard = InFlightGuard {
            registry: Arc::clone(&self.in_flight),
            id: request.id.clone(),
            control: control.clone(),
        };

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| ExecutionError::Sandbox("worker pool closed".to_string()))?;

        let (result_tx, mut result_rx) = oneshot::channel();
        let interrupt = Arc::clone(&control.interrupt);
        let live_instances = Arc::clone(&self.live_instances);
        let worker_name = format!("vitrine-worker-{}", request.id);
        let ExecutionRequest { code, inputs, .. } = request;

        std::thread::Builder::new()
            .name(worker_name)
            .spawn(move || {
                // The permit is held until the worker thread actually
                // unwinds, so abandoned contexts cannot pile up past the
                // configured concurrency.
                let _permit = permit;
                let outcome = session::run(&code, &inputs, &limits, interrupt, live_instances);
                let _ = result_tx.send(outcome);
            })
            .map_err(|e| ExecutionError::Sandbox(format!("failed to spawn worker: {e}")))?;

        let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
        tokio::pin!(deadline);

        tokio::select! {
            biased;

            _ = control.cancelled.notified() => {
                control.terminate();
                debug!("session cancelled by caller");
                Err(ExecutionError::Sandbox("cancelled".to_string()))
            }

            outcome = &mut result_rx => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(ExecutionError::Sandbox(
                    "worker terminated without reporting an outcome".to_string(),
                )),
            },

            _ = &mut deadline => {
                control.terminate();
                warn!(timeout_ms, "execution budget exhausted, terminating worker context");
                Err(ExecutionError::Timeout(timeout_ms))
            }
        }
    }

    /// Request cancellation of an in-flight execution.
    ///
    /// Returns true if the id was in flight. Cancellation uses the same
    /// forced-termination mechanism as a timeout but yields a distinct
    /// sandbox outcome.
    pub fn cancel(&self, id: &str) -> bool {
        let registry = self.in_flight.lock().expect("in-flight registry poisoned");
        match registry.get(id) {
            Some(control) => {
                control.terminate();
                control.cancelled.notify_one();
                true
            }
            None => false,
        }
    }

    /// Number of requests currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .expect("in-flight registry poisoned")
            .len()
    }

    /// Number of idle worker slots.
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Number of live guest runtime instances.
    ///
    /// Equals the number of sessions currently holding a heap; returns to
    /// zero once every session has disposed its runtime.
    pub fn live_guest_instances(&self) -> usize {
        self.live_instances.load(Ordering::SeqCst)
    }
}
