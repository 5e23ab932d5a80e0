//! A library for sandboxed script execution.
//!
//! Vitrine runs fragments of untrusted script text in embedded, disposable
//! QuickJS sandboxes. Each execution gets a fresh, memory-capped runtime on
//! its own worker thread with no access to the host environment, and a
//! wall-clock budget enforced by forced termination of the worker context.
//!
//! # Features
//!
//! - **Isolated execution** — one fresh guest heap per request, disposed on
//!   every exit path; nothing is shared between executions.
//! - **Bounded execution** — configurable wall-clock budget and guest memory
//!   ceiling; runaway code is terminated from outside the guest's control.
//! - **Non-blocking callers** — async dispatch; awaiting one result never
//!   blocks other in-flight requests.
//! - **Exact correlation** — exactly one response per request id, in
//!   whatever order executions complete.
//! - **TOML configuration** — engine defaults with per-request overrides.

pub use config::{ConfigError, EXAMPLE_CONFIG, EngineConfig};
pub use engine::Engine;
pub use guest::{CompiledProgram, GuestError, GuestInstance};
pub use protocol::{OutboundMessage, ReadyMessage, RequestMessage, ResponseMessage, serve};
pub use types::{
    ErrorKind, ExecutionError, ExecutionRequest, ExecutionResult, ExecutionSettings, HostValue,
    OutputValue,
};

pub mod config;
pub mod engine;
pub mod guest;
pub mod protocol;
pub mod types;
