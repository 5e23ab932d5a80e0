//! Embedded guest runtime
//!
//! Wraps the QuickJS engine behind a minimal capability surface: compile
//! text to a callable, call it with marshalled values, dispose the heap.
//! The rest of the crate never touches the interpreter directly, so any
//! memory-isolated script engine satisfying this contract could be
//! substituted.

use thiserror::Error;

pub use crate::guest::instance::{CompiledProgram, GuestInstance};

pub mod marshal;

mod instance;

/// Errors raised at the guest boundary
#[derive(Debug, Error)]
pub enum GuestError {
    #[error("failed to initialize guest runtime: {0}")]
    Init(String),

    #[error("{0}")]
    Compile(String),

    #[error("{0}")]
    Thrown(String),

    #[error("failed to marshal inputs: {0}")]
    Marshal(String),

    #[error("result cannot be represented as a host value: {0}")]
    Undumpable(String),

    #[error("guest runtime fault: {0}")]
    Internal(String),

    #[error("execution interrupted")]
    Interrupted,
}
