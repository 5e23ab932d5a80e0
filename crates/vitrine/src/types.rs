use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A host-side input value handed to a script.
///
/// This is the value space callers may put into [`ExecutionRequest::inputs`].
/// What the guest actually sees is narrower; see [`crate::guest::marshal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostValue {
    /// A numeric value, passed to the guest unchanged.
    Number(f64),

    /// A string value, reduced to its character length at the boundary.
    Text(String),

    /// A boolean value, reduced to zero at the boundary.
    Bool(bool),

    /// Any other JSON-representable value, reduced to zero at the boundary.
    Other(serde_json::Value),
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Number(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Number(f64::from(value))
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Text(value.to_string())
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

/// The host-side value of a completed execution.
///
/// Whatever the script returns is dumped through the embedded runtime's
/// native conversion into plain data. Non-finite numbers dump as `null`.
pub type OutputValue = serde_json::Value;

/// A request to execute one fragment of untrusted script text.
///
/// Immutable once issued. The `id` correlates the eventual
/// [`ExecutionResult`] back to this request and must be unique among
/// in-flight requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Opaque correlation token.
    pub id: String,

    /// Guest-language source text, executed as the body of a function
    /// taking a single `inputs` parameter.
    pub code: String,

    /// Named input values, in insertion order.
    #[serde(default)]
    pub inputs: IndexMap<String, HostValue>,
}

impl ExecutionRequest {
    /// Create a request with no inputs.
    pub fn new(id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            inputs: IndexMap::new(),
        }
    }

    /// Add a named input value.
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }
}

/// Terminal outcome of one [`ExecutionRequest`].
///
/// Exactly one result is produced per request; a timeout is itself an
/// error outcome, never a missing one.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Matches the id of the originating request.
    pub id: String,

    /// The computed value, or a classified error.
    pub outcome: Result<OutputValue, ExecutionError>,
}

impl ExecutionResult {
    /// Check if the execution produced a value.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// A classified execution failure.
///
/// Carries a human-readable message only; raw guest exception objects and
/// heap handles never cross this boundary.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The submitted source failed to parse or compile.
    #[error("Code compilation error: {0}")]
    Compile(String),

    /// The script threw, or produced a result that cannot be dumped.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// An engine-level failure: runtime instantiation, marshalling, or an
    /// unexpected internal fault. Callers should treat this as an
    /// engine-health signal rather than a script defect.
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// The execution exceeded its wall-clock budget (in milliseconds).
    #[error("Execution timed out after {0}ms")]
    Timeout(u64),
}

impl ExecutionError {
    /// The formal error classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Compile(_) => ErrorKind::Compile,
            ExecutionError::Runtime(_) => ErrorKind::Runtime,
            ExecutionError::Sandbox(_) => ErrorKind::Sandbox,
            ExecutionError::Timeout(_) => ErrorKind::Timeout,
        }
    }
}

/// Error classification, independent of the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Compile,
    Runtime,
    Sandbox,
    Timeout,
}

/// Per-request overrides for the engine's execution defaults.
///
/// Unset fields fall back to the engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Wall-clock budget in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Guest heap ceiling in bytes.
    #[serde(default)]
    pub memory_limit: Option<usize>,
}

impl ExecutionSettings {
    /// Create settings with all fields unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wall-clock budget in milliseconds.
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Set the guest heap ceiling in bytes.
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Apply overrides from another ExecutionSettings, preferring values
    /// from `overrides` when both are present.
    pub fn with_overrides(&self, overrides: &ExecutionSettings) -> ExecutionSettings {
        ExecutionSettings {
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            memory_limit: overrides.memory_limit.or(self.memory_limit),
        }
    }
}
