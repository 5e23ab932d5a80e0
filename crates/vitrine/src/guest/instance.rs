//! Guest runtime instance lifecycle
//!
//! One [`GuestInstance`] wraps one QuickJS runtime/context pair for the
//! lifetime of exactly one execution session. Instances are never reused
//! or shared; the heap is reclaimed when the instance drops, on every
//! exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use indexmap::IndexMap;
use rquickjs::{CatchResultExt, CaughtError, Context, Function, Persistent, Runtime, Value};
use tracing::{debug, instrument};

use crate::guest::{GuestError, marshal};
use crate::types::{HostValue, OutputValue};

/// Heap ceiling for the readiness probe instance.
const PROBE_MEMORY_LIMIT: usize = 4 * 1024 * 1024;

/// A compiled program handle, valid only for the instance that produced it.
pub struct CompiledProgram {
    function: Persistent<Function<'static>>,
}

/// One embedded script runtime with its own heap.
///
/// The runtime has no host bindings of any kind: no file system, no
/// network, no host object graph. The only host-visible surface is the
/// inputs object passed at call time and the dumped return value.
pub struct GuestInstance {
    context: Context,
    interrupt: Arc<AtomicBool>,
    _runtime: Runtime,
    _count: Option<CountGuard>,
}

impl GuestInstance {
    /// Allocate a fresh runtime with the given heap ceiling.
    ///
    /// The interrupt flag is polled by the interpreter while guest code
    /// runs; setting it terminates execution from outside the guest's
    /// control.
    #[instrument(skip(interrupt))]
    pub fn create(memory_limit: usize, interrupt: Arc<AtomicBool>) -> Result<Self, GuestError> {
        let runtime = Runtime::new().map_err(|e| GuestError::Init(e.to_string()))?;
        runtime.set_memory_limit(memory_limit);

        let flag = Arc::clone(&interrupt);
        runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::Relaxed))));

        let context = Context::full(&runtime).map_err(|e| GuestError::Init(e.to_string()))?;
        debug!(memory_limit, "guest instance created");

        Ok(Self {
            context,
            interrupt,
            _runtime: runtime,
            _count: None,
        })
    }

    /// Attach a live-instance counter to this instance
    pub(crate) fn with_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self._count = Some(CountGuard::new(counter));
        self
    }

    /// Compile submitted code as the body of a one-parameter function.
    ///
    /// The wrapper takes a single `inputs` argument, so `return` and
    /// `inputs.<name>` work as expected inside the submitted text. The
    /// body is not executed here.
    #[instrument(skip_all)]
    pub fn compile(&self, code: &str) -> Result<CompiledProgram, GuestError> {
        let wrapped = format!("(function(inputs) {{\n{code}\n}})");
        self.context.with(|ctx| {
            let function = ctx
                .eval::<Function, _>(wrapped.into_bytes())
                .catch(&ctx)
                .map_err(|err| self.fault(err, GuestError::Compile))?;
            debug!("program compiled");
            Ok(CompiledProgram {
                function: Persistent::save(&ctx, function),
            })
        })
    }

    /// Invoke a compiled program with the marshalled inputs.
    #[instrument(skip_all)]
    pub fn call(
        &self,
        program: &CompiledProgram,
        inputs: &IndexMap<String, HostValue>,
        max_result_depth: usize,
    ) -> Result<OutputValue, GuestError> {
        self.context.with(|ctx| {
            let function = program
                .function
                .clone()
                .restore(&ctx)
                .map_err(|e| GuestError::Internal(e.to_string()))?;

            let inputs_object =
                marshal::build_inputs(&ctx, inputs).map_err(|e| GuestError::Marshal(e.to_string()))?;

            let result = function
                .call::<_, Value>((inputs_object,))
                .catch(&ctx)
                .map_err(|err| self.fault(err, GuestError::Thrown))?;

            marshal::from_guest(&result, max_result_depth)
        })
    }

    /// Verify that the embedded runtime can be initialised and driven.
    ///
    /// Used as the engine's readiness probe: one instance is created,
    /// exercised end to end, and dropped.
    pub(crate) fn probe() -> Result<(), GuestError> {
        let instance = GuestInstance::create(PROBE_MEMORY_LIMIT, Arc::new(AtomicBool::new(false)))?;
        let program = instance.compile("return 0;")?;
        instance.call(&program, &IndexMap::new(), 4)?;
        Ok(())
    }

    /// Classify a caught guest error, preferring the interrupted sentinel
    /// when the interrupt flag was tripped.
    fn fault(&self, err: CaughtError<'_>, classify: fn(String) -> GuestError) -> GuestError {
        if self.interrupt.load(Ordering::Relaxed) {
            GuestError::Interrupted
        } else {
            classify(describe_caught(err))
        }
    }
}

/// Decrements the shared live-instance count when the instance drops.
pub(crate) struct CountGuard(Arc<AtomicUsize>);

impl CountGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Reduce a caught guest error to its diagnostic message.
fn describe_caught(err: CaughtError<'_>) -> String {
    match err {
        CaughtError::Exception(exception) => exception
            .message()
            .unwrap_or_else(|| "unknown guest exception".to_string()),
        CaughtError::Value(value) => thrown_message(&value),
        CaughtError::Error(error) => error.to_string(),
    }
}

/// Describe a thrown non-Error value.
fn thrown_message(value: &Value<'_>) -> String {
    if let Some(text) = value.as_string() {
        text.to_string()
            .unwrap_or_else(|_| "uncaught value".to_string())
    } else if let Some(number) = value.as_int() {
        number.to_string()
    } else if let Some(number) = value.as_float() {
        number.to_string()
    } else {
        format!("uncaught value of type {:?}", value.type_of())
    }
}
