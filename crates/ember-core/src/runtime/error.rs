//! Error taxonomy (spec §7, "Error taxonomy").
//!
//! Grounded on raya-core's `lib.rs` `VmError` (a flat `thiserror` enum),
//! widened to the six categories the spec names instead of the teacher's
//! four, and carrying an EmberScript [`Value`] payload rather than a
//! bare `String` — `error()` can raise any value, not just a message
//! (spec §4.6, "Throw").

use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub source_name: Option<String>,
    pub line: Option<u32>,
    pub function_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Traceback(pub Vec<TraceFrame>);

impl std::fmt::Display for Traceback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, frame) in self.0.iter().enumerate() {
            let src = frame.source_name.as_deref().unwrap_or("?");
            let line = frame
                .line
                .map(|l| l.to_string())
                .unwrap_or_else(|| "?".into());
            let name = frame.function_name.as_deref().unwrap_or("?");
            writeln!(f, "  #{i} {src}:{line} in {name}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone)]
pub enum EmberError {
    /// Raised by arithmetic on non-numbers, calling a non-function, an
    /// out-of-range index, `error()` called by script code, and similar
    /// (spec §7, taxonomy "RUNTIME").
    #[error("runtime error: {value}")]
    Runtime { value: Value, traceback: Traceback },

    /// The allocator could not satisfy a request, or the configured heap
    /// limit was exceeded (spec §7, taxonomy "MEMORY").
    #[error("out of memory")]
    Memory,

    /// An error handler installed via `pcall`'s message handler itself
    /// raised (spec §7, taxonomy "HANDLER").
    #[error("error in error handling")]
    Handler,

    /// An internal collector invariant was violated (spec §7, taxonomy
    /// "GC") — not reachable through normal script execution, but kept
    /// distinct from `Runtime` so host code can tell "my script is buggy"
    /// from "the VM is buggy" apart.
    #[error("garbage collector error: {0}")]
    Gc(String),

    /// Malformed bytecode, an unreadable file, or a version/format
    /// mismatch when loading a chunk (spec §7, taxonomy "FILE").
    #[error("file error: {0}")]
    File(String),
}

impl EmberError {
    pub fn runtime(value: Value) -> Self {
        EmberError::Runtime {
            value,
            traceback: Traceback::default(),
        }
    }

    pub fn runtime_msg(msg: impl Into<String>) -> Self {
        // A bare message has no heap-allocated Value form available here
        // (this constructor doesn't have a GC to allocate through); call
        // sites with a live `Vm` should prefer `Vm::runtime_error`, which
        // interns the message as a real string value.
        EmberError::Runtime {
            value: Value::nil(),
            traceback: Traceback(vec![TraceFrame {
                source_name: None,
                line: None,
                function_name: Some(msg.into()),
            }]),
        }
    }

    pub fn with_traceback(mut self, tb: Traceback) -> Self {
        if let EmberError::Runtime { traceback, .. } = &mut self {
            *traceback = tb;
        }
        self
    }
}

impl From<ember_bytecode::BytecodeError> for EmberError {
    fn from(e: ember_bytecode::BytecodeError) -> Self {
        EmberError::File(e.to_string())
    }
}

pub type EmberResult<T> = Result<T, EmberError>;
