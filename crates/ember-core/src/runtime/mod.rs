//! Call/error/coroutine runtime (component K).

pub mod coroutine;
pub mod error;
pub mod pcall;

pub use error::{EmberError, EmberResult, TraceFrame, Traceback};
