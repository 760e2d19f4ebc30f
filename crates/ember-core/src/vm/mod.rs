//! The register-based bytecode VM (component J).

pub mod frame;
pub mod hooks;
pub mod interpreter;
pub mod metamethod;

pub use frame::{CallFrame, MULTRET};
pub use hooks::{Hook, HookEvent};
pub use interpreter::{RunOutcome, Vm};
