//! Value model, table, garbage collector, closures, and the bytecode
//! interpreter for EmberScript (components A, B, C, E, F, G, J, K of the
//! specification).
//!
//! Grounded on raya-core's crate layout (`value.rs`, `object.rs`, `gc/`,
//! `vm/` at the crate root), widened into submodules per component
//! rather than a handful of flat top-level files, since this crate folds
//! in a full GC and interpreter the teacher's own `ember-core` analogue
//! left as stubs or left out entirely.

pub mod gc;
pub mod object;
pub mod runtime;
pub mod string_interner;
pub mod value;
pub mod vm;

pub use gc::{GarbageCollector, GcRef, Heap, RootSet};
pub use object::{Closure, GcObject, NativeFn, NativeFunction, Table, Thread, ThreadStatus, UserData};
pub use runtime::{EmberError, EmberResult};
pub use value::Value;
pub use vm::{Hook, HookEvent, RunOutcome, Vm};
