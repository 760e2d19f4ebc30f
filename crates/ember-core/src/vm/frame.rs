//! Call frames (spec §3, "Call frame").
//!
//! Grounded on raya-core's `stack.rs` `CallFrame`/`Stack`, adapted from a
//! byte-addressed operand stack to a register window: instead of
//! `base_pointer`/`local_count` over a push/pop operand stack, a frame
//! owns a contiguous run of registers `[base, base + max_stack_size)`
//! inside the thread's flat value stack, addressed directly by the `A`/
//! `B`/`C` fields of each `Instruction` (spec §4.1, §4.5).

use crate::gc::ptr::GcRef;
use crate::value::Value;

/// Sentinel for "however many results the callee actually produced",
/// used in `expected_results` for multi-value call/return sites (spec
/// §4.5, `CALL`/`RETURN` with `B`/`C` == 0).
pub const MULTRET: i32 = -1;

pub struct CallFrame {
    /// The closure this frame is executing. A `GcRef` to a
    /// `GcObject::Closure` rather than an owned `Arc<Prototype>` so the
    /// collector can trace it as a normal root (spec §2 component E).
    pub closure: GcRef,
    /// Absolute index into the thread's value stack of register 0 for
    /// this frame.
    pub base: usize,
    /// Program counter: index into `closure`'s prototype's `code`.
    pub ip: usize,
    /// How many results the caller wants back; `MULTRET` means "all of
    /// them" (spec §4.5, `RETURN`).
    pub expected_results: i32,
    /// Extra arguments past `num_params` for a vararg function, captured
    /// at call time so `VARARG` can read them back (spec §4.5, `VARARG`).
    pub varargs: Vec<Value>,
}

impl CallFrame {
    pub fn new(closure: GcRef, base: usize, expected_results: i32, varargs: Vec<Value>) -> Self {
        CallFrame {
            closure,
            base,
            ip: 0,
            expected_results,
            varargs,
        }
    }

    pub fn prototype(&self) -> std::sync::Arc<ember_bytecode::Prototype> {
        self.closure
            .object()
            .as_closure()
            .expect("CallFrame::closure must point at a GcObject::Closure")
            .prototype
            .clone()
    }
}
