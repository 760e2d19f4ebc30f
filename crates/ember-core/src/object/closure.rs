//! Closures, prototypes, and upvalues (components F/G).
//!
//! Grounded on raya-core's module layout (a crate-level `object.rs`
//! holding every heap-object kind) but the content is new: the teacher's
//! `Object`/`Class`/`VTable` model closures over a field-index vtable,
//! which doesn't carry the notion of a shared, closeable upvalue the
//! spec requires (spec §3 "Upvalue", §4.4).
//!
//! An upvalue starts "open": it aliases a live slot on the VM's value
//! stack, so writes through it and writes to the local are the same
//! write. When the enclosing frame returns, every open upvalue pointing
//! into that frame's slots is "closed": its current value is copied out
//! of the stack into the upvalue object itself, so the object keeps
//! working after the stack slot it used to alias is gone (spec §4.4,
//! "Upvalue close", "Upvalue invariant").

use crate::value::Value;
use std::cell::Cell;
use std::sync::Arc;

#[derive(Clone, Copy)]
pub enum UpvalueState {
    /// Aliases absolute stack slot `index` in the owning thread's value
    /// stack.
    Open(usize),
    Closed(Value),
}

pub struct Upvalue {
    state: Cell<UpvalueState>,
}

impl Upvalue {
    pub fn open(stack_index: usize) -> Self {
        Upvalue {
            state: Cell::new(UpvalueState::Open(stack_index)),
        }
    }

    pub fn state(&self) -> UpvalueState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state.get(), UpvalueState::Open(_))
    }

    /// Returns the absolute stack index this upvalue aliases, if still
    /// open. Used when searching the VM's open-upvalue list for one to
    /// reuse (spec §4.4, "Closure creation": two closures created over
    /// the same local must share one upvalue object).
    pub fn open_index(&self) -> Option<usize> {
        match self.state.get() {
            UpvalueState::Open(i) => Some(i),
            UpvalueState::Closed(_) => None,
        }
    }

    /// Closes the upvalue, capturing `value` (read from the stack slot it
    /// used to alias by the caller before the slot is discarded).
    pub fn close(&self, value: Value) {
        self.state.set(UpvalueState::Closed(value));
    }

    /// Reads the upvalue's value when closed. Reading an open upvalue
    /// goes through the VM's stack directly (see `vm::frame`), not this
    /// method.
    pub fn closed_value(&self) -> Option<Value> {
        match self.state.get() {
            UpvalueState::Closed(v) => Some(v),
            UpvalueState::Open(_) => None,
        }
    }

    pub fn set_closed_value(&self, value: Value) {
        self.state.set(UpvalueState::Closed(value));
    }
}

/// A closure: a prototype paired with the upvalues it captured at
/// creation time (spec §3 "Closure").
pub struct Closure {
    pub prototype: Arc<ember_bytecode::Prototype>,
    /// Each entry is a [`crate::gc::ptr::GcRef`] to a heap-allocated
    /// `GcObject::Upvalue`, shared with any sibling closures created over
    /// the same enclosing locals.
    pub upvalues: Vec<crate::gc::ptr::GcRef>,
}

impl Closure {
    pub fn new(
        prototype: Arc<ember_bytecode::Prototype>,
        upvalues: Vec<crate::gc::ptr::GcRef>,
    ) -> Self {
        Closure { prototype, upvalues }
    }
}
