//! Index-addressed host stack API (component M, spec §6.2).
//!
//! Grounded on raya-sdk's `NativeContext` trait: a thin boundary type that
//! lets host code operate on VM values without depending on `ember-core`'s
//! internals (GC layout, table representation, interpreter loop). Unlike
//! the teacher's `NativeValue`/`dyn NativeContext` split — built for an ABI
//! crossing a dynamic-library boundary, so it avoids exposing `ember-core`
//! types at all — embedding here happens within one address space, so
//! `Stack` borrows `ember_core::Vm`/`Thread` directly and works with
//! `ember_core::Value` rather than a second opaque value type.
//!
//! A [`Stack`] addresses one coroutine's value stack the way the spec
//! describes: positive indices count from the current call's frame base
//! (1-origin), negative indices count from the top (`-1` is topmost).
//! There is no separate registry/upvalue pseudo-index space yet — native
//! closures with their own captured state aren't part of this crate's
//! scope (see `DESIGN.md`, Open Questions).

pub mod error;

pub use error::{AbiError, AbiResult};

use ember_core::{EmberResult, Thread, Value, Vm};

/// A host-facing view onto one coroutine's value stack, addressed
/// relative to `base` (the first argument slot of the currently running
/// host call, spec §6.2 "index-addressed value stack per coroutine").
pub struct Stack<'a> {
    vm: &'a mut Vm,
    thread: &'a mut Thread,
    base: usize,
}

impl<'a> Stack<'a> {
    /// Wraps `thread`'s value stack for host access, addressing indices
    /// relative to `base` (typically the callee's register window base,
    /// or `thread.stack.len()` at the top level).
    pub fn new(vm: &'a mut Vm, thread: &'a mut Thread, base: usize) -> Self {
        Stack { vm, thread, base }
    }

    pub fn vm(&mut self) -> &mut Vm {
        self.vm
    }

    /// Number of values currently above `base`.
    pub fn top(&self) -> usize {
        self.thread.stack.len() - self.base
    }

    fn resolve(&self, index: i32) -> AbiResult<usize> {
        let top = self.top() as i32;
        let offset = if index > 0 { index - 1 } else { top + index };
        if offset < 0 || offset >= top {
            return Err(AbiError::InvalidIndex(index));
        }
        Ok(self.base + offset as usize)
    }

    fn get(&self, index: i32) -> AbiResult<Value> {
        Ok(self.thread.stack[self.resolve(index)?])
    }

    // -- push ----------------------------------------------------------

    pub fn push_nil(&mut self) {
        self.thread.stack.push(Value::nil());
    }

    pub fn push_bool(&mut self, b: bool) {
        self.thread.stack.push(Value::bool(b));
    }

    pub fn push_number(&mut self, n: f64) {
        self.thread.stack.push(Value::number(n));
    }

    pub fn push_string(&mut self, s: &str) {
        let v = self.vm.intern_str(s.as_bytes());
        self.thread.stack.push(v);
    }

    pub fn push_value(&mut self, v: Value) {
        self.thread.stack.push(v);
    }

    pub fn push_cfunction(&mut self, name: &'static str, func: ember_core::NativeFn) {
        let v = self.vm.register_native(name, func);
        self.thread.stack.push(v);
    }

    // -- peek ------------------------------------------------------------

    pub fn is_nil(&self, index: i32) -> bool {
        self.get(index).map(|v| v.is_nil()).unwrap_or(false)
    }

    pub fn is_bool(&self, index: i32) -> bool {
        self.get(index).map(|v| v.is_bool()).unwrap_or(false)
    }

    pub fn is_number(&self, index: i32) -> bool {
        self.get(index).map(|v| v.is_number()).unwrap_or(false)
    }

    pub fn is_table(&self, index: i32) -> bool {
        self.get(index)
            .ok()
            .and_then(|v| v.as_gc())
            .map(|g| matches!(g.object(), ember_core::GcObject::Table(_)))
            .unwrap_or(false)
    }

    pub fn to_bool(&self, index: i32) -> AbiResult<bool> {
        self.get(index)?.as_bool().ok_or_else(|| type_mismatch("boolean", index))
    }

    pub fn to_number(&self, index: i32) -> AbiResult<f64> {
        self.get(index)?.as_number().ok_or_else(|| type_mismatch("number", index))
    }

    pub fn to_str(&self, index: i32) -> AbiResult<String> {
        let v = self.get(index)?;
        let g = v.as_gc().ok_or_else(|| type_mismatch("string", index))?;
        match g.object() {
            ember_core::GcObject::Str(s) => Ok(s.as_str_lossy().into_owned()),
            _ => Err(type_mismatch("string", index)),
        }
    }

    // -- stack shape -----------------------------------------------------

    /// Pops `n` values off the top.
    pub fn pop(&mut self, n: usize) {
        let new_len = self.thread.stack.len().saturating_sub(n).max(self.base);
        self.thread.stack.truncate(new_len);
    }

    /// Inserts the top value at `index`, shifting everything above it up.
    pub fn insert(&mut self, index: i32) -> AbiResult<()> {
        let at = self.resolve(index)?;
        let v = self.thread.stack.pop().ok_or(AbiError::InvalidIndex(index))?;
        self.thread.stack.insert(at, v);
        Ok(())
    }

    /// Removes the value at `index`, shifting everything above it down.
    pub fn remove(&mut self, index: i32) -> AbiResult<Value> {
        let at = self.resolve(index)?;
        Ok(self.thread.stack.remove(at))
    }

    /// Overwrites the value at `index` with the current top, then pops.
    pub fn replace(&mut self, index: i32) -> AbiResult<()> {
        let at = self.resolve(index)?;
        let v = self.thread.stack.pop().ok_or(AbiError::InvalidIndex(index))?;
        self.thread.stack[at] = v;
        Ok(())
    }

    // -- table access ------------------------------------------------------

    /// Raw `t[k]`, no metamethod dispatch (spec §6.2, "raw" table access).
    pub fn raw_get(&self, table_index: i32, key: Value) -> AbiResult<Value> {
        let t = self.get(table_index)?;
        let g = t.as_gc().ok_or_else(|| type_mismatch("table", table_index))?;
        let table = g.object().as_table().ok_or_else(|| type_mismatch("table", table_index))?;
        Ok(table.get(&key))
    }

    pub fn raw_set(&mut self, table_index: i32, key: Value, value: Value) -> AbiResult<()> {
        let t = self.get(table_index)?;
        let g = t.as_gc().ok_or_else(|| type_mismatch("table", table_index))?;
        g.object_mut()
            .as_table_mut()
            .ok_or_else(|| type_mismatch("table", table_index))?
            .set(key, value);
        Ok(())
    }

    // -- calls -----------------------------------------------------------

    /// Calls the value at `func_index` with the top `nargs` values as
    /// arguments, replacing the function and its arguments with however
    /// many results it returns (spec §6.2, "call (regular and
    /// protected)") — the same function-and-args-consumed convention
    /// `raw_get`/`raw_set`'s callers expect from `lua_call`.
    pub fn call(&mut self, func_index: i32, nargs: usize) -> EmberResult<()> {
        let func = self
            .get(func_index)
            .map_err(|e| ember_core::EmberError::runtime_msg(e.to_string()))?;
        let func_pos = self
            .resolve(func_index)
            .map_err(|e| ember_core::EmberError::runtime_msg(e.to_string()))?;
        let args_start = self.thread.stack.len() - nargs;
        let args: Vec<Value> = self.thread.stack.split_off(args_start);
        self.thread.stack.truncate(func_pos);
        let results = match self.vm.call_on_thread(self.thread, func, args)? {
            ember_core::RunOutcome::Return(vs) => vs,
            ember_core::RunOutcome::Yield(_) => {
                return Err(ember_core::EmberError::runtime_msg(
                    "attempt to yield across a host call boundary",
                ))
            }
        };
        self.thread.stack.extend(results);
        Ok(())
    }

    /// Protected call: like [`Stack::call`], but returns `Ok(false)` with
    /// the error value pushed instead of propagating (spec §6.2, "call
    /// ... protected").
    pub fn pcall(&mut self, func_index: i32, nargs: usize) -> AbiResult<bool> {
        let func = self.get(func_index)?;
        let func_pos = self.resolve(func_index)?;
        let args_start = self.thread.stack.len() - nargs;
        let args: Vec<Value> = self.thread.stack.split_off(args_start);
        self.thread.stack.truncate(func_pos);
        let (ok, mut results) = ember_core::runtime::pcall::protected_call(self.vm, func, args)?;
        // `protected_call` prepends a boolean status flag for script-level
        // `pcall`; the host API here reports status via the return value
        // instead, so drop it before re-pushing.
        if !results.is_empty() {
            results.remove(0);
        }
        self.thread.stack.extend(results);
        Ok(ok)
    }

    // -- errors ------------------------------------------------------------

    /// Raises the top-of-stack value as a runtime error (spec §6.2,
    /// "error raising").
    pub fn raise(&mut self) -> ember_core::EmberError {
        let v = self.thread.stack.pop().unwrap_or_else(Value::nil);
        ember_core::EmberError::runtime(v)
    }

    // -- gc ------------------------------------------------------------

    /// Forces a full collection now (spec §6.2, "garbage-collection
    /// control").
    pub fn collect_garbage(&mut self) -> (u64, u64) {
        let live: Vec<Value> = self.thread.stack.clone();
        self.vm.gc.collect(&live)
    }
}

fn type_mismatch(expected: &str, index: i32) -> AbiError {
    AbiError::TypeMismatch {
        expected: expected.to_string(),
        got: format!("stack index {index}"),
    }
}
