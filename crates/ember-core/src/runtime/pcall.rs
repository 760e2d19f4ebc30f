//! Protected calls (spec §4.6 "Call/error/coroutine runtime", §7 "Error
//! taxonomy"): `pcall`/`xpcall`-style invocation that turns a runtime
//! error into an ordinary return value instead of unwinding further.
//!
//! Grounded on raya-core's `VmError`-as-`Result` convention in
//! `lib.rs`/`vm/interpreter.rs` (errors already propagate as `Result`,
//! never `panic!`); this module is the one place that `Result` gets
//! caught rather than bubbled, by construction the only boundary the
//! spec allows an error to stop crossing (spec §7, "pcall boundary").

use crate::object::Thread;
use crate::runtime::error::{EmberError, EmberResult};
use crate::value::Value;
use crate::vm::interpreter::{RunOutcome, Vm};

/// Calls `func` with `args`, catching any `Runtime`/`Memory`/`Gc`/`File`
/// error it raises. Returns `(true, results)` on success or
/// `(false, [error_value])` on failure — the shape `pcall` exposes to
/// script code (spec §4.6, "pcall").
///
/// Yielding out of a protected call is allowed (unlike out of a
/// metamethod): the `Yield` outcome is passed straight through rather
/// than caught, since `pcall`-wrapped code inside a coroutine must still
/// be able to suspend the whole coroutine (spec §9, "pcall across yield").
pub fn protected_call(vm: &mut Vm, func: Value, args: Vec<Value>) -> EmberResult<(bool, Vec<Value>)> {
    let mut scratch = Thread::new();
    match vm.call_on_thread(&mut scratch, func, args) {
        Ok(RunOutcome::Return(mut results)) => {
            results.insert(0, Value::bool(true));
            Ok((true, results))
        }
        Ok(RunOutcome::Yield(_)) => Err(EmberError::runtime_msg(
            "attempt to yield across a protected call boundary",
        )),
        Err(e) => Ok((false, vec![Value::bool(false), error_value(vm, &e)])),
    }
}

/// `xpcall`: like [`protected_call`], but runs `handler` on the error
/// value before returning it, so script code can attach a traceback or
/// log before the stack that produced the error is gone (spec §4.6,
/// "xpcall").
pub fn protected_call_with_handler(
    vm: &mut Vm,
    func: Value,
    args: Vec<Value>,
    handler: Value,
) -> EmberResult<(bool, Vec<Value>)> {
    let mut scratch = Thread::new();
    match vm.call_on_thread(&mut scratch, func, args) {
        Ok(RunOutcome::Return(mut results)) => {
            results.insert(0, Value::bool(true));
            Ok((true, results))
        }
        Ok(RunOutcome::Yield(_)) => Err(EmberError::runtime_msg(
            "attempt to yield across a protected call boundary",
        )),
        Err(e) => {
            let mut handler_thread = Thread::new();
            let err_value = error_value(vm, &e);
            let handled = match vm.call_on_thread(&mut handler_thread, handler, vec![err_value]) {
                Ok(RunOutcome::Return(mut vs)) => vs.drain(..).next().unwrap_or(err_value),
                _ => return Err(EmberError::Handler),
            };
            Ok((false, vec![Value::bool(false), handled]))
        }
    }
}

fn error_value(vm: &mut Vm, e: &EmberError) -> Value {
    match e {
        EmberError::Runtime { value, .. } if !value.is_nil() => *value,
        other => vm.intern_str(other.to_string().as_bytes()),
    }
}
