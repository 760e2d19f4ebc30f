//! Coroutine create/resume/yield (component K, spec §4.6).
//!
//! Grounded on raya-core's `scheduler.rs` `Task`/`TaskStatus`/`spawn` shape,
//! but single-threaded and cooperative rather than worker-pool based: the
//! teacher hands tasks to `num_workers` OS threads through a
//! `parking_lot::Mutex`-guarded map, where a coroutine here is just a
//! [`crate::object::Thread`] sitting on the heap, and "scheduling" one is
//! a direct call into [`Vm::call_on_thread`] (spec §5, "Scheduling model"
//! — EmberScript has no preemption and no cross-thread coroutine sharing).

use crate::gc::ptr::GcRef;
use crate::object::{GcObject, Thread, ThreadStatus};
use crate::runtime::error::EmberResult;
use crate::value::Value;
use crate::vm::interpreter::{RunOutcome, Vm};

/// Allocates a new suspended coroutine wrapping `closure` (spec §4.6,
/// "coroutine.create").
pub fn create(vm: &mut Vm, closure: GcRef) -> GcRef {
    let mut thread = Thread::new();
    thread.status = ThreadStatus::Suspended;
    // Seed the thread's first frame lazily: `resume` pushes it on first
    // entry, same as `push_call` does for an ordinary call, so a
    // coroutine that's never resumed never allocates a register window.
    thread.transfer = vec![Value::gc(closure)];
    vm.gc.allocate(GcObject::Thread(thread))
}

/// Resumes a suspended coroutine with `args`, running it until it
/// yields, returns, or errors (spec §4.6, "coroutine.resume"). Returns
/// `Ok((true, values))` on a clean yield/return, or `Ok((false, values)))`
/// when the coroutine body raised — `resume` itself never propagates the
/// error, matching classical Lua's "resume never throws" contract.
pub fn resume(vm: &mut Vm, co: GcRef, args: Vec<Value>) -> EmberResult<(bool, Vec<Value>)> {
    {
        let status = co
            .object()
            .as_thread()
            .expect("coroutine.resume target must be a GcObject::Thread")
            .status;
        if status != ThreadStatus::Suspended {
            return Ok((false, vec![vm.intern_str(resume_error_message(status).as_bytes())]));
        }
    }
    co.object_mut().as_thread_mut().unwrap().status = ThreadStatus::Running;
    tracing::trace!(coroutine = ?co.addr(), "coroutine resumed");

    let first_entry = co.object().as_thread().unwrap().frames.is_empty()
        && !co.object().as_thread().unwrap().transfer.is_empty();

    let outcome = {
        let mut thread = std::mem::take(co.object_mut().as_thread_mut().unwrap());
        let result = if first_entry {
            let seed = thread.transfer.remove(0);
            vm.call_on_thread(&mut thread, seed, args)
        } else {
            thread.transfer = args;
            vm.resume_thread(&mut thread)
        };
        *co.object_mut().as_thread_mut().unwrap() = thread;
        result
    };

    match outcome {
        Ok(RunOutcome::Yield(vs)) => {
            co.object_mut().as_thread_mut().unwrap().status = ThreadStatus::Suspended;
            tracing::trace!(coroutine = ?co.addr(), "coroutine yielded");
            Ok((true, vs))
        }
        Ok(RunOutcome::Return(vs)) => {
            co.object_mut().as_thread_mut().unwrap().status = ThreadStatus::Dead;
            tracing::trace!(coroutine = ?co.addr(), "coroutine returned");
            Ok((true, vs))
        }
        Err(e) => {
            co.object_mut().as_thread_mut().unwrap().status = ThreadStatus::Dead;
            tracing::warn!(coroutine = ?co.addr(), error = %e, "coroutine raised an error");
            let msg = format!("{e}");
            Ok((false, vec![vm.intern_str(msg.as_bytes())]))
        }
    }
}

fn resume_error_message(status: ThreadStatus) -> &'static str {
    match status {
        ThreadStatus::Dead => "cannot resume dead coroutine",
        ThreadStatus::Running => "cannot resume non-suspended coroutine",
        ThreadStatus::Normal => "cannot resume non-suspended coroutine",
        ThreadStatus::Suspended => unreachable!(),
    }
}

pub fn status(co: GcRef) -> ThreadStatus {
    co.object().as_thread().unwrap().status
}
