//! Script-visible debug hooks (spec §3 "Call frame ... tail-call
//! counter (for debug hook accounting)", §4.5 "HOOKTAILRET").
//!
//! Distinct from the ambient `tracing` instrumentation elsewhere in this
//! crate: those are operator-facing log lines, this is a callback a host
//! can install to observe the interpreter's call/return/tail-call
//! events as they happen, the same separation the teacher draws between
//! `tracing` logging and `raya-core::scheduler`'s task-event channel.

use crate::object::Thread;
use crate::value::Value;
use crate::vm::interpreter::Vm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Call,
    Return,
    TailCall,
}

pub type Hook = fn(&mut Vm, &mut Thread, HookEvent);

#[derive(Default)]
pub struct HookState {
    hook: Option<Hook>,
}

impl HookState {
    pub fn set(&mut self, hook: Option<Hook>) {
        self.hook = hook;
    }

    pub fn is_set(&self) -> bool {
        self.hook.is_some()
    }
}

impl Vm {
    pub fn set_hook(&mut self, hook: Option<Hook>) {
        self.hooks.set(hook);
    }

    pub(crate) fn fire_hook(&mut self, thread: &mut Thread, event: HookEvent) {
        if let Some(hook) = self.hooks.hook {
            hook(self, thread, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::interpreter::Vm;
    use std::sync::atomic::{AtomicU32, Ordering};

    static CALLS: AtomicU32 = AtomicU32::new(0);

    fn counting_hook(_vm: &mut Vm, _thread: &mut Thread, event: HookEvent) {
        if event == HookEvent::Call {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn hook_fires_on_call() {
        let mut vm = Vm::new();
        vm.set_hook(Some(counting_hook));
        let mut thread = Thread::new();
        let before = CALLS.load(Ordering::SeqCst);
        vm.fire_hook(&mut thread, HookEvent::Call);
        assert_eq!(CALLS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn no_hook_is_a_no_op() {
        let mut vm = Vm::new();
        let mut thread = Thread::new();
        vm.fire_hook(&mut thread, HookEvent::Return);
    }
}
