//! The register-window bytecode interpreter (component J, spec §4.5).
//!
//! Grounded on raya-core's `vm/interpreter.rs` fetch/decode/dispatch idiom
//! (a `match opcode` over one big loop, small `op_*` handlers), but
//! restructured around an explicit `Vec<CallFrame>` instead of recursive
//! Rust function calls: the teacher's `execute_function` recurses into
//! itself for every EmberScript call, which would make a cooperative
//! coroutine's `yield` impossible to implement without unwinding through
//! native stack frames. Here, `CALL` pushes a frame and the same `while`
//! loop picks the new frame up on its next iteration, and `RETURN` pops
//! one; `yield` is just "stop the loop and hand control back to
//! `resume`", no different in shape from any other suspension.

use crate::gc::ptr::GcRef;
use crate::object::{Closure, GcObject, NativeFunction, Table, Thread, Upvalue, UpvalueState};
use crate::runtime::error::{EmberError, EmberResult};
use crate::string_interner::EmberStr;
use crate::value::Value;
use crate::vm::frame::{CallFrame, MULTRET};
use crate::vm::metamethod::{get_metamethod, Metamethod, MetamethodNames};
use ember_bytecode::{Constant, OpCode, Prototype};
use std::sync::Arc;

/// What a dispatch loop iteration produced when it stops.
pub enum RunOutcome {
    Return(Vec<Value>),
    Yield(Vec<Value>),
}

pub struct Vm {
    pub gc: crate::gc::collector::GarbageCollector,
    pub globals: GcRef,
    pub interner: crate::string_interner::StringInterner,
    pub names: MetamethodNames,
    pub main: Thread,
    yield_marker: GcRef,
    /// How many nested EmberScript→native→EmberScript calls are open.
    /// Bounded the same way the classical Lua `LUAI_MAXCCALLS` bounds C
    /// stack growth (spec §4.6, "Stack growth").
    pub c_call_depth: u32,
    pub(crate) hooks: crate::vm::hooks::HookState,
}

const MAX_C_CALLS: u32 = 200;

impl Vm {
    pub fn new() -> Self {
        let mut gc = crate::gc::collector::GarbageCollector::new();
        let names = MetamethodNames::new(&mut gc);
        let globals = gc.allocate(GcObject::Table(Table::new()));
        let yield_marker = gc.allocate(GcObject::Native(NativeFunction::yield_marker()));
        Vm {
            gc,
            globals,
            interner: crate::string_interner::StringInterner::new(),
            names,
            main: Thread::new(),
            yield_marker,
            c_call_depth: 0,
            hooks: crate::vm::hooks::HookState::default(),
        }
    }

    pub fn yield_value(&self) -> Value {
        Value::gc(self.yield_marker)
    }

    pub fn intern_str(&mut self, bytes: &[u8]) -> Value {
        if bytes.len() <= crate::string_interner::MAX_SHORT_STRING {
            if let Some(existing) = self.interner.get(bytes) {
                return Value::gc(existing);
            }
            let r = self.gc.allocate(GcObject::Str(EmberStr::from_bytes(bytes.to_vec())));
            self.interner.insert(bytes.to_vec(), r);
            Value::gc(r)
        } else {
            let r = self.gc.allocate(GcObject::Str(EmberStr::from_bytes(bytes.to_vec())));
            Value::gc(r)
        }
    }

    pub fn register_native(&mut self, name: &'static str, func: crate::object::NativeFn) -> Value {
        let r = self.gc.allocate(GcObject::Native(NativeFunction::new(name, func)));
        Value::gc(r)
    }

    /// Wraps a bare `Prototype` (no captured upvalues) into a callable
    /// closure, the way loading a chunk's top-level function works (spec
    /// §6.1, "Function block").
    pub fn wrap_prototype(&mut self, proto: Arc<Prototype>) -> GcRef {
        self.gc.allocate(GcObject::Closure(Closure::new(proto, Vec::new())))
    }

    /// Runs `closure` with `args` on the main thread to completion,
    /// propagating any runtime error. This is the entry point
    /// `ember-cli`'s `run` subcommand uses (spec §6.3).
    pub fn call_main(&mut self, closure: GcRef, args: Vec<Value>) -> EmberResult<Vec<Value>> {
        let mut main = std::mem::take(&mut self.main);
        let outcome = self.call_on_thread(&mut main, Value::gc(closure), args);
        self.main = main;
        match outcome? {
            RunOutcome::Return(vs) => Ok(vs),
            RunOutcome::Yield(_) => Err(self.runtime_error_msg("attempt to yield from outside a coroutine")),
        }
    }

    /// Pushes one frame for `callee` onto `thread` and drives the
    /// dispatch loop until that frame (and everything it calls) returns,
    /// or the thread yields.
    pub fn call_on_thread(&mut self, thread: &mut Thread, callee: Value, args: Vec<Value>) -> EmberResult<RunOutcome> {
        self.invoke(thread, callee, args, MULTRET)
    }

    /// Continues a thread previously suspended by `coroutine.yield`,
    /// depositing `thread.transfer` (the arguments this `resume` was
    /// called with) into the register window the suspended `CALL` was
    /// waiting on, then re-entering the dispatch loop (spec §4.6,
    /// "Coroutine resume/yield"). `thread.frames` must be non-empty —
    /// resuming a thread that has never been started goes through
    /// `call_on_thread` instead.
    pub fn resume_thread(&mut self, thread: &mut Thread) -> EmberResult<RunOutcome> {
        if let Some((a, nresults)) = thread.pending_yield.take() {
            let base = thread
                .frames
                .last()
                .expect("resuming thread must have a suspended frame")
                .base;
            let args = std::mem::take(&mut thread.transfer);
            let results = adjust_results(args, nresults);
            self.write_results(thread, base, a, results, nresults);
        }
        self.run(thread, 0)
    }

    /// The single place every call — `CALL`, a tail call, a metamethod
    /// dispatch, or `coroutine.resume` — goes through. Handles the three
    /// kinds of callee uniformly: the yield marker, an ordinary native,
    /// and an EmberScript closure.
    fn invoke(&mut self, thread: &mut Thread, callee: Value, args: Vec<Value>, expected_results: i32) -> EmberResult<RunOutcome> {
        if let Some(g) = callee.as_gc() {
            if let GcObject::Native(nf) = g.object() {
                if nf.is_yield {
                    return Ok(RunOutcome::Yield(args));
                }
            }
        }
        self.c_call_depth += 1;
        if self.c_call_depth > MAX_C_CALLS {
            self.c_call_depth -= 1;
            return Err(self.runtime_error_msg("stack overflow"));
        }
        let outcome = if let Some(nf) = callee.as_gc().and_then(|g| match g.object() {
            GcObject::Native(nf) => Some(nf.func.expect("non-yield native must carry a function pointer")),
            _ => None,
        }) {
            nf(self, &args).map(RunOutcome::Return)
        } else {
            let before = thread.frames.len();
            match self.push_call(thread, callee, args, expected_results) {
                Ok(()) => self.run(thread, before),
                Err(e) => Err(e),
            }
        };
        self.c_call_depth -= 1;
        match outcome? {
            RunOutcome::Return(results) => Ok(RunOutcome::Return(adjust_results(results, expected_results))),
            RunOutcome::Yield(vs) => Ok(RunOutcome::Yield(vs)),
        }
    }

    fn push_call(&mut self, thread: &mut Thread, callee: Value, mut args: Vec<Value>, expected_results: i32) -> EmberResult<()> {
        let g = callee
            .as_gc()
            .filter(|g| matches!(g.object(), GcObject::Closure(_)))
            .ok_or_else(|| self.runtime_error_msg(format!("attempt to call a {} value", callee.type_name())))?;
        let closure = g.object().as_closure().unwrap();
        let proto = closure.prototype.clone();
        let base = thread.stack.len();
        let num_params = proto.num_params as usize;
        let varargs = if proto.is_vararg && args.len() > num_params {
            args.split_off(num_params)
        } else {
            Vec::new()
        };
        args.resize(num_params, Value::nil());
        thread.stack.extend(args);
        let floor = base + proto.max_stack_size as usize;
        if thread.stack.len() < floor {
            thread.stack.resize(floor, Value::nil());
        }
        thread.frames.push(CallFrame::new(g, base, expected_results, varargs));
        Ok(())
    }

    pub fn runtime_error_msg(&mut self, msg: impl Into<String>) -> EmberError {
        let v = self.intern_str(msg.into().as_bytes());
        EmberError::runtime(v)
    }

    /// The dispatch loop. Returns once the frame count drops back to
    /// `stop_depth` (the frame we were asked to run, and everything it
    /// called, has returned), or a `yield` propagates out.
    fn run(&mut self, thread: &mut Thread, stop_depth: usize) -> EmberResult<RunOutcome> {
        loop {
            if thread.frames.len() <= stop_depth {
                return Ok(RunOutcome::Return(std::mem::take(&mut thread.transfer)));
            }
            if let Step::Yielded(vs) = self.step(thread)? {
                return Ok(RunOutcome::Yield(vs));
            }
        }
    }

    /// Executes exactly one instruction of the topmost frame.
    fn step(&mut self, thread: &mut Thread) -> EmberResult<Step> {
        let frame_idx = thread.frames.len() - 1;
        let proto = thread.frames[frame_idx].prototype();
        let ip = thread.frames[frame_idx].ip;
        let inst = proto.code[ip];
        thread.frames[frame_idx].ip += 1;
        let base = thread.frames[frame_idx].base;

        macro_rules! reg {
            ($i:expr) => {
                thread.stack[base + $i as usize]
            };
        }
        macro_rules! set_reg {
            ($i:expr, $v:expr) => {
                thread.stack[base + $i as usize] = $v
            };
        }

        match inst.opcode() {
            OpCode::Move => {
                let v = reg!(inst.b());
                set_reg!(inst.a(), v);
            }
            OpCode::LoadK => {
                let v = self.constant_as_value(&proto.constants[inst.bx() as usize]);
                set_reg!(inst.a(), v);
            }
            OpCode::LoadBool => {
                set_reg!(inst.a(), Value::bool(inst.b() != 0));
                if inst.c() != 0 {
                    thread.frames[frame_idx].ip += 1;
                }
            }
            OpCode::LoadNil => {
                let last = inst.b();
                for i in 0..=last {
                    set_reg!(inst.a() + i, Value::nil());
                }
            }
            OpCode::GetUpval => {
                let closure_obj = thread.frames[frame_idx].closure;
                let uv = closure_obj.object().as_closure().unwrap().upvalues[inst.b() as usize];
                set_reg!(inst.a(), Self::read_upvalue(thread, uv));
            }
            OpCode::SetUpval => {
                let closure_obj = thread.frames[frame_idx].closure;
                let uv = closure_obj.object().as_closure().unwrap().upvalues[inst.b() as usize];
                let v = reg!(inst.a());
                Self::write_upvalue(thread, uv, v);
            }
            OpCode::GetGlobal => {
                let key = self.constant_as_value(&proto.constants[inst.bx() as usize]);
                let v = self.index_get(Value::gc(self.globals), key)?;
                set_reg!(inst.a(), v);
            }
            OpCode::SetGlobal => {
                let key = self.constant_as_value(&proto.constants[inst.bx() as usize]);
                let v = reg!(inst.a());
                self.index_set(Value::gc(self.globals), key, v)?;
            }
            OpCode::GetTable => {
                let t = reg!(inst.b());
                let k = self.rk(thread, &proto, base, inst.c());
                let v = self.index_get(t, k)?;
                set_reg!(inst.a(), v);
            }
            OpCode::SetTable => {
                let t = reg!(inst.a());
                let k = self.rk(thread, &proto, base, inst.b());
                let v = self.rk(thread, &proto, base, inst.c());
                self.index_set(t, k, v)?;
            }
            OpCode::NewTable => {
                let t = self.gc.allocate(GcObject::Table(Table::new()));
                set_reg!(inst.a(), Value::gc(t));
            }
            OpCode::SelfOp => {
                let t = reg!(inst.b());
                let k = self.rk(thread, &proto, base, inst.c());
                let method = self.index_get(t, k)?;
                set_reg!(inst.a() + 1, t);
                set_reg!(inst.a(), method);
            }
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod | OpCode::Pow => {
                let a = self.rk(thread, &proto, base, inst.b());
                let b = self.rk(thread, &proto, base, inst.c());
                let v = self.arith(inst.opcode(), a, b)?;
                set_reg!(inst.a(), v);
            }
            OpCode::Unm => {
                let a = reg!(inst.b());
                let v = self.arith(OpCode::Unm, a, a)?;
                set_reg!(inst.a(), v);
            }
            OpCode::Not => {
                let a = reg!(inst.b());
                set_reg!(inst.a(), Value::bool(!a.is_truthy()));
            }
            OpCode::Len => {
                let a = reg!(inst.b());
                let v = self.length_of(a)?;
                set_reg!(inst.a(), v);
            }
            OpCode::Concat => {
                let vals: Vec<Value> = (inst.b()..=inst.c()).map(|i| reg!(i)).collect();
                let v = self.concat(&vals)?;
                set_reg!(inst.a(), v);
            }
            OpCode::Jmp => {
                thread.frames[frame_idx].ip = (thread.frames[frame_idx].ip as i64 + inst.sbx() as i64) as usize;
            }
            OpCode::Eq | OpCode::Lt | OpCode::Le => {
                let a = self.rk(thread, &proto, base, inst.b());
                let b = self.rk(thread, &proto, base, inst.c());
                let result = self.compare(inst.opcode(), a, b)?;
                if result != (inst.a() != 0) {
                    thread.frames[frame_idx].ip += 1;
                }
            }
            OpCode::Test => {
                let a = reg!(inst.a());
                if a.is_truthy() != (inst.c() != 0) {
                    thread.frames[frame_idx].ip += 1;
                }
            }
            OpCode::TestSet => {
                let b = reg!(inst.b());
                if b.is_truthy() == (inst.c() != 0) {
                    set_reg!(inst.a(), b);
                } else {
                    thread.frames[frame_idx].ip += 1;
                }
            }
            OpCode::Call => {
                let a = inst.a();
                let nargs = inst.b();
                let nresults = inst.c() as i32 - 1;
                let callee = reg!(a);
                let args = self.gather_args(thread, base, a, nargs);
                match self.invoke(thread, callee, args, nresults)? {
                    RunOutcome::Yield(vs) => {
                        thread.pending_yield = Some((a, nresults));
                        return Ok(Step::Yielded(vs));
                    }
                    RunOutcome::Return(results) => {
                        self.write_results(thread, base, a, results, nresults);
                    }
                }
                if self.hooks.is_set() {
                    self.fire_hook(thread, crate::vm::hooks::HookEvent::Call);
                }
            }
            OpCode::TailCall => {
                let a = inst.a();
                let nargs = inst.b();
                let callee = reg!(a);
                let args = self.gather_args(thread, base, a, nargs);
                self.close_upvalues_from(thread, base);
                let expected = thread.frames[frame_idx].expected_results;
                match self.invoke(thread, callee, args, expected)? {
                    RunOutcome::Yield(vs) => return Ok(Step::Yielded(vs)),
                    RunOutcome::Return(results) => {
                        thread.stack.truncate(base);
                        thread.frames.pop();
                        thread.transfer = results;
                    }
                }
                if self.hooks.is_set() {
                    self.fire_hook(thread, crate::vm::hooks::HookEvent::TailCall);
                }
            }
            OpCode::Return => {
                let a = inst.a();
                let b = inst.b();
                let results: Vec<Value> = if b == 0 {
                    let top = thread.stack.len();
                    ((base + a as usize)..top).map(|i| thread.stack[i]).collect()
                } else {
                    (0..b - 1).map(|i| reg!(a + i)).collect()
                };
                self.close_upvalues_from(thread, base);
                thread.stack.truncate(base);
                thread.frames.pop();
                thread.transfer = results;
                if self.hooks.is_set() {
                    self.fire_hook(thread, crate::vm::hooks::HookEvent::Return);
                }
            }
            OpCode::Closure => {
                let child_proto = proto.prototypes[inst.bx() as usize].clone();
                let mut upvalues = Vec::with_capacity(child_proto.upvalues.len());
                for uv_desc in &child_proto.upvalues {
                    let r = match uv_desc.source {
                        ember_bytecode::prototype::UpvalSource::Local(idx) => {
                            self.find_or_create_upvalue(thread, base + idx as usize)
                        }
                        ember_bytecode::prototype::UpvalSource::Upval(idx) => {
                            let closure_obj = thread.frames[frame_idx].closure;
                            closure_obj.object().as_closure().unwrap().upvalues[idx as usize]
                        }
                    };
                    upvalues.push(r);
                }
                let c = self.gc.allocate(GcObject::Closure(Closure::new(child_proto, upvalues)));
                set_reg!(inst.a(), Value::gc(c));
            }
            OpCode::Close => {
                self.close_upvalues_from(thread, base + inst.a() as usize);
            }
            OpCode::Vararg => {
                let want = inst.b() as i32 - 1;
                let varargs = thread.frames[frame_idx].varargs.clone();
                let varargs = adjust_results(varargs, want);
                let top_needed = base + inst.a() as usize + varargs.len();
                if thread.stack.len() < top_needed {
                    thread.stack.resize(top_needed, Value::nil());
                }
                for (i, v) in varargs.iter().enumerate() {
                    thread.stack[base + inst.a() as usize + i] = *v;
                }
            }
            OpCode::ForPrep => {
                let a = inst.a();
                let init = number_operand(reg!(a), "'for' initial value")?;
                let step = number_operand(reg!(a + 2), "'for' step")?;
                set_reg!(a, Value::number(init - step));
                thread.frames[frame_idx].ip = (thread.frames[frame_idx].ip as i64 + inst.sbx() as i64) as usize;
            }
            OpCode::ForLoop => {
                let a = inst.a();
                let step = number_operand(reg!(a + 2), "'for' step")?;
                let limit = number_operand(reg!(a + 1), "'for' limit")?;
                let next = number_operand(reg!(a), "'for' value")? + step;
                let continue_loop = if step > 0.0 { next <= limit } else { next >= limit };
                if continue_loop {
                    set_reg!(a, Value::number(next));
                    set_reg!(a + 3, Value::number(next));
                    thread.frames[frame_idx].ip = (thread.frames[frame_idx].ip as i64 + inst.sbx() as i64) as usize;
                }
            }
            OpCode::TForLoop => {
                let a = inst.a();
                let nvars = inst.c();
                let func = reg!(a);
                let state = reg!(a + 1);
                let control = reg!(a + 2);
                match self.invoke(thread, func, vec![state, control], nvars as i32)? {
                    RunOutcome::Return(results) => {
                        for (i, v) in results.iter().enumerate() {
                            set_reg!(a + 3 + i as u32, *v);
                        }
                        if results.first().map(|v| v.is_nil()).unwrap_or(true) {
                            thread.frames[frame_idx].ip += 1;
                        } else {
                            set_reg!(a + 2, results[0]);
                        }
                    }
                    RunOutcome::Yield(_) => {
                        return Err(self.runtime_error_msg("attempt to yield across a generic 'for' iterator"))
                    }
                }
            }
            OpCode::SetList => {
                let a = inst.a();
                let count = inst.b();
                let block = inst.c();
                const FIELDS_PER_FLUSH: u32 = 50;
                let start = (block - 1) * FIELDS_PER_FLUSH;
                let t = reg!(a);
                let n = if count == 0 {
                    let top = thread.stack.len();
                    (top - (base + a as usize + 1)) as u32
                } else {
                    count
                };
                let g = t.as_gc().expect("SETLIST target must be a table");
                let table = g.object_mut().as_table_mut().expect("SETLIST target must be a table");
                for i in 1..=n {
                    let v = reg!(a + i);
                    table.set(Value::number((start + i) as f64), v);
                }
            }
        }
        Ok(Step::Continue)
    }

    fn gather_args(&self, thread: &Thread, base: usize, a: u32, nargs: u32) -> Vec<Value> {
        if nargs == 0 {
            let top = thread.stack.len();
            ((base + a as usize + 1)..top).map(|i| thread.stack[i]).collect()
        } else {
            (1..nargs).map(|i| thread.stack[base + (a + i) as usize]).collect()
        }
    }

    fn write_results(&self, thread: &mut Thread, base: usize, a: u32, results: Vec<Value>, nresults: i32) {
        let top_needed = base + a as usize + results.len();
        if thread.stack.len() < top_needed {
            thread.stack.resize(top_needed, Value::nil());
        }
        for (i, v) in results.iter().enumerate() {
            thread.stack[base + a as usize + i] = *v;
        }
        if nresults < 0 {
            thread.stack.truncate(top_needed);
        }
    }

    fn rk(&mut self, thread: &Thread, proto: &Prototype, base: usize, x: u32) -> Value {
        if ember_bytecode::instruction::is_k(x) {
            let idx = ember_bytecode::instruction::index_k(x) as usize;
            self.constant_as_value(&proto.constants[idx].clone())
        } else {
            thread.stack[base + x as usize]
        }
    }

    /// Reads a constant as a `Value`. String constants must be looked up
    /// through the interner rather than allocated fresh every time this
    /// instruction runs, so this takes `&mut self`; callers on a hot
    /// non-string path (numbers/bool/nil) pay nothing extra.
    fn constant_as_value(&mut self, c: &Constant) -> Value {
        match c {
            Constant::Nil => Value::nil(),
            Constant::Bool(b) => Value::bool(*b),
            Constant::Number(n) => Value::number(*n),
            Constant::Str(bytes) => self.intern_str(bytes),
        }
    }

    fn read_upvalue(thread: &Thread, uv: GcRef) -> Value {
        match uv.object().as_upvalue().unwrap().state() {
            UpvalueState::Open(idx) => thread.stack[idx],
            UpvalueState::Closed(v) => v,
        }
    }

    fn write_upvalue(thread: &mut Thread, uv: GcRef, v: Value) {
        match uv.object().as_upvalue().unwrap().state() {
            UpvalueState::Open(idx) => thread.stack[idx] = v,
            UpvalueState::Closed(_) => uv.object().as_upvalue().unwrap().set_closed_value(v),
        }
    }

    fn find_or_create_upvalue(&mut self, thread: &mut Thread, stack_index: usize) -> GcRef {
        for &existing in thread.open_upvalues.iter() {
            if existing.object().as_upvalue().unwrap().open_index() == Some(stack_index) {
                return existing;
            }
        }
        let r = self.gc.allocate(GcObject::Upvalue(Upvalue::open(stack_index)));
        thread.open_upvalues.push(r);
        r
    }

    /// Closes every open upvalue aliasing a stack slot at or above
    /// `from`, copying its current value in before the slot is discarded
    /// (spec §4.4, "Upvalue close").
    fn close_upvalues_from(&mut self, thread: &mut Thread, from: usize) {
        let mut remaining = Vec::with_capacity(thread.open_upvalues.len());
        for uv in thread.open_upvalues.drain(..) {
            match uv.object().as_upvalue().unwrap().open_index() {
                Some(idx) if idx >= from => {
                    let v = thread.stack[idx];
                    uv.object().as_upvalue().unwrap().close(v);
                }
                _ => remaining.push(uv),
            }
        }
        thread.open_upvalues = remaining;
    }

    fn index_get(&mut self, t: Value, key: Value) -> EmberResult<Value> {
        let mut cur = t;
        for _ in 0..crate::vm::metamethod::MAX_METATABLE_CHAIN {
            if let Some(g) = cur.as_gc() {
                if let GcObject::Table(table) = g.object() {
                    let v = table.get(&key);
                    if !v.is_nil() {
                        return Ok(v);
                    }
                    match get_metamethod(&cur, Metamethod::Index, &self.names) {
                        Some(mm) if is_callable(&mm) => return self.call_single(mm, vec![cur, key]),
                        Some(mm) => {
                            cur = mm;
                            continue;
                        }
                        None => return Ok(Value::nil()),
                    }
                }
            }
            if let Some(mm) = get_metamethod(&cur, Metamethod::Index, &self.names) {
                if is_callable(&mm) {
                    return self.call_single(mm, vec![cur, key]);
                }
                cur = mm;
                continue;
            }
            return Err(self.runtime_error_msg(format!("attempt to index a {} value", cur.type_name())));
        }
        Err(self.runtime_error_msg("'__index' chain too long; possible loop"))
    }

    fn index_set(&mut self, t: Value, key: Value, value: Value) -> EmberResult<()> {
        let g = t
            .as_gc()
            .filter(|g| matches!(g.object(), GcObject::Table(_)))
            .ok_or_else(|| self.runtime_error_msg(format!("attempt to index a {} value", t.type_name())))?;
        let existing = g.object().as_table().unwrap().get(&key);
        if !existing.is_nil() {
            g.object_mut().as_table_mut().unwrap().set(key, value);
            return Ok(());
        }
        match get_metamethod(&t, Metamethod::NewIndex, &self.names) {
            None => {
                if key.is_nil() {
                    return Err(self.runtime_error_msg("table index is nil"));
                }
                g.object_mut().as_table_mut().unwrap().set(key, value);
                self.gc.write_barrier(g, key);
                self.gc.write_barrier(g, value);
                Ok(())
            }
            Some(mm) if is_callable(&mm) => {
                self.call_single(mm, vec![t, key, value])?;
                Ok(())
            }
            Some(mm) => self.index_set(mm, key, value),
        }
    }

    /// Invokes `func` with `args` on a scratch thread, taking only the
    /// first result (the shape every metamethod call site needs).
    /// Yielding out of a metamethod is rejected, matching classical Lua's
    /// restriction on yielding across a C call boundary (spec §4.6).
    fn call_single(&mut self, func: Value, args: Vec<Value>) -> EmberResult<Value> {
        let mut scratch = Thread::new();
        match self.invoke(&mut scratch, func, args, 1)? {
            RunOutcome::Return(mut vs) => Ok(vs.drain(..).next().unwrap_or_else(Value::nil)),
            RunOutcome::Yield(_) => Err(self.runtime_error_msg("attempt to yield from a metamethod")),
        }
    }

    fn arith(&mut self, op: OpCode, a: Value, b: Value) -> EmberResult<Value> {
        if let (Some(x), Some(y)) = (coerce_number(a), coerce_number(b)) {
            return Ok(Value::number(match op {
                OpCode::Add => x + y,
                OpCode::Sub => x - y,
                OpCode::Mul => x * y,
                OpCode::Div => x / y,
                OpCode::Mod => x - (x / y).floor() * y,
                OpCode::Pow => x.powf(y),
                OpCode::Unm => -x,
                _ => unreachable!(),
            }));
        }
        let mm = match op {
            OpCode::Add => Metamethod::Add,
            OpCode::Sub => Metamethod::Sub,
            OpCode::Mul => Metamethod::Mul,
            OpCode::Div => Metamethod::Div,
            OpCode::Mod => Metamethod::Mod,
            OpCode::Pow => Metamethod::Pow,
            OpCode::Unm => Metamethod::Unm,
            _ => unreachable!(),
        };
        if let Some(handler) = get_metamethod(&a, mm, &self.names).or_else(|| get_metamethod(&b, mm, &self.names)) {
            return self.call_single(handler, vec![a, b]);
        }
        let bad = if coerce_number(a).is_none() { a } else { b };
        Err(self.runtime_error_msg(format!("attempt to perform arithmetic on a {} value", bad.type_name())))
    }

    fn compare(&mut self, op: OpCode, a: Value, b: Value) -> EmberResult<bool> {
        match op {
            OpCode::Eq => {
                if a.raw_equals(&b) {
                    return Ok(true);
                }
                if let (Some(ga), Some(gb)) = (a.as_gc(), b.as_gc()) {
                    if matches!(ga.object(), GcObject::Table(_)) && matches!(gb.object(), GcObject::Table(_)) {
                        if let Some(handler) = get_metamethod(&a, Metamethod::Eq, &self.names) {
                            return Ok(self.call_single(handler, vec![a, b])?.is_truthy());
                        }
                    }
                }
                Ok(false)
            }
            OpCode::Lt | OpCode::Le => {
                if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
                    return Ok(if op == OpCode::Lt { x < y } else { x <= y });
                }
                if let (Some(ga), Some(gb)) = (a.as_gc(), b.as_gc()) {
                    if let (GcObject::Str(sa), GcObject::Str(sb)) = (ga.object(), gb.object()) {
                        return Ok(if op == OpCode::Lt {
                            sa.as_bytes() < sb.as_bytes()
                        } else {
                            sa.as_bytes() <= sb.as_bytes()
                        });
                    }
                }
                let mm = if op == OpCode::Lt { Metamethod::Lt } else { Metamethod::Le };
                if let Some(handler) = get_metamethod(&a, mm, &self.names).or_else(|| get_metamethod(&b, mm, &self.names)) {
                    return Ok(self.call_single(handler, vec![a, b])?.is_truthy());
                }
                Err(self.runtime_error_msg(format!("attempt to compare {} with {}", a.type_name(), b.type_name())))
            }
            _ => unreachable!(),
        }
    }

    fn length_of(&mut self, v: Value) -> EmberResult<Value> {
        if let Some(g) = v.as_gc() {
            match g.object() {
                GcObject::Str(s) => return Ok(Value::number(s.len() as f64)),
                GcObject::Table(t) => {
                    if let Some(handler) = get_metamethod(&v, Metamethod::Len, &self.names) {
                        return self.call_single(handler, vec![v]);
                    }
                    return Ok(Value::number(t.length() as f64));
                }
                _ => {}
            }
        }
        Err(self.runtime_error_msg(format!("attempt to get length of a {} value", v.type_name())))
    }

    fn concat(&mut self, vals: &[Value]) -> EmberResult<Value> {
        let mut out: Vec<u8> = Vec::new();
        for v in vals {
            if let Some(n) = v.as_number() {
                out.extend(format!("{n}").into_bytes());
                continue;
            }
            if let Some(g) = v.as_gc() {
                if let GcObject::Str(s) = g.object() {
                    out.extend(s.as_bytes());
                    continue;
                }
                if let Some(handler) = get_metamethod(v, Metamethod::Concat, &self.names) {
                    let result = self.call_single(handler, vec![*v, Value::nil()])?;
                    if let Some(bytes) = result.as_gc().and_then(|g| g.object().as_str().map(|s| s.as_bytes().to_vec())) {
                        out.extend(bytes);
                        continue;
                    }
                }
            }
            return Err(self.runtime_error_msg(format!("attempt to concatenate a {} value", v.type_name())));
        }
        Ok(self.intern_str(&out))
    }
}

fn is_callable(v: &Value) -> bool {
    v.as_gc()
        .map(|g| matches!(g.object(), GcObject::Closure(_) | GcObject::Native(_)))
        .unwrap_or(false)
}

enum Step {
    Continue,
    Yielded(Vec<Value>),
}

fn coerce_number(v: Value) -> Option<f64> {
    if let Some(n) = v.as_number() {
        return Some(n);
    }
    v.as_gc()
        .and_then(|g| g.object().as_str().map(|s| s.as_str_lossy().trim().parse::<f64>().ok()))
        .flatten()
}

fn number_operand(v: Value, what: &str) -> EmberResult<f64> {
    coerce_number(v).ok_or_else(|| EmberError::runtime_msg(format!("{what} must be a number")))
}

fn adjust_results(mut results: Vec<Value>, want: i32) -> Vec<Value> {
    if want < 0 {
        return results;
    }
    results.resize(want as usize, Value::nil());
    results
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
