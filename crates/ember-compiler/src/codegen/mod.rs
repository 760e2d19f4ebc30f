//! The code generator (component I): turns `ast` expressions/statements
//! into a `Prototype`'s bytecode, constant pool, and debug info.
//!
//! This module holds the driver (`Codegen`), the register-materialization
//! ("discharge") functions that turn an `ExpDesc` into a concrete value in
//! a register, and name resolution across nested function scopes. Control
//! flow lives in `control.rs`, expression lowering in `expr.rs`, statement
//! lowering in `stmt.rs`.

mod control;
mod expr;
mod stmt;

use crate::ast::Block;
use crate::error::{CompileError, CompileResult};
use crate::expdesc::{ExpDesc, ExpKind, NO_JUMP};
use crate::funcstate::{FuncState, MAX_FUNC_NESTING};
use ember_bytecode::constant::Constant;
use ember_bytecode::instruction::Instruction;
use ember_bytecode::opcode::OpCode;
use ember_bytecode::prototype::{Prototype, UpvalDesc, UpvalSource};
use std::sync::Arc;

pub struct Codegen {
    stack: Vec<FuncState>,
}

impl Codegen {
    pub fn new() -> Self {
        Codegen { stack: Vec::new() }
    }

    /// Compiles a top-level chunk into its root prototype. The chunk is
    /// itself a vararg function of zero parameters, matching how a script
    /// file is loaded.
    pub fn compile_chunk(&mut self, body: &Block, source_name: Option<String>) -> CompileResult<Prototype> {
        self.open_function(source_name, &[], true, 0)?;
        self.compile_block(body)?;
        let proto = self.close_function(0)?;
        Ok(proto)
    }

    fn fs(&mut self) -> &mut FuncState {
        self.stack.last_mut().expect("no active function")
    }

    fn fs_at(&mut self, level: usize) -> &mut FuncState {
        &mut self.stack[level]
    }

    fn level(&self) -> usize {
        self.stack.len() - 1
    }

    // ---- function scope --------------------------------------------------

    fn open_function(
        &mut self,
        source_name: Option<String>,
        params: &[String],
        is_vararg: bool,
        line: u32,
    ) -> CompileResult<()> {
        if self.stack.len() >= MAX_FUNC_NESTING {
            return Err(CompileError::FunctionNestingTooDeep);
        }
        let mut fs = FuncState::new(source_name, line);
        fs.is_vararg = is_vararg;
        fs.num_params = params.len() as u8;
        self.stack.push(fs);
        for p in params {
            self.fs().new_local(p.clone(), 0)?;
        }
        self.fs().freereg = self.fs().num_active_locals();
        self.fs().check_stack(0)?;
        Ok(())
    }

    fn close_function(&mut self, end_line: u32) -> CompileResult<Prototype> {
        self.fs().patch_pending_to_here();
        let needs_return = !matches!(
            self.fs().code.last().map(|i| i.opcode()),
            Some(OpCode::Return) | Some(OpCode::TailCall)
        );
        if needs_return {
            self.emit_return(&[])?;
        }
        let mut fs = self.stack.pop().expect("close_function without open");
        fs.last_line_defined = end_line;
        Ok(fs.finish())
    }

    fn emit_return(&mut self, _regs: &[u8]) -> CompileResult<()> {
        let line = 0;
        self.fs().emit(Instruction::abc(OpCode::Return, 0, 1, 0), line);
        Ok(())
    }

    /// Compiles a nested function literal: opens a fresh `FuncState`, lowers
    /// its body, closes it into a child `Prototype`, then emits the
    /// enclosing function's `CLOSURE` plus one upvalue pseudo-instruction
    /// per captured variable (spec §4.2 "Closure creation").
    pub(crate) fn compile_function_expr(
        &mut self,
        body: &crate::ast::FunctionBody,
    ) -> CompileResult<ExpDesc> {
        let source_name = self.fs().source_name.clone();
        self.open_function(source_name, &body.params, body.is_vararg, body.line)?;
        self.compile_block(&body.body)?;
        let proto = self.close_function(body.line)?;
        let upvalues = proto.upvalues.clone();

        let proto_idx = self.fs().prototypes.len() as u32;
        self.fs().prototypes.push(Arc::new(proto));
        let pc = self
            .fs()
            .emit(Instruction::abx(OpCode::Closure, 0, proto_idx), body.line);
        for up in &upvalues {
            match up.source {
                UpvalSource::Local(reg) => {
                    self.fs().emit(Instruction::abc(OpCode::Move, 0, reg as u32, 0), body.line);
                }
                UpvalSource::Upval(idx) => {
                    self.fs()
                        .emit(Instruction::abc(OpCode::GetUpval, 0, idx as u32, 0), body.line);
                }
            }
        }
        Ok(ExpDesc::new(ExpKind::Relocable(pc)))
    }

    // ---- name resolution ---------------------------------------------------

    /// Resolves `name` as seen from function nesting `level`: a local of
    /// that function, an upvalue chasing outward through enclosing
    /// functions, or (at the outermost level) a global.
    fn resolve_name(&mut self, level: usize, name: &str) -> CompileResult<ExpKind> {
        if let Some(reg) = self.stack[level].resolve_local(name) {
            return Ok(ExpKind::Local(reg));
        }
        if level == 0 {
            let idx = self.fs_at(0).addk(Constant::Str(name.as_bytes().to_vec()))?;
            return Ok(ExpKind::Global(idx));
        }
        if let Some(idx) = self.stack[level]
            .upvalues
            .iter()
            .position(|u| u.name == name)
        {
            return Ok(ExpKind::Upval(idx as u8));
        }
        let outer = self.resolve_name(level - 1, name)?;
        match outer {
            ExpKind::Local(reg) => {
                self.stack[level - 1].mark_upval_in_enclosing_blocks(reg);
                let idx = self.add_upvalue(level, name, UpvalSource::Local(reg))?;
                Ok(ExpKind::Upval(idx))
            }
            ExpKind::Upval(up_idx) => {
                let idx = self.add_upvalue(level, name, UpvalSource::Upval(up_idx))?;
                Ok(ExpKind::Upval(idx))
            }
            global @ ExpKind::Global(_) => Ok(global),
            _ => unreachable!("resolve_name only ever returns Local/Upval/Global"),
        }
    }

    fn add_upvalue(&mut self, level: usize, name: &str, source: UpvalSource) -> CompileResult<u8> {
        let fs = &mut self.stack[level];
        if fs.upvalues.len() >= ember_bytecode::instruction::MAX_A as usize {
            return Err(CompileError::TooManyUpvalues);
        }
        let idx = fs.upvalues.len() as u8;
        fs.upvalues.push(UpvalDesc {
            name: name.to_string(),
            source,
        });
        Ok(idx)
    }

    // ---- register materialization ("discharge") ---------------------------

    /// Forces a non-relocable, jump-list-free descriptor into some concrete
    /// register, preferring to reuse one it's already in.
    pub(crate) fn exp2anyreg(&mut self, e: &mut ExpDesc) -> CompileResult<u8> {
        self.discharge_vars(e);
        if let ExpKind::NonReloc(r) = e.kind {
            if !e.has_jumps() {
                return Ok(r);
            }
            // Has pending jumps: must land in a single concrete register so
            // every branch agrees on where the value lives. A register
            // already holding a local can't be reused as scratch for that,
            // so fall through to reserving a fresh one; otherwise reuse it.
            if r >= self.fs().num_active_locals() {
                self.exp2reg(e, r)?;
                return Ok(r);
            }
        }
        self.exp2nextreg(e)
    }

    /// Reserves the next free register and materializes `e` into it.
    pub(crate) fn exp2nextreg(&mut self, e: &mut ExpDesc) -> CompileResult<u8> {
        self.discharge_vars(e);
        self.free_exp(e);
        self.fs().reserve_regs(1)?;
        let reg = self.fs().freereg - 1;
        self.exp2reg(e, reg)?;
        Ok(reg)
    }

    /// Materializes `e` into exactly register `reg`. If `e` carries pending
    /// true/false jump lists (the result of a comparison or `and`/`or`
    /// chain), this also emits the `LOADBOOL` pair that turns those jumps
    /// into an actual boolean value in `reg`.
    pub(crate) fn exp2reg(&mut self, e: &mut ExpDesc, reg: u8) -> CompileResult<()> {
        let line = 0;
        self.discharge2reg(e, reg)?;
        if let ExpKind::Jmp(pc) = e.kind {
            let mut t = e.t;
            self.fs().concat(&mut t, pc);
            e.t = t;
        }
        if e.has_jumps() {
            let mut p_f = NO_JUMP;
            let mut p_t = NO_JUMP;
            if self.fs().need_value(e.t) || self.fs().need_value(e.f) {
                let fj = if matches!(e.kind, ExpKind::Jmp(_)) {
                    NO_JUMP
                } else {
                    self.fs().jump(line)
                };
                p_f = self
                    .fs()
                    .emit(Instruction::abc(OpCode::LoadBool, reg as u32, 0, 1), line);
                p_t = self
                    .fs()
                    .emit(Instruction::abc(OpCode::LoadBool, reg as u32, 1, 0), line);
                self.fs().patch_to_here(fj);
            }
            let here = self.fs().pc();
            self.fs().patch_list_aux(e.f, here, reg as i32, p_f);
            self.fs().patch_list_aux(e.t, here, reg as i32, p_t);
        }
        e.t = NO_JUMP;
        e.f = NO_JUMP;
        e.kind = ExpKind::NonReloc(reg);
        Ok(())
    }

    /// Discharges `e` (which must not have pending jumps) into register
    /// `reg` without touching jump lists.
    fn discharge2reg(&mut self, e: &mut ExpDesc, reg: u8) -> CompileResult<()> {
        self.discharge_vars(e);
        let line = 0;
        match e.kind.clone() {
            ExpKind::Nil => {
                self.fs().emit(Instruction::abc(OpCode::LoadNil, reg as u32, 1, 0), line);
            }
            ExpKind::True => {
                self.fs().emit(Instruction::abc(OpCode::LoadBool, reg as u32, 1, 0), line);
            }
            ExpKind::False => {
                self.fs().emit(Instruction::abc(OpCode::LoadBool, reg as u32, 0, 0), line);
            }
            ExpKind::KNum(n) => {
                let idx = self.fs().addk(Constant::Number(n))?;
                self.fs().emit(Instruction::abx(OpCode::LoadK, reg as u32, idx), line);
            }
            ExpKind::K(idx) => {
                self.fs().emit(Instruction::abx(OpCode::LoadK, reg as u32, idx), line);
            }
            ExpKind::NonReloc(src) => {
                if src != reg {
                    self.fs().emit(Instruction::abc(OpCode::Move, reg as u32, src as u32, 0), line);
                }
            }
            ExpKind::Relocable(pc) => {
                self.fs().code[pc as usize].set_a(reg as u32);
            }
            ExpKind::Call(pc) => {
                // Fix the CALL's C operand to want exactly one result, then
                // move it into `reg` if not already there.
                let inst = self.fs().code[pc as usize];
                self.fs().code[pc as usize] = Instruction::abc(OpCode::Call, inst.a(), inst.b(), 2);
                if inst.a() != reg as u32 {
                    self.fs().emit(Instruction::abc(OpCode::Move, reg as u32, inst.a(), 0), line);
                }
            }
            ExpKind::Vararg(pc) => {
                let inst = self.fs().code[pc as usize];
                self.fs().code[pc as usize] = Instruction::abc(OpCode::Vararg, reg as u32, 2, 0);
                let _ = inst;
            }
            ExpKind::Void => {}
            ExpKind::Jmp(_) => {
                // Values with a pending comparison jump are resolved by the
                // has_jumps() path in exp2reg, not here.
            }
            ExpKind::Local(src) => {
                if src != reg {
                    self.fs().emit(Instruction::abc(OpCode::Move, reg as u32, src as u32, 0), line);
                }
            }
            ExpKind::Upval(_) | ExpKind::Global(_) | ExpKind::Indexed { .. } => {
                unreachable!("discharge_vars must resolve these before discharge2reg")
            }
        }
        e.kind = ExpKind::NonReloc(reg);
        Ok(())
    }

    /// Resolves `Local`/`Upval`/`Global`/`Indexed` into a concrete register
    /// or relocable instruction, leaving everything else untouched.
    fn discharge_vars(&mut self, e: &mut ExpDesc) {
        let line = 0;
        match e.kind.clone() {
            ExpKind::Local(r) => {
                e.kind = ExpKind::NonReloc(r);
            }
            ExpKind::Upval(idx) => {
                let pc = self.fs().emit(Instruction::abc(OpCode::GetUpval, 0, idx as u32, 0), line);
                e.kind = ExpKind::Relocable(pc);
            }
            ExpKind::Global(k) => {
                let pc = self.fs().emit(Instruction::abx(OpCode::GetGlobal, 0, k), line);
                e.kind = ExpKind::Relocable(pc);
            }
            ExpKind::Indexed { table, key } => {
                self.fs().free_reg_rk(key);
                self.fs().free_reg(table);
                let pc = self.fs().emit(Instruction::abc(OpCode::GetTable, 0, table as u32, key), line);
                e.kind = ExpKind::Relocable(pc);
            }
            _ => {}
        }
    }

    /// Frees any register(s) an expression is occupying (LIFO discipline).
    fn free_exp(&mut self, e: &ExpDesc) {
        if let ExpKind::NonReloc(r) = e.kind {
            self.fs().free_reg(r);
        }
    }

    /// Yields an RK operand for `e`: either a register index, or (for
    /// constant-shaped expressions, when there's room) an encoded constant
    /// index.
    pub(crate) fn exp2rk(&mut self, e: &mut ExpDesc) -> CompileResult<u32> {
        self.discharge_vars(e);
        match e.kind.clone() {
            ExpKind::Nil => {
                let idx = self.fs().addk(Constant::Nil)?;
                self.try_const_rk(idx)
            }
            ExpKind::True => {
                let idx = self.fs().addk(Constant::Bool(true))?;
                self.try_const_rk(idx)
            }
            ExpKind::False => {
                let idx = self.fs().addk(Constant::Bool(false))?;
                self.try_const_rk(idx)
            }
            ExpKind::KNum(n) => {
                let idx = self.fs().addk(Constant::Number(n))?;
                self.try_const_rk(idx)
            }
            ExpKind::K(idx) => self.try_const_rk(idx),
            _ => Ok(self.exp2anyreg(e)? as u32),
        }
    }

    fn try_const_rk(&mut self, idx: u32) -> CompileResult<u32> {
        if idx <= ember_bytecode::instruction::MAX_INDEX_RK {
            Ok(ember_bytecode::instruction::rk_const(idx))
        } else {
            Err(CompileError::ConstantTableOverflow)
        }
    }

    /// Forces concrete materialization of `e` if it has pending jump lists
    /// (turns a comparison result into an actual boolean in a register).
    pub(crate) fn exp2val(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        if e.has_jumps() {
            self.exp2anyreg(e)?;
        } else {
            self.discharge_vars(e);
        }
        Ok(())
    }
}

impl FuncState {
    fn free_reg_rk(&mut self, rk: u32) {
        if !ember_bytecode::instruction::is_k(rk) {
            self.free_reg(rk as u8);
        }
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new()
    }
}
