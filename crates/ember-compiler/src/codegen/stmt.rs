//! Statement lowering (spec §4.2): assignment, control flow, loops,
//! function declarations, and `return`/`break`.

use super::Codegen;
use crate::ast::{Block, Expr, Stat};
use crate::error::{CompileError, CompileResult};
use crate::expdesc::{ExpDesc, ExpKind, NO_JUMP};
use ember_bytecode::constant::Constant;
use ember_bytecode::instruction::Instruction;
use ember_bytecode::opcode::OpCode;

impl Codegen {
    pub(crate) fn compile_block(&mut self, block: &Block) -> CompileResult<()> {
        for stat in block {
            self.compile_stat(stat)?;
        }
        Ok(())
    }

    fn compile_stat(&mut self, stat: &Stat) -> CompileResult<()> {
        match stat {
            Stat::ExprStat(e) => {
                let mut v = self.compile_expr(e)?;
                // Expression statements only make sense for calls; discard
                // any register they occupy immediately.
                if let ExpKind::NonReloc(r) = v.kind {
                    self.fs().free_reg(r);
                } else {
                    self.exp2nextreg(&mut v)?;
                    if let ExpKind::NonReloc(r) = v.kind {
                        self.fs().free_reg(r);
                    }
                }
                Ok(())
            }
            Stat::Local(names, exprs) => self.compile_local(names, exprs),
            Stat::Assign(targets, exprs) => self.compile_assign(targets, exprs),
            Stat::If(arms, else_block) => self.compile_if(arms, else_block),
            Stat::While(cond, body) => self.compile_while(cond, body),
            Stat::Repeat(body, cond) => self.compile_repeat(body, cond),
            Stat::NumericFor { var, start, stop, step, body } => {
                self.compile_numeric_for(var, start, stop, step.as_ref(), body)
            }
            Stat::GenericFor { vars, exprs, body } => self.compile_generic_for(vars, exprs, body),
            Stat::LocalFunction(name, func) => self.compile_local_function(name, func),
            Stat::FunctionDecl(target, func) => self.compile_function_decl(target, func),
            Stat::Return(exprs) => self.compile_return(exprs),
            Stat::Break => self.compile_break(),
            Stat::Do(block) => {
                let breaks = self.compile_scoped_block(block, false)?;
                debug_assert_eq!(breaks, NO_JUMP, "break outside a loop should be rejected earlier");
                Ok(())
            }
        }
    }

    // ---- locals / assignment ------------------------------------------------

    fn compile_local(&mut self, names: &[String], exprs: &[Expr]) -> CompileResult<()> {
        self.compile_expr_list_to_regs(exprs, names.len())?;
        let base = self.fs().freereg - names.len() as u8;
        let pc = self.fs().pc() as u32;
        for (i, name) in names.iter().enumerate() {
            let reg = self.fs().new_local(name.clone(), pc)?;
            debug_assert_eq!(reg, base + i as u8);
        }
        Ok(())
    }

    fn compile_assign(&mut self, targets: &[Expr], exprs: &[Expr]) -> CompileResult<()> {
        // Pre-resolve every target before evaluating any value, so
        // `a, b = b, a` reads both old values before either is clobbered.
        let mut lhs = Vec::with_capacity(targets.len());
        for target in targets {
            lhs.push(self.compile_assign_target(target)?);
        }
        let base = self.fs().freereg;
        self.compile_expr_list_to_regs(exprs, targets.len())?;
        for (i, target) in lhs.into_iter().enumerate().rev() {
            let src = base + i as u8;
            self.store_to_target(target, src)?;
        }
        Ok(())
    }

    /// What an assignable expression resolves to, captured before the RHS
    /// is evaluated.
    fn compile_assign_target(&mut self, target: &Expr) -> CompileResult<AssignTarget> {
        match target {
            Expr::Ident(name) => {
                let level = self.level();
                match self.resolve_name(level, name)? {
                    ExpKind::Local(reg) => Ok(AssignTarget::Local(reg)),
                    ExpKind::Upval(idx) => Ok(AssignTarget::Upval(idx)),
                    ExpKind::Global(k) => Ok(AssignTarget::Global(k)),
                    _ => unreachable!(),
                }
            }
            Expr::Field(t, name) => {
                let idx = self.fs().addk(Constant::Str(name.as_bytes().to_vec()))?;
                let mut table = self.compile_expr(t)?;
                let treg = self.exp2anyreg(&mut table)?;
                Ok(AssignTarget::Indexed {
                    table: treg,
                    key: ember_bytecode::instruction::rk_const(idx),
                })
            }
            Expr::Index(t, k) => {
                let mut table = self.compile_expr(t)?;
                let treg = self.exp2anyreg(&mut table)?;
                let mut key = self.compile_expr(k)?;
                let krk = self.exp2rk(&mut key)?;
                Ok(AssignTarget::Indexed { table: treg, key: krk })
            }
            _ => Err(CompileError::UnresolvedAssignTarget(format!("{:?}", target))),
        }
    }

    fn store_to_target(&mut self, target: AssignTarget, src: u8) -> CompileResult<()> {
        match target {
            AssignTarget::Local(reg) => {
                if reg != src {
                    self.fs().emit(Instruction::abc(OpCode::Move, reg as u32, src as u32, 0), 0);
                }
            }
            AssignTarget::Upval(idx) => {
                self.fs().emit(Instruction::abc(OpCode::SetUpval, src as u32, idx as u32, 0), 0);
            }
            AssignTarget::Global(k) => {
                self.fs().emit(Instruction::abx(OpCode::SetGlobal, src as u32, k), 0);
            }
            AssignTarget::Indexed { table, key } => {
                self.fs()
                    .emit(Instruction::abc(OpCode::SetTable, table as u32, key, src as u32), 0);
                self.fs().free_reg(table);
            }
        }
        Ok(())
    }

    /// Evaluates `exprs` into exactly `want` consecutive fresh registers,
    /// padding with `nil` or truncating a trailing multi-result expression
    /// as needed (spec's "adjust to N values" rule).
    fn compile_expr_list_to_regs(&mut self, exprs: &[Expr], want: usize) -> CompileResult<()> {
        if exprs.is_empty() {
            if want > 0 {
                self.fs().reserve_regs(want as u8)?;
                let base = self.fs().freereg - want as u8;
                self.fs().emit(Instruction::abc(OpCode::LoadNil, base as u32, (want - 1) as u32, 0), 0);
            }
            return Ok(());
        }
        for (i, expr) in exprs.iter().enumerate() {
            let is_last = i + 1 == exprs.len();
            let mut v = self.compile_expr(expr)?;
            if is_last && v.is_multi_result() && want > exprs.len() {
                self.setup_multret(&mut v)?;
                self.exp2nextreg(&mut v)?;
                let extra = want - exprs.len();
                self.fs().reserve_regs(extra as u8)?;
                // Fix the CALL/VARARG's want count to exactly the slots available.
                self.patch_multret_count(&v, (extra + 1) as u32);
            } else if is_last && exprs.len() > want {
                // More expressions than wanted: evaluate for side effects,
                // discard the overflow registers (simplification: we still
                // materialize them since register pressure beats silent
                // skips for this generator).
                self.exp2nextreg(&mut v)?;
            } else {
                self.exp2nextreg(&mut v)?;
            }
        }
        if exprs.len() > want {
            let overflow = exprs.len() - want;
            let top = self.fs().freereg;
            self.fs().freereg = top - overflow as u8;
        }
        Ok(())
    }

    fn patch_multret_count(&mut self, v: &ExpDesc, count: u32) {
        match v.kind {
            ExpKind::Call(pc) | ExpKind::Vararg(pc) => {
                let c_field = count + 1;
                match self.fs().code[pc as usize].opcode() {
                    OpCode::Call => self.fs().code[pc as usize].set_c(c_field),
                    OpCode::Vararg => self.fs().code[pc as usize].set_b(c_field),
                    _ => {}
                }
            }
            _ => {}
        }
    }

    // ---- control flow -------------------------------------------------------

    fn compile_if(&mut self, arms: &[(Expr, Block)], else_block: &Option<Block>) -> CompileResult<()> {
        let mut exit_jumps = NO_JUMP;
        let mut prev_false_list: Option<i32> = None;

        for (i, (cond, body)) in arms.iter().enumerate() {
            if let Some(f) = prev_false_list.take() {
                self.fs().patch_pending_to_here();
                let here = self.fs().pc();
                self.fs().patch_list(f, here);
            }
            let mut c = self.compile_expr(cond)?;
            self.go_if_true(&mut c)?;
            let false_list = c.f;
            self.compile_scoped_block(body, false)?;
            let is_last_arm = i + 1 == arms.len();
            if !is_last_arm || else_block.is_some() {
                let j = self.fs().jump(0);
                let mut e = exit_jumps;
                self.fs().concat(&mut e, j);
                exit_jumps = e;
            }
            prev_false_list = Some(false_list);
        }
        if let Some(f) = prev_false_list {
            self.fs().patch_pending_to_here();
            let here = self.fs().pc();
            self.fs().patch_list(f, here);
        }
        if let Some(block) = else_block {
            self.compile_scoped_block(block, false)?;
        }
        self.fs().patch_pending_to_here();
        let here = self.fs().pc();
        self.fs().patch_list(exit_jumps, here);
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &Block) -> CompileResult<()> {
        let loop_start = self.fs().pc();
        let mut c = self.compile_expr(cond)?;
        self.go_if_true(&mut c)?;
        let exit_list = c.f;
        let break_list = self.compile_scoped_block(body, true)?;
        let back = self.fs().jump(0);
        self.fs().patch_list(back, loop_start);
        self.fs().patch_pending_to_here();
        let here = self.fs().pc();
        self.fs().patch_list(exit_list, here);
        self.fs().patch_list(break_list, here);
        Ok(())
    }

    fn compile_repeat(&mut self, body: &Block, cond: &Expr) -> CompileResult<()> {
        let loop_start = self.fs().pc();
        self.fs().enter_block(true);
        self.compile_block(body)?;
        // `repeat ... until cond` evaluates `cond` still inside the body's
        // scope, so locals declared in the body are visible to it.
        let mut c = self.compile_expr(cond)?;
        self.go_if_false(&mut c)?;
        let true_list = c.t;
        let break_list = self.leave_current_block()?;
        let back = self.fs().jump(0);
        self.fs().patch_list(back, loop_start);
        // `until` false (true_list) falls through to repeating the loop;
        // true exits, so patch the exit to the jump's target, the break
        // list to here.
        self.fs().patch_list(true_list, loop_start);
        self.fs().patch_pending_to_here();
        let here = self.fs().pc();
        self.fs().patch_list(break_list, here);
        Ok(())
    }

    fn compile_numeric_for(
        &mut self,
        var: &str,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        body: &Block,
    ) -> CompileResult<()> {
        self.fs().enter_block(true);
        let mut s = self.compile_expr(start)?;
        self.exp2nextreg(&mut s)?;
        let mut e = self.compile_expr(stop)?;
        self.exp2nextreg(&mut e)?;
        let mut st = match step {
            Some(expr) => self.compile_expr(expr)?,
            None => ExpDesc::new(ExpKind::KNum(1.0)),
        };
        self.exp2nextreg(&mut st)?;
        let base = self.fs().freereg - 3;
        self.fs().new_local("(for index)".into(), 0)?;
        self.fs().new_local("(for limit)".into(), 0)?;
        self.fs().new_local("(for step)".into(), 0)?;
        let pc0 = self.fs().pc() as u32;
        self.fs().new_local(var.to_string(), pc0)?;
        self.fs().reserve_regs(1)?;

        let prep_pc = self.fs().emit(Instruction::asbx(OpCode::ForPrep, base as u32, NO_JUMP), 0);
        self.compile_block(body)?;
        let break_list = self.leave_current_block()?;
        let loop_pc = self.fs().pc();
        self.fs().code[prep_pc as usize].set_sbx(loop_pc - prep_pc - 1);
        let end_pc = self.fs().emit(Instruction::asbx(OpCode::ForLoop, base as u32, NO_JUMP), 0);
        self.fs().code[end_pc as usize].set_sbx(prep_pc + 1 - end_pc - 1);
        self.fs().patch_pending_to_here();
        let here = self.fs().pc();
        self.fs().patch_list(break_list, here);
        self.fs().freereg = base;
        Ok(())
    }

    fn compile_generic_for(&mut self, vars: &[String], exprs: &[Expr], body: &Block) -> CompileResult<()> {
        self.fs().enter_block(true);
        self.compile_expr_list_to_regs(exprs, 3)?;
        let base = self.fs().freereg - 3;
        self.fs().new_local("(for generator)".into(), 0)?;
        self.fs().new_local("(for state)".into(), 0)?;
        self.fs().new_local("(for control)".into(), 0)?;
        let pc0 = self.fs().pc() as u32;
        for v in vars {
            self.fs().new_local(v.clone(), pc0)?;
        }
        self.fs().reserve_regs(vars.len() as u8)?;

        let prep = self.fs().jump(0);
        let loop_start = self.fs().pc();
        self.compile_block(body)?;
        self.fs().patch_pending_to_here();
        let here = self.fs().pc();
        self.fs().patch_list(prep, here);
        self.fs()
            .emit(Instruction::abc(OpCode::TForLoop, base as u32, 0, vars.len() as u32), 0);
        let back = self.fs().jump(0);
        self.fs().patch_list(back, loop_start);

        let break_list = self.leave_current_block()?;
        self.fs().patch_pending_to_here();
        let here = self.fs().pc();
        self.fs().patch_list(break_list, here);
        self.fs().freereg = base;
        Ok(())
    }

    fn compile_break(&mut self) -> CompileResult<()> {
        let loop_block = self.fs().blocks.iter().rposition(|b| b.is_loop);
        let Some(idx) = loop_block else {
            return Err(CompileError::BreakOutsideLoop);
        };
        let jmp = self.fs().jump(0);
        let mut list = self.fs().blocks[idx].break_list;
        self.fs().concat(&mut list, jmp);
        self.fs().blocks[idx].break_list = list;
        Ok(())
    }

    // ---- functions ------------------------------------------------------

    fn compile_local_function(&mut self, name: &str, func: &crate::ast::FunctionBody) -> CompileResult<()> {
        // The local is declared before the body is compiled so the function
        // can recurse by name.
        let pc = self.fs().pc() as u32;
        let reg = self.fs().new_local(name.to_string(), pc)?;
        self.fs().reserve_regs(1)?;
        let mut closure = self.compile_function_expr(func)?;
        self.exp2reg(&mut closure, reg)?;
        Ok(())
    }

    fn compile_function_decl(&mut self, target: &Expr, func: &crate::ast::FunctionBody) -> CompileResult<()> {
        let assign_target = self.compile_assign_target(target)?;
        let mut closure = self.compile_function_expr(func)?;
        let reg = self.exp2nextreg(&mut closure)?;
        self.store_to_target(assign_target, reg)?;
        self.fs().free_reg(reg);
        Ok(())
    }

    fn compile_return(&mut self, exprs: &[Expr]) -> CompileResult<()> {
        if exprs.is_empty() {
            self.fs().emit(Instruction::abc(OpCode::Return, 0, 1, 0), 0);
            return Ok(());
        }
        let base = self.fs().freereg;
        let mut open = false;
        for (i, expr) in exprs.iter().enumerate() {
            let is_last = i + 1 == exprs.len();
            let mut v = self.compile_expr(expr)?;
            if is_last && v.is_multi_result() {
                self.setup_multret(&mut v)?;
                open = true;
            } else {
                self.exp2nextreg(&mut v)?;
            }
        }
        let b = if open { 0 } else { exprs.len() as u32 + 1 };
        self.fs().emit(Instruction::abc(OpCode::Return, base as u32, b, 0), 0);
        Ok(())
    }
}

enum AssignTarget {
    Local(u8),
    Upval(u8),
    Global(u32),
    Indexed { table: u8, key: u32 },
}
