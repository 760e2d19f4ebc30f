//! Expression lowering: `ast::Expr` -> `ExpDesc`, plus the operator-specific
//! codegen (arithmetic with constant folding, comparisons, short-circuit
//! `and`/`or`, concatenation, table constructors, calls) described in spec
//! §4.2.

use super::Codegen;
use crate::ast::{BinOp, Expr, TableField, UnOp};
use crate::error::CompileResult;
use crate::expdesc::{ExpDesc, ExpKind, NO_JUMP};
use crate::fold;
use ember_bytecode::constant::Constant;
use ember_bytecode::instruction::Instruction;
use ember_bytecode::opcode::OpCode;

impl Codegen {
    pub(crate) fn compile_expr(&mut self, expr: &Expr) -> CompileResult<ExpDesc> {
        match expr {
            Expr::Nil => Ok(ExpDesc::new(ExpKind::Nil)),
            Expr::True => Ok(ExpDesc::new(ExpKind::True)),
            Expr::False => Ok(ExpDesc::new(ExpKind::False)),
            Expr::Number(n) => Ok(ExpDesc::new(ExpKind::KNum(*n))),
            Expr::Str(s) => {
                let idx = self.fs().addk(Constant::Str(s.as_bytes().to_vec()))?;
                Ok(ExpDesc::new(ExpKind::K(idx)))
            }
            Expr::Vararg => {
                let pc = self.fs().emit(Instruction::abc(OpCode::Vararg, 0, 1, 0), 0);
                Ok(ExpDesc::new(ExpKind::Vararg(pc)))
            }
            Expr::Ident(name) => {
                let level = self.level();
                let kind = self.resolve_name(level, name)?;
                Ok(ExpDesc::new(kind))
            }
            Expr::Paren(inner) => {
                let mut e = self.compile_expr(inner)?;
                // Parentheses truncate a multi-result expression to exactly
                // one value.
                if e.is_multi_result() {
                    self.exp2nextreg(&mut e)?;
                }
                Ok(e)
            }
            Expr::Index(t, k) => self.compile_index(t, k),
            Expr::Field(t, name) => {
                let idx = self.fs().addk(Constant::Str(name.as_bytes().to_vec()))?;
                let mut table = self.compile_expr(t)?;
                let treg = self.exp2anyreg(&mut table)?;
                Ok(ExpDesc::new(ExpKind::Indexed {
                    table: treg,
                    key: ember_bytecode::instruction::rk_const(idx),
                }))
            }
            Expr::Call(callee, args) => self.compile_call(callee, args, None),
            Expr::MethodCall(recv, method, args) => self.compile_call(recv, args, Some(method)),
            Expr::Function(body) => self.compile_function_expr(body),
            Expr::Table(fields) => self.compile_table(fields),
            Expr::Binary(op, a, b) => self.compile_binary(op, a, b),
            Expr::Unary(op, a) => self.compile_unary(op, a),
        }
    }

    fn compile_index(&mut self, t: &Expr, k: &Expr) -> CompileResult<ExpDesc> {
        let mut table = self.compile_expr(t)?;
        let treg = self.exp2anyreg(&mut table)?;
        let mut key = self.compile_expr(k)?;
        let krk = self.exp2rk(&mut key)?;
        Ok(ExpDesc::new(ExpKind::Indexed { table: treg, key: krk }))
    }

    // ---- calls --------------------------------------------------------------

    fn compile_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        method: Option<&str>,
    ) -> CompileResult<ExpDesc> {
        let mut func = self.compile_expr(callee)?;
        let base = self.exp2nextreg(&mut func)?;
        let mut nargs = 0u32;
        let mut implicit_self = false;

        if let Some(name) = method {
            let idx = self.fs().addk(Constant::Str(name.as_bytes().to_vec()))?;
            let key = ember_bytecode::instruction::rk_const(idx);
            self.fs().reserve_regs(1)?;
            self.fs().emit(Instruction::abc(OpCode::SelfOp, base as u32, base as u32, key), 0);
            implicit_self = true;
        }
        if implicit_self {
            nargs += 1;
        }

        let mut open_varargs = false;
        for (i, arg) in args.iter().enumerate() {
            let mut a = self.compile_expr(arg)?;
            let is_last = i + 1 == args.len();
            if is_last && a.is_multi_result() {
                self.setup_multret(&mut a)?;
                open_varargs = true;
            } else {
                self.exp2nextreg(&mut a)?;
                nargs += 1;
            }
        }

        let b = if open_varargs { 0 } else { nargs + 1 };
        let pc = self.fs().emit(Instruction::abc(OpCode::Call, base as u32, b, 0), 0);
        // The call's argument registers collapse back to just its result.
        self.fs().freereg = base + 1;
        Ok(ExpDesc::new(ExpKind::Call(pc)))
    }

    /// Rewrites a trailing multi-result argument/return expression (a call
    /// or `...`) to produce "all results" instead of exactly one.
    pub(crate) fn setup_multret(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        match e.kind {
            ExpKind::Call(pc) => {
                self.fs().code[pc as usize].set_c(0);
            }
            ExpKind::Vararg(pc) => {
                self.fs().code[pc as usize].set_b(0);
            }
            _ => unreachable!("setup_multret called on a non-multi-result expression"),
        }
        Ok(())
    }

    // ---- table constructors ---------------------------------------------

    fn compile_table(&mut self, fields: &[TableField]) -> CompileResult<ExpDesc> {
        let n_array_hint: u32 = fields
            .iter()
            .filter(|f| matches!(f, TableField::Positional(_)))
            .count() as u32;
        let n_hash_hint: u32 = fields.len() as u32 - n_array_hint;
        let table_pc = self.fs().emit(
            Instruction::abc(OpCode::NewTable, 0, n_array_hint, n_hash_hint),
            0,
        );
        self.fs().reserve_regs(1)?;
        let table_reg = self.fs().freereg - 1;

        let mut array_index: u32 = 0;
        let mut pending_array: u32 = 0;
        const FIELDS_PER_FLUSH: u32 = 50;

        for (i, field) in fields.iter().enumerate() {
            match field {
                TableField::Positional(expr) => {
                    let is_last = i + 1 == fields.len();
                    let mut v = self.compile_expr(expr)?;
                    if is_last && v.is_multi_result() {
                        self.setup_multret(&mut v)?;
                        self.fs().emit(
                            Instruction::abc(OpCode::SetList, table_reg as u32, 0, array_index / FIELDS_PER_FLUSH + 1),
                            0,
                        );
                        pending_array = 0;
                    } else {
                        self.exp2nextreg(&mut v)?;
                        array_index += 1;
                        pending_array += 1;
                        if pending_array == FIELDS_PER_FLUSH {
                            self.flush_array_fields(table_reg, array_index, pending_array)?;
                            pending_array = 0;
                        }
                    }
                }
                TableField::Named(name, expr) => {
                    let idx = self.fs().addk(Constant::Str(name.as_bytes().to_vec()))?;
                    let key = ember_bytecode::instruction::rk_const(idx);
                    let mut v = self.compile_expr(expr)?;
                    let vrk = self.exp2rk(&mut v)?;
                    self.fs().emit(Instruction::abc(OpCode::SetTable, table_reg as u32, key, vrk), 0);
                }
                TableField::Indexed(key_expr, expr) => {
                    let mut k = self.compile_expr(key_expr)?;
                    let krk = self.exp2rk(&mut k)?;
                    let mut v = self.compile_expr(expr)?;
                    let vrk = self.exp2rk(&mut v)?;
                    self.fs().emit(Instruction::abc(OpCode::SetTable, table_reg as u32, krk, vrk), 0);
                }
            }
        }
        if pending_array > 0 {
            self.flush_array_fields(table_reg, array_index, pending_array)?;
        }
        self.fs().freereg = table_reg + 1;
        Ok(ExpDesc::new(ExpKind::Relocable(table_pc)))
    }

    fn flush_array_fields(&mut self, table_reg: u8, up_to: u32, count: u32) -> CompileResult<()> {
        let block = (up_to - 1) / 50 + 1;
        self.fs().emit(Instruction::abc(OpCode::SetList, table_reg as u32, count, block), 0);
        self.fs().freereg = table_reg + 1;
        Ok(())
    }

    // ---- binary / unary ---------------------------------------------------

    fn compile_binary(&mut self, op: &BinOp, a: &Expr, b: &Expr) -> CompileResult<ExpDesc> {
        match op {
            BinOp::And => self.compile_and(a, b),
            BinOp::Or => self.compile_or(a, b),
            BinOp::Concat => self.compile_concat(a, b),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                self.compile_comparison(op, a, b)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod | BinOp::Pow => {
                self.compile_arith(op, a, b)
            }
        }
    }

    fn compile_arith(&mut self, op: &BinOp, a: &Expr, b: &Expr) -> CompileResult<ExpDesc> {
        let mut ea = self.compile_expr(a)?;
        let mut eb = self.compile_expr(b)?;
        if let (ExpKind::KNum(x), ExpKind::KNum(y)) = (ea.kind.clone(), eb.kind.clone()) {
            if let Some(folded) = fold::fold_binary(op, x, y) {
                return Ok(ExpDesc::new(ExpKind::KNum(folded)));
            }
        }
        let ark = self.exp2rk(&mut ea)?;
        let brk = self.exp2rk(&mut eb)?;
        self.free_rk(eb_reg(brk));
        self.free_rk(eb_reg(ark));
        let opcode = match op {
            BinOp::Add => OpCode::Add,
            BinOp::Sub => OpCode::Sub,
            BinOp::Mul => OpCode::Mul,
            BinOp::Div => OpCode::Div,
            BinOp::Mod => OpCode::Mod,
            BinOp::Pow => OpCode::Pow,
            _ => unreachable!(),
        };
        let pc = self.fs().emit(Instruction::abc(opcode, 0, ark, brk), 0);
        Ok(ExpDesc::new(ExpKind::Relocable(pc)))
    }

    fn compile_concat(&mut self, a: &Expr, b: &Expr) -> CompileResult<ExpDesc> {
        let mut ea = self.compile_expr(a)?;
        let areg = self.exp2nextreg(&mut ea)?;
        let mut eb = self.compile_expr(b)?;
        let breg = self.exp2nextreg(&mut eb)?;
        self.fs().free_reg(breg);
        self.fs().free_reg(areg);
        let pc = self.fs().emit(Instruction::abc(OpCode::Concat, 0, areg as u32, breg as u32), 0);
        Ok(ExpDesc::new(ExpKind::Relocable(pc)))
    }

    fn compile_comparison(&mut self, op: &BinOp, a: &Expr, b: &Expr) -> CompileResult<ExpDesc> {
        let (opcode, invert, swap) = match op {
            BinOp::Eq => (OpCode::Eq, false, false),
            BinOp::Ne => (OpCode::Eq, true, false),
            BinOp::Lt => (OpCode::Lt, false, false),
            BinOp::Le => (OpCode::Le, false, false),
            BinOp::Gt => (OpCode::Lt, false, true),
            BinOp::Ge => (OpCode::Le, false, true),
            _ => unreachable!(),
        };
        let (a, b) = if swap { (b, a) } else { (a, b) };
        let mut ea = self.compile_expr(a)?;
        let ark = self.exp2rk(&mut ea)?;
        let mut eb = self.compile_expr(b)?;
        let brk = self.exp2rk(&mut eb)?;
        self.free_rk(eb_reg(brk));
        self.free_rk(eb_reg(ark));
        let cond_a = if invert { 0 } else { 1 };
        self.fs().emit(Instruction::abc(opcode, cond_a, ark, brk), 0);
        let jmp_pc = self.fs().jump(0);
        Ok(ExpDesc::new(ExpKind::Jmp(jmp_pc)))
    }

    fn compile_and(&mut self, a: &Expr, b: &Expr) -> CompileResult<ExpDesc> {
        let mut ea = self.compile_expr(a)?;
        self.go_if_true(&mut ea)?;
        let mut eb = self.compile_expr(b)?;
        let mut f = eb.f;
        self.fs().concat(&mut f, ea.f);
        eb.f = f;
        Ok(eb)
    }

    fn compile_or(&mut self, a: &Expr, b: &Expr) -> CompileResult<ExpDesc> {
        let mut ea = self.compile_expr(a)?;
        self.go_if_false(&mut ea)?;
        let mut eb = self.compile_expr(b)?;
        let new_t = {
            let mut t = eb.t;
            self.fs().concat(&mut t, ea.t);
            t
        };
        eb.t = new_t;
        Ok(eb)
    }

    /// Resolves `e`'s true branch to "fall through here", leaving only its
    /// false branch as a pending jump list (used by `and`'s left operand).
    pub(crate) fn go_if_true(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        self.discharge_to_cond(e)?;
        let false_jump = match e.kind {
            ExpKind::Jmp(pc) => {
                // `pc`'s JMP currently fires on true; flip the guarding
                // comparison so it fires on false instead, matching what a
                // "fall through when true" list needs.
                self.negate_condition(pc);
                pc
            }
            _ => {
                let reg = self.exp2anyreg(e)?;
                self.fs().emit(Instruction::abc(OpCode::Test, reg as u32, 0, 0), 0);
                self.fs().jump(0)
            }
        };
        let mut f = e.f;
        self.fs().concat(&mut f, false_jump);
        e.f = f;
        self.fs().patch_pending_to_here();
        Ok(())
    }

    /// Symmetric to `go_if_true`: resolves the false branch to fall through,
    /// leaving the true branch pending (used by `or`'s left operand).
    pub(crate) fn go_if_false(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        self.discharge_to_cond(e)?;
        let true_jump = match e.kind {
            ExpKind::Jmp(pc) => pc,
            _ => {
                let reg = self.exp2anyreg(e)?;
                self.fs().emit(Instruction::abc(OpCode::Test, reg as u32, 0, 1), 0);
                self.fs().jump(0)
            }
        };
        let mut t = e.t;
        self.fs().concat(&mut t, true_jump);
        e.t = t;
        self.fs().patch_pending_to_here();
        Ok(())
    }

    /// Flips the `A` operand of the comparison guarding the `JMP` at `pc`,
    /// so the jump now fires on the opposite outcome.
    fn negate_condition(&mut self, jmp_pc: i32) {
        if jmp_pc > 0 {
            let idx = jmp_pc as usize - 1;
            let inst = self.fs().code[idx];
            self.fs().code[idx].set_a(1 - inst.a());
        }
    }

    /// Ensures `e` is something a `TEST` can branch on: plain values are
    /// left to `exp2anyreg`, already-conditional values pass through.
    fn discharge_to_cond(&mut self, e: &mut ExpDesc) -> CompileResult<()> {
        if matches!(e.kind, ExpKind::Jmp(_)) {
            return Ok(());
        }
        self.exp2val(e)
    }

    fn compile_unary(&mut self, op: &UnOp, a: &Expr) -> CompileResult<ExpDesc> {
        if let (UnOp::Neg, Expr::Number(n)) = (op, a) {
            if let Some(folded) = fold::fold_neg(*n) {
                return Ok(ExpDesc::new(ExpKind::KNum(folded)));
            }
        }
        let mut ea = self.compile_expr(a)?;
        let reg = self.exp2anyreg(&mut ea)?;
        self.fs().free_reg(reg);
        let opcode = match op {
            UnOp::Neg => OpCode::Unm,
            UnOp::Not => OpCode::Not,
            UnOp::Len => OpCode::Len,
        };
        let pc = self.fs().emit(Instruction::abc(opcode, 0, reg as u32, 0), 0);
        Ok(ExpDesc::new(ExpKind::Relocable(pc)))
    }

    fn free_rk(&mut self, reg: Option<u8>) {
        if let Some(r) = reg {
            self.fs().free_reg(r);
        }
    }
}

/// Extracts the underlying register from an RK operand, or `None` if it's a
/// constant-pool reference (nothing to free).
fn eb_reg(rk: u32) -> Option<u8> {
    if ember_bytecode::instruction::is_k(rk) {
        None
    } else {
        Some(rk as u8)
    }
}
