//! Shared block-scoping helpers used by `if`/`while`/`repeat`/`for` in
//! `stmt.rs`: entering and leaving a lexical block, with the `CLOSE`
//! emission a captured local requires on the way out (spec §4.2, §5.3).

use super::Codegen;
use crate::ast::Block;
use crate::error::CompileResult;
use ember_bytecode::instruction::Instruction;
use ember_bytecode::opcode::OpCode;

impl Codegen {
    /// Lowers `block` in its own lexical scope and returns the scope's
    /// pending `break` jump list (always `NO_JUMP` for a non-loop block).
    pub(crate) fn compile_scoped_block(&mut self, block: &Block, is_loop: bool) -> CompileResult<i32> {
        self.fs().enter_block(is_loop);
        self.compile_block(block)?;
        self.leave_current_block()
    }

    /// Pops the innermost block, emitting `CLOSE` if any local in it was
    /// captured by a nested closure, and returns its break list.
    pub(crate) fn leave_current_block(&mut self) -> CompileResult<i32> {
        let pc = self.fs().pc() as u32;
        let (first_reg, has_upval, break_list) = self.fs().leave_block(pc);
        if has_upval {
            self.fs().emit(Instruction::abc(OpCode::Close, first_reg as u32, 0, 0), 0);
        }
        Ok(break_list)
    }
}
