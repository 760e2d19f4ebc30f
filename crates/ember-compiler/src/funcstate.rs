//! Per-function compile-time state: the register allocator, constant pool,
//! local-variable stack, and block/loop scoping for one function body being
//! lowered. A `Codegen` keeps a stack of these, one per lexically nested
//! function currently being compiled (spec §4.2).

use crate::error::{CompileError, CompileResult};
use crate::expdesc::NO_JUMP;
use ember_bytecode::constant::{Constant, ConstantKey};
use ember_bytecode::instruction::{Instruction, MAX_A};
use ember_bytecode::opcode::OpCode;
use ember_bytecode::prototype::{DebugInfo, LocalVarInfo, Prototype, UpvalDesc};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Hard cap on live registers in one function (spec §4.2).
pub const MAX_REGISTERS: u32 = 250;
/// Hard cap on lexical function nesting the generator will follow when
/// chasing an upvalue chain — guards against unbounded recursion on
/// pathological input, not a spec-mandated number.
pub const MAX_FUNC_NESTING: usize = 200;

#[derive(Debug, Clone)]
pub struct LocalVar {
    pub name: String,
    pub reg: u8,
    pub start_pc: u32,
}

#[derive(Debug, Default)]
pub struct BlockCx {
    /// Index into `FuncState::actives` of the first local declared in this
    /// block.
    pub first_active: usize,
    pub is_loop: bool,
    /// Jump list of `break` statements pending patch to the loop's exit.
    pub break_list: i32,
    /// `true` if any nested closure captured a local of this block — forces
    /// a `CLOSE` on block exit.
    pub has_upval: bool,
}

pub struct FuncState {
    pub source_name: Option<String>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_params: u8,
    pub is_vararg: bool,

    pub code: Vec<Instruction>,
    pub lines: Vec<u32>,
    pub constants: Vec<Constant>,
    const_map: FxHashMap<ConstantKey, u32>,
    pub prototypes: Vec<Arc<Prototype>>,
    pub upvalues: Vec<UpvalDesc>,

    /// All locals ever declared, for debug info (`end_pc` filled on scope
    /// exit).
    pub all_locals: Vec<LocalVarInfo>,
    /// Currently active locals, in declaration order; register `i` (for
    /// `i < actives.len()`) holds `actives[i]`.
    pub actives: Vec<LocalVar>,
    pub blocks: Vec<BlockCx>,

    pub freereg: u8,
    pub max_stack_size: u8,

    /// Watermark: peephole optimizations only look at instructions emitted
    /// after the last jump target, per spec §4.2.
    pub last_target: i32,
    /// Jump list of jumps pending patch to "here" (the pc of the next
    /// instruction emitted).
    pub jpc: i32,
}

impl FuncState {
    pub fn new(source_name: Option<String>, line_defined: u32) -> Self {
        FuncState {
            source_name,
            line_defined,
            last_line_defined: 0,
            num_params: 0,
            is_vararg: false,
            code: Vec::new(),
            lines: Vec::new(),
            constants: Vec::new(),
            const_map: FxHashMap::default(),
            prototypes: Vec::new(),
            upvalues: Vec::new(),
            all_locals: Vec::new(),
            actives: Vec::new(),
            blocks: vec![BlockCx {
                first_active: 0,
                is_loop: false,
                break_list: NO_JUMP,
                has_upval: false,
            }],
            freereg: 0,
            max_stack_size: 0,
            last_target: NO_JUMP,
            jpc: NO_JUMP,
        }
    }

    // ---- constant pool --------------------------------------------------

    pub fn addk(&mut self, k: Constant) -> CompileResult<u32> {
        let key = ConstantKey::from(&k);
        if let Some(&idx) = self.const_map.get(&key) {
            return Ok(idx);
        }
        let idx = self.constants.len() as u32;
        if idx > ember_bytecode::instruction::MAX_BX {
            return Err(CompileError::ConstantTableOverflow);
        }
        self.constants.push(k);
        self.const_map.insert(key, idx);
        Ok(idx)
    }

    // ---- register allocation --------------------------------------------

    pub fn reserve_regs(&mut self, n: u8) -> CompileResult<()> {
        self.check_stack(n)?;
        self.freereg += n;
        Ok(())
    }

    pub fn check_stack(&mut self, extra: u8) -> CompileResult<()> {
        let needed = self.freereg as u32 + extra as u32;
        if needed > MAX_REGISTERS {
            return Err(CompileError::RegisterOverflow);
        }
        if needed > self.max_stack_size as u32 {
            self.max_stack_size = needed as u8;
        }
        Ok(())
    }

    /// Free the topmost reservation. Only LIFO release is legal: the
    /// register allocator is a stack.
    pub fn free_reg(&mut self, reg: u8) {
        if reg >= self.num_active_locals() && reg == self.freereg.wrapping_sub(1) {
            self.freereg -= 1;
        }
    }

    pub fn num_active_locals(&self) -> u8 {
        self.actives.len() as u8
    }

    // ---- locals -----------------------------------------------------------

    pub fn new_local(&mut self, name: String, pc: u32) -> CompileResult<u8> {
        if self.actives.len() as u32 >= MAX_A {
            return Err(CompileError::TooManyLocals);
        }
        let reg = self.actives.len() as u8;
        self.actives.push(LocalVar {
            name,
            reg,
            start_pc: pc,
        });
        Ok(reg)
    }

    pub fn resolve_local(&self, name: &str) -> Option<u8> {
        self.actives
            .iter()
            .rev()
            .find(|l| l.name == name)
            .map(|l| l.reg)
    }

    pub fn enter_block(&mut self, is_loop: bool) {
        self.blocks.push(BlockCx {
            first_active: self.actives.len(),
            is_loop,
            break_list: NO_JUMP,
            has_upval: false,
        });
    }

    /// Leaves the current block, returning `(first_freed_register,
    /// has_upval, break_list)` so the caller can emit a `CLOSE` and patch
    /// breaks before popping locals off the active list.
    pub fn leave_block(&mut self, pc: u32) -> (u8, bool, i32) {
        let block = self.blocks.pop().expect("unbalanced block scope");
        let first_reg = block.first_active as u8;
        while self.actives.len() > block.first_active {
            let local = self.actives.pop().unwrap();
            self.all_locals.push(LocalVarInfo {
                name: local.name,
                start_pc: local.start_pc,
                end_pc: pc,
            });
        }
        self.freereg = first_reg;
        (first_reg, block.has_upval, block.break_list)
    }

    pub fn mark_upval_in_enclosing_blocks(&mut self, reg: u8) {
        for b in self.blocks.iter_mut().rev() {
            if (b.first_active as u8) <= reg {
                b.has_upval = true;
                break;
            }
        }
    }

    // ---- emission ----------------------------------------------------------

    pub fn emit(&mut self, inst: Instruction, line: u32) -> i32 {
        self.code.push(inst);
        self.lines.push(line);
        (self.code.len() - 1) as i32
    }

    pub fn pc(&self) -> i32 {
        self.code.len() as i32
    }

    pub fn finish(self) -> Prototype {
        let debug = Some(DebugInfo {
            lines: self.lines,
            locals: self.all_locals,
            upvalue_names: self.upvalues.iter().map(|u| u.name.clone()).collect(),
        });
        Prototype {
            source_name: self.source_name,
            line_defined: self.line_defined,
            last_line_defined: self.last_line_defined,
            num_params: self.num_params,
            is_vararg: self.is_vararg,
            max_stack_size: self.max_stack_size.max(2),
            code: self.code,
            constants: self.constants,
            prototypes: self.prototypes,
            upvalues: self.upvalues,
            debug,
        }
    }
}
