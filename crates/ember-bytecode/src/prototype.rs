//! `Prototype`: the immutable compiled form of a function (component F).

use crate::constant::Constant;
use crate::instruction::Instruction;
use std::sync::Arc;

/// How an upvalue is captured when a `CLOSURE` instruction materializes a
/// closure over this prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalSource {
    /// Capture a local register of the immediately enclosing function.
    Local(u8),
    /// Copy an upvalue reference from the immediately enclosing function.
    Upval(u8),
}

#[derive(Debug, Clone)]
pub struct UpvalDesc {
    pub name: String,
    pub source: UpvalSource,
}

/// Debug-info record for one local variable's lexical scope, used only for
/// introspection/disassembly; never consulted by the interpreter.
#[derive(Debug, Clone)]
pub struct LocalVarInfo {
    pub name: String,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// Per-instruction debug info. Omitted entirely (`None`) when the module was
/// compiled with `--strip` or loaded with debug info stripped.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    /// One source line number per instruction in `Prototype::code`.
    pub lines: Vec<u32>,
    pub locals: Vec<LocalVarInfo>,
    /// Upvalue names, parallel to `Prototype::upvalues`.
    pub upvalue_names: Vec<String>,
}

/// An immutable compiled function. Shared (`Arc`) because nested prototypes
/// are referenced both by their enclosing prototype and, after a `CLOSURE`
/// instruction runs, by every closure created from them.
#[derive(Debug, Clone)]
pub struct Prototype {
    pub source_name: Option<String>,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,
    pub code: Vec<Instruction>,
    pub constants: Vec<Constant>,
    pub prototypes: Vec<Arc<Prototype>>,
    pub upvalues: Vec<UpvalDesc>,
    pub debug: Option<DebugInfo>,
}

impl Prototype {
    pub fn line_for_pc(&self, pc: usize) -> Option<u32> {
        self.debug.as_ref().and_then(|d| d.lines.get(pc).copied())
    }
}
