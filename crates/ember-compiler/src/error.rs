//! Compilation errors.

use thiserror::Error;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("control structure too long")]
    ControlStructureTooLong,

    #[error("constant table overflow")]
    ConstantTableOverflow,

    #[error("function or expression too complex")]
    RegisterOverflow,

    #[error("too many upvalues")]
    TooManyUpvalues,

    #[error("too many locals")]
    TooManyLocals,

    #[error("break outside a loop")]
    BreakOutsideLoop,

    #[error("'{0}' is not a local, upvalue, or global")]
    UnresolvedAssignTarget(String),

    #[error("too many function nesting levels")]
    FunctionNestingTooDeep,
}
