//! Opcode enumeration and the static metadata the code generator, verifier,
//! and disassembler all drive off of.

/// How an instruction's operands are laid out in the 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMode {
    /// `op(6) A(8) B(9) C(9)` — three operands.
    ABC,
    /// `op(6) A(8) Bx(18)` — one large unsigned operand.
    ABx,
    /// `op(6) A(8) sBx(18, biased)` — one large signed operand.
    AsBx,
}

/// What a `B`/`C` operand means for a given opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpArgKind {
    /// Operand is not used by this opcode.
    Unused,
    /// Operand is used, but not as a register or RK index (a raw count/flag).
    Raw,
    /// Operand is a register index.
    Register,
    /// Operand is an RK value: register index, or constant index with the
    /// top bit set.
    RegisterOrConstant,
}

macro_rules! opcodes {
    ($($name:ident = $code:expr),* $(,)?) => {
        /// A single EmberScript VM opcode.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum OpCode {
            $($name = $code),*
        }

        impl OpCode {
            pub const COUNT: usize = opcodes!(@count $($name)*);

            pub const ALL: [OpCode; Self::COUNT] = [$(OpCode::$name),*];

            pub fn from_u8(byte: u8) -> Option<OpCode> {
                match byte {
                    $($code => Some(OpCode::$name),)*
                    _ => None,
                }
            }
        }
    };
    (@count) => { 0 };
    (@count $head:ident $($tail:ident)*) => { 1 + opcodes!(@count $($tail)*) };
}

opcodes! {
    // Data movement
    Move = 0,
    LoadK = 1,
    LoadBool = 2,
    LoadNil = 3,
    // Variable access
    GetUpval = 4,
    SetUpval = 5,
    GetGlobal = 6,
    SetGlobal = 7,
    GetTable = 8,
    SetTable = 9,
    // Construction
    NewTable = 10,
    SelfOp = 11,
    // Arithmetic
    Add = 12,
    Sub = 13,
    Mul = 14,
    Div = 15,
    Mod = 16,
    Pow = 17,
    Unm = 18,
    Not = 19,
    Len = 20,
    Concat = 21,
    // Control flow
    Jmp = 22,
    Eq = 23,
    Lt = 24,
    Le = 25,
    Test = 26,
    TestSet = 27,
    // Calls
    Call = 28,
    TailCall = 29,
    Return = 30,
    Closure = 31,
    Close = 32,
    Vararg = 33,
    // Loops
    ForLoop = 34,
    ForPrep = 35,
    TForLoop = 36,
    SetList = 37,
}

/// Static metadata describing how an opcode's operands behave. Drives
/// verification, disassembly, and the code generator's RK-operand prep.
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub mode: OpMode,
    /// `true` if this opcode may be followed by a conditionally-skipped
    /// `JMP` (the "test" opcodes: EQ/LT/LE/TEST/TESTSET).
    pub is_test: bool,
    /// `true` if operand `A` names a destination register written by this
    /// instruction, in the sense the register allocator cares about.
    pub sets_a: bool,
    pub b_kind: OpArgKind,
    pub c_kind: OpArgKind,
}

use OpArgKind::*;
use OpMode::*;

impl OpCode {
    pub fn info(self) -> OpInfo {
        let (name, mode, is_test, sets_a, b_kind, c_kind) = match self {
            OpCode::Move => ("MOVE", ABC, false, true, Register, Unused),
            OpCode::LoadK => ("LOADK", ABx, false, true, Unused, Unused),
            OpCode::LoadBool => ("LOADBOOL", ABC, false, true, Raw, Raw),
            OpCode::LoadNil => ("LOADNIL", ABC, false, true, Raw, Unused),
            OpCode::GetUpval => ("GETUPVAL", ABC, false, true, Raw, Unused),
            OpCode::SetUpval => ("SETUPVAL", ABC, false, false, Raw, Unused),
            OpCode::GetGlobal => ("GETGLOBAL", ABx, false, true, Unused, Unused),
            OpCode::SetGlobal => ("SETGLOBAL", ABx, false, false, Unused, Unused),
            OpCode::GetTable => ("GETTABLE", ABC, false, true, Register, RegisterOrConstant),
            OpCode::SetTable => (
                "SETTABLE",
                ABC,
                false,
                false,
                RegisterOrConstant,
                RegisterOrConstant,
            ),
            OpCode::NewTable => ("NEWTABLE", ABC, false, true, Raw, Raw),
            OpCode::SelfOp => ("SELF", ABC, false, true, Register, RegisterOrConstant),
            OpCode::Add => ("ADD", ABC, false, true, RegisterOrConstant, RegisterOrConstant),
            OpCode::Sub => ("SUB", ABC, false, true, RegisterOrConstant, RegisterOrConstant),
            OpCode::Mul => ("MUL", ABC, false, true, RegisterOrConstant, RegisterOrConstant),
            OpCode::Div => ("DIV", ABC, false, true, RegisterOrConstant, RegisterOrConstant),
            OpCode::Mod => ("MOD", ABC, false, true, RegisterOrConstant, RegisterOrConstant),
            OpCode::Pow => ("POW", ABC, false, true, RegisterOrConstant, RegisterOrConstant),
            OpCode::Unm => ("UNM", ABC, false, true, Register, Unused),
            OpCode::Not => ("NOT", ABC, false, true, Register, Unused),
            OpCode::Len => ("LEN", ABC, false, true, Register, Unused),
            OpCode::Concat => ("CONCAT", ABC, false, true, Register, Register),
            OpCode::Jmp => ("JMP", AsBx, false, false, Unused, Unused),
            OpCode::Eq => ("EQ", ABC, true, false, RegisterOrConstant, RegisterOrConstant),
            OpCode::Lt => ("LT", ABC, true, false, RegisterOrConstant, RegisterOrConstant),
            OpCode::Le => ("LE", ABC, true, false, RegisterOrConstant, RegisterOrConstant),
            OpCode::Test => ("TEST", ABC, true, false, Unused, Raw),
            OpCode::TestSet => ("TESTSET", ABC, true, true, Register, Raw),
            OpCode::Call => ("CALL", ABC, false, true, Raw, Raw),
            OpCode::TailCall => ("TAILCALL", ABC, false, true, Raw, Raw),
            OpCode::Return => ("RETURN", ABC, false, false, Raw, Unused),
            OpCode::Closure => ("CLOSURE", ABx, false, true, Unused, Unused),
            OpCode::Close => ("CLOSE", ABC, false, false, Unused, Unused),
            OpCode::Vararg => ("VARARG", ABC, false, true, Raw, Unused),
            OpCode::ForPrep => ("FORPREP", AsBx, false, true, Unused, Unused),
            OpCode::ForLoop => ("FORLOOP", AsBx, false, true, Unused, Unused),
            OpCode::TForLoop => ("TFORLOOP", ABC, false, false, Unused, Raw),
            OpCode::SetList => ("SETLIST", ABC, false, false, Raw, Raw),
        };
        OpInfo {
            name,
            mode,
            is_test,
            sets_a,
            b_kind,
            c_kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_byte() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_u8(op as u8), Some(op));
        }
    }

    #[test]
    fn test_opcodes_are_flagged() {
        assert!(OpCode::Eq.info().is_test);
        assert!(OpCode::TestSet.info().is_test);
        assert!(!OpCode::Move.info().is_test);
    }
}
