//! Instruction format, function prototypes, and the binary dump/undump
//! module format for the EmberScript VM.
//!
//! This crate has no runtime dependency on the GC or interpreter (`ember-core`):
//! it only defines the static, immutable shape of compiled code.

pub mod constant;
pub mod disasm;
pub mod dump;
pub mod error;
pub mod header;
pub mod instruction;
pub mod opcode;
pub mod prototype;
pub mod undump;
pub mod verify;

pub use constant::Constant;
pub use disasm::disassemble;
pub use error::{BytecodeError, BytecodeResult};
pub use instruction::Instruction;
pub use opcode::OpCode;
pub use prototype::{DebugInfo, LocalVarInfo, Prototype, UpvalDesc, UpvalSource};
