use thiserror::Error;

pub type BytecodeResult<T> = Result<T, BytecodeError>;

#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("not a precompiled EmberScript chunk")]
    BadMagic,

    #[error("version mismatch: file is {major}.{minor}, this build is {native_major}.{native_minor}")]
    VersionMismatch {
        major: u8,
        minor: u8,
        native_major: u8,
        native_minor: u8,
    },

    #[error("header does not match this build's configuration (endianness/width)")]
    IncompatibleHeader,

    #[error("unexpected end of bytecode stream")]
    UnexpectedEof,

    #[error("unknown constant tag byte {0}")]
    BadConstantTag(u8),

    #[error("unknown opcode byte {0}")]
    BadOpcode(u8),

    #[error("string too long to encode ({0} bytes)")]
    StringTooLong(usize),

    #[error("bytecode verification failed: {0}")]
    Verification(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
