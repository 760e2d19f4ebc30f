//! Error type for the host stack API.
//!
//! Grounded on raya-sdk's `error.rs` `NativeError`/`AbiResult` shape.

pub type AbiResult<T> = Result<T, AbiError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AbiError {
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("invalid stack index {0}")]
    InvalidIndex(i32),

    #[error("{0}")]
    Runtime(String),
}

impl From<ember_core::EmberError> for AbiError {
    fn from(e: ember_core::EmberError) -> Self {
        AbiError::Runtime(e.to_string())
    }
}
