//! JIT-side runtime failures.
use thiserror::Error;

/// Failure inside the JIT layer: LLVM misconfiguration, target-machine
/// creation, module handoff, or symbol resolution.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct JitError(pub String);

impl JitError {
    pub fn new(message: impl Into<String>) -> Self {
        JitError(message.into())
    }
}

pub type Result<T, E = JitError> = std::result::Result<T, E>;
