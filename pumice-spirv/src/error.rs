//! Parse errors blamed on a word offset within the SPIR-V binary.
use thiserror::Error;

/// Error raised while decoding a SPIR-V binary.
///
/// `word_index` is the offset, in 32-bit words from the start of the binary
/// (header included), of the instruction that triggered the error. It is the
/// sole blame location carried by diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SPIR-V parse error at word {word_index}: {reason}")]
pub struct ParseError {
    pub word_index: usize,
    pub reason: String,
}

impl ParseError {
    pub fn new(word_index: usize, reason: impl Into<String>) -> Self {
        ParseError {
            word_index,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ParseError> = std::result::Result<T, E>;
