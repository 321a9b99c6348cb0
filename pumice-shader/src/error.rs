//! The error taxonomy shared by translation and pipeline assembly.
use pumice_llvm::JitError;
use pumice_spirv::ParseError;
use thiserror::Error;

/// Every failure the shader core can report.
///
/// Nothing is recovered internally: the first error aborts translation and is
/// surfaced unchanged to the pipeline-creation caller. The core never turns
/// an error into a log line.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed SPIR-V or a semantic violation, blamed on the word offset of
    /// the offending instruction.
    #[error("SPIR-V parse error at word {word_index}: {reason}")]
    Parser { word_index: usize, reason: String },
    /// Module verification failed, an intrinsic could not be materialized, or
    /// an unimplemented SPIR-V construct was hit.
    #[error("translation failure: {0}")]
    Translation(String),
    /// A recognized but deliberately-not-implemented feature.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// JIT or LLVM infrastructure failure.
    #[error("runtime failure: {0}")]
    Runtime(String),
}

impl Error {
    pub fn parser(word_index: usize, reason: impl Into<String>) -> Self {
        Error::Parser {
            word_index,
            reason: reason.into(),
        }
    }
    pub fn translation(reason: impl Into<String>) -> Self {
        Error::Translation(reason.into())
    }
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Error::Unsupported(feature.into())
    }
    pub fn runtime(reason: impl Into<String>) -> Self {
        Error::Runtime(reason.into())
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parser {
            word_index: err.word_index,
            reason: err.reason,
        }
    }
}

impl From<JitError> for Error {
    fn from(err: JitError) -> Self {
        Error::Runtime(err.0)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
