//! Error kinds surfaced by every stage of the compiler.
//!
//! Matches the error taxonomy in the design: scan/parse errors and semantic
//! errors are external (front-end) failures that abort before the core ever
//! runs; internal compiler errors are raised by the core when an invariant
//! it depends on (resolved jump targets, known opcodes, descriptor shape)
//! doesn't hold; I/O errors are raised only by the final `.marv` write.
//!
//! The library never calls `process::exit` or prints — that is left to the
//! `iotac` binary, which is the external collaborator responsible for
//! rendering diagnostics and choosing an exit code.

use crate::common::Id;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("scan error at byte {offset}: unexpected character {ch:?}")]
    Scan { offset: usize, ch: char },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("semantic error: {0}")]
    Semantic(String),

    #[error("internal compiler error in {method}: {message}")]
    Internal { method: Id, message: String },

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn internal(method: Id, message: impl Into<String>) -> Self {
        CompileError::Internal {
            method,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
