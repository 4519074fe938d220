use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("{}:{line}: {reason}", file.display())]
    Structural {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{}:{line}: {reason}", file.display())]
    Semantic {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{reason}")]
    SemanticNoLine { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A malformed or out-of-place directive/line: the kind of error the line
/// tokenizer, macro engine, and conditional engine raise.
pub fn structural(file: &Path, line: usize, reason: impl Into<String>) -> AssemblyError {
    AssemblyError::Structural {
        file: file.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// An error resolving a value: unknown symbols, bad expressions, out-of-range
/// encodings. Raised by the expression evaluator and the two passes.
pub fn semantic(file: &Path, line: usize, reason: impl Into<String>) -> AssemblyError {
    AssemblyError::Semantic {
        file: file.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// An error with no single originating line (circular INCLUDE, missing file).
pub fn semantic_no_line(reason: impl Into<String>) -> AssemblyError {
    AssemblyError::SemanticNoLine {
        reason: reason.into(),
    }
}
