//! Error type shared by the storage engine and the command dispatcher.

use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Everything a statement can fail with.
///
/// Every variant is recoverable: the dispatcher turns it into a single
/// `error: ...` line for the client and the connection stays open.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The command matched none of the supported statement forms.
    #[error("Incorrect command")]
    IncorrectCommand,

    /// The statement names a table the schema does not declare.
    #[error("incorrect table {0}")]
    IncorrectTable(String),

    /// INSERT supplied the wrong number of values (the pk is not counted).
    #[error("Incorrect number of columns: expected {expected}, got {got}")]
    IncorrectColumnCount { expected: usize, got: usize },

    /// A `table.column` reference that is malformed or does not resolve.
    #[error("field {field} is not valid: {reason}")]
    InvalidField { field: String, reason: &'static str },

    /// INSERT value with an embedded comma, which pages cannot store.
    #[error("Values can't contain ',' symbol")]
    ValueContainsComma,

    /// Value with a line break, which would split its row across lines.
    #[error("Values can't contain line breaks")]
    ValueContainsLineBreak,

    #[error("storage I/O error on {}: {source}", .path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse error: {0}")]
    ParseError(String),

    /// The worker running a statement died before producing a result.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Builds a `map_err` adapter that attaches `path` to an I/O error.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> EngineError {
        let path = path.into();
        move |source| EngineError::StorageIo { path, source }
    }

    pub(crate) fn invalid_field(field: &str, reason: &'static str) -> Self {
        EngineError::InvalidField {
            field: field.to_string(),
            reason,
        }
    }
}
