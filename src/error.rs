//! Error types for statement construction and execution.
//!
//! Every fallible operation in the crate returns [`Error`]. Failures found while
//! composing statements are [`QueryBuildError`]s and never reach the engine;
//! failures converting fetched values are [`DecodeError`]s.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::value::StorageClass;

/// Primary result code SQLite uses for every constraint violation.
const SQLITE_CONSTRAINT: i32 = 19;

/// Errors that can occur while building, executing or decoding a statement.
#[derive(Debug, Error)]
pub enum Error {
    /// The statement tree is invalid. Detected before any engine call.
    #[error("query build error: {0}")]
    QueryBuild(#[from] QueryBuildError),

    /// The number of supplied values does not match the statement's placeholders.
    #[error("bind error: statement expects {expected} parameters, {given} given")]
    Bind {
        /// Placeholders in the prepared statement.
        expected: usize,
        /// Values supplied by the caller.
        given: usize,
    },

    /// The database is busy or locked. The caller may retry.
    #[error("database busy ({code}): {message}")]
    Busy { code: i32, message: String },

    /// A statement or row was used outside its valid scope.
    #[error("misuse: {0}")]
    Misuse(String),

    /// Any other non-OK result code from the engine, carried verbatim.
    #[error("engine error ({code}): {message}")]
    Engine { code: i32, message: String },

    /// A fetched value could not be converted to the requested host type.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A single-row fetch produced no rows.
    #[error("query returned no rows")]
    NoRows,
}

impl Error {
    /// Returns `true` if the operation may succeed when retried.
    ///
    /// Only busy/locked conditions are retryable; everything else is terminal
    /// for the operation that produced it.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Returns `true` if the engine rejected a statement for violating a
    /// UNIQUE, NOT NULL, CHECK, PRIMARY KEY or FOREIGN KEY constraint.
    #[must_use]
    pub const fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::Engine { code, .. } if *code & 0xff == SQLITE_CONSTRAINT)
    }

    /// The engine's extended result code, if this error came from the engine.
    #[must_use]
    pub const fn engine_code(&self) -> Option<i32> {
        match self {
            Self::Engine { code, .. } | Self::Busy { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.unwrap_or_else(|| failure.to_string());
                match failure.code {
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::Busy {
                        code: failure.extended_code,
                        message,
                    },
                    ErrorCode::ApiMisuse => Self::Misuse(message),
                    _ => Self::Engine {
                        code: failure.extended_code,
                        message,
                    },
                }
            }
            // Prepare failures that point at a token in the SQL text.
            rusqlite::Error::SqlInputError { error, msg, .. } => match error.code {
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => Self::Busy {
                    code: error.extended_code,
                    message: msg,
                },
                ErrorCode::ApiMisuse => Self::Misuse(msg),
                _ => Self::Engine {
                    code: error.extended_code,
                    message: msg,
                },
            },
            rusqlite::Error::InvalidParameterCount(given, expected) => {
                Self::Bind { expected, given }
            }
            rusqlite::Error::InvalidColumnIndex(index) => {
                Self::Decode(DecodeError::ColumnIndexOutOfRange { index, count: 0 })
            }
            rusqlite::Error::InvalidColumnName(name) => {
                Self::Decode(DecodeError::UnknownColumn(name))
            }
            rusqlite::Error::Utf8Error(e) => {
                Self::Decode(DecodeError::InvalidFormat(format!("invalid utf-8 text: {e}")))
            }
            rusqlite::Error::ExecuteReturnedResults => {
                Self::Misuse("execute returned rows; use a query call instead".to_string())
            }
            rusqlite::Error::QueryReturnedNoRows => Self::NoRows,
            other => Self::Engine {
                code: -1,
                message: other.to_string(),
            },
        }
    }
}

/// Errors detected while composing expressions, queries and schema statements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuildError {
    /// A column reference does not resolve against the visible sources.
    #[error("unknown column {}", qualified(.table.as_deref(), .column))]
    UnknownColumn {
        table: Option<String>,
        column: String,
    },

    /// An unqualified column name exists in more than one visible source.
    #[error("column \"{0}\" is ambiguous; qualify it with a table or alias")]
    AmbiguousColumn(String),

    /// A qualifier does not name any source visible to the statement.
    #[error("unknown table or alias \"{0}\"")]
    UnknownSource(String),

    /// The same source name is visible twice in one statement.
    #[error("source \"{0}\" appears more than once; alias one of them")]
    DuplicateSource(String),

    /// A column name appears twice where names must be unique.
    #[error("duplicate column \"{column}\" in {context}")]
    DuplicateColumn { context: String, column: String },

    /// A typed column handle was requested with a marker that does not match
    /// the declared column.
    #[error("column \"{column}\" is declared as {declared}, requested as {requested}")]
    ColumnTypeMismatch {
        column: String,
        declared: String,
        requested: String,
    },

    /// A table, column, index or constraint definition is malformed.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// UPDATE or DELETE without a filter and without an explicit `all_rows()`.
    #[error("{0} without a filter; call all_rows() to affect every row")]
    MissingFilter(&'static str),

    /// UPDATE with no assignments.
    #[error("update of \"{0}\" has no assignments")]
    EmptyUpdate(String),

    /// Rows of a multi-row INSERT supply different column sets.
    #[error("insert row {row} supplies a different column set than row 0")]
    InsertColumnMismatch { row: usize },

    /// A statement that needs at least one column was given none.
    #[error("{0} requires at least one column")]
    EmptyColumnList(&'static str),
}

fn qualified(table: Option<&str>, column: &str) -> String {
    match table {
        Some(table) => format!("\"{table}\".\"{column}\""),
        None => format!("\"{column}\""),
    }
}

/// Errors converting a dynamic value into a host type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// NULL was read into a non-optional host type.
    #[error("unexpected NULL for non-optional {0}")]
    UnexpectedNull(&'static str),

    /// The stored class cannot represent the requested host type.
    #[error("cannot decode {found} as {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: StorageClass,
    },

    /// An integer does not fit the requested host integer type.
    #[error("integer {value} out of range for {target}")]
    OutOfRange { value: i64, target: &'static str },

    /// Text did not parse as the requested representation.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The column index is past the end of the row.
    #[error("column index {index} out of range for row of {count} columns")]
    ColumnIndexOutOfRange { index: usize, count: usize },

    /// No column with this (case-sensitive) name exists in the row.
    #[error("no column named \"{0}\" in row")]
    UnknownColumn(String),
}

/// Result type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
