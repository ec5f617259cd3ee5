//! Mapping errors

use thiserror::Error;

/// Errors raised while converting database values into Rust values or models
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    #[error("Unexpected null for {0}")]
    UnexpectedNull(&'static str),
    #[error("Cannot convert {found} to {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Value {value} out of range for {expected}")]
    OutOfRange { expected: &'static str, value: i64 },
    #[error("Column {0} not present in result set")]
    MissingColumn(String),
    #[error("Row has {actual} values, result set declares {expected} columns")]
    RowWidth { expected: usize, actual: usize },
    #[error("{0}")]
    Invalid(String),
}
