use thiserror::Error;

/// Failure scoped to a single row of a write batch. Sibling rows keep going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("{column} must be an integer, got '{value}'")]
    NotInteger { column: String, value: String },
    #[error("{column} '{value}' is not an allowed value")]
    NotAllowed { column: String, value: String },
    #[error("{column} cannot be empty")]
    EmptyKey { column: String },
    #[error("{0}")]
    Write(String),
}

impl RowError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, RowError::Write(_))
    }
}

/// Structural defect in a tabular input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("column '{0}' is missing")]
    MissingColumn(String),
    #[error("row {row} has {found} cell(s), expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },
}
