use thiserror::Error;

/// Errors shared by every quire crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("Offset {offset} is not a char boundary")]
    NotCharBoundary { offset: usize },

    #[error("Invalid block type: {0}")]
    InvalidBlockType(String),
}
