//! Error types for the editor

use quire_vdom::CompilerError;
use thiserror::Error;

use crate::persistence::HistoryError;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Compiler error: {0}")]
    Compiler(#[from] CompilerError),

    #[error("History error: {0}")]
    History(#[from] HistoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),
}
