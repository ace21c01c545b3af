//! Contract with the document compiler.
//!
//! The compiler is an external collaborator: quire only calls these two
//! entry points and relies on nothing but the identity markers of the
//! render output.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vdom::RenderTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn error(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            severity: Severity::Error,
            message: message.into(),
        }
    }

    pub fn warning(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// One entry of the compiler's line map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMapping {
    pub source_line: usize,
    pub node_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub theme: Option<String>,
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileOutput {
    pub render: RenderTree,
    pub diagnostics: Vec<Diagnostic>,
    pub line_map: Vec<LineMapping>,
}

impl CompileOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_fatal())
    }

    /// Node key the compiler mapped to `line`
    #[cfg(test)]
    pub fn key_for_line(&self, line: usize) -> Option<&str> {
        self.line_map
            .iter()
            .find(|m| m.source_line == line)
            .map(|m| m.node_key.as_str())
    }
}

/// Unexpected compiler failure (as opposed to diagnostics)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompilerError {
    #[error("Compile failed: {0}")]
    Compile(String),

    #[error("Reverse compile failed: {0}")]
    Reverse(String),
}

pub trait Compiler {
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<CompileOutput, CompilerError>;

    fn reverse_compile(&self, render: &RenderTree) -> Result<String, CompilerError>;
}

impl<C: Compiler + ?Sized> Compiler for &C {
    fn compile(&self, source: &str, options: &CompileOptions) -> Result<CompileOutput, CompilerError> {
        (**self).compile(source, options)
    }

    fn reverse_compile(&self, render: &RenderTree) -> Result<String, CompilerError> {
        (**self).reverse_compile(render)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_filter_warnings() {
        let output = CompileOutput {
            diagnostics: vec![Diagnostic::warning(1, "odd"), Diagnostic::error(4, "broken")],
            ..CompileOutput::default()
        };
        assert!(output.has_errors());
        assert_eq!(output.errors().map(|d| d.line).collect::<Vec<_>>(), vec![4]);
    }

    #[test]
    fn test_diagnostic_serializes_lowercase_severity() {
        let json = serde_json::to_string(&Diagnostic::warning(2, "w")).unwrap();
        assert_eq!(json, r#"{"line":2,"severity":"warning","message":"w"}"#);
    }

    #[test]
    fn test_key_for_line() {
        let output = CompileOutput {
            line_map: vec![LineMapping {
                source_line: 3,
                node_key: "card-1".into(),
            }],
            ..CompileOutput::default()
        };
        assert_eq!(output.key_for_line(3), Some("card-1"));
        assert_eq!(output.key_for_line(4), None);
    }
}
