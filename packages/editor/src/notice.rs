//! User-visible messages raised by the sync engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeKind {
    /// The reverse-compiled source failed to compile; the edit was reverted
    CompileFailure,
    /// The edit compiled but did not render as typed; the edit was kept
    UnsupportedEdit,
    /// The compiler itself failed unexpectedly; the edit was reverted
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Soft warnings can be shown without interrupting the user
    pub fn is_warning(&self) -> bool {
        self.kind == NoticeKind::UnsupportedEdit
    }
}
