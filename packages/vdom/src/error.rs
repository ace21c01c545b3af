use thiserror::Error;

use crate::vdom::NodePath;

/// Errors raised while patching a mounted render tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("No node at path {0:?}")]
    InvalidPath(NodePath),

    #[error("Node at {0:?} is not an element")]
    NotAnElement(NodePath),

    #[error("Node at {0:?} is not text")]
    NotText(NodePath),

    #[error("New render has no root matching the mounted tree")]
    NoMatchingRoot,

    #[error("Patched tree diverged from the new render")]
    Diverged,
}
