//! # Quire Render Tree
//!
//! The compiled side of a document: the render tree and its identity
//! markers, lookups between source lines and nodes, the raw-markup
//! serialization, and in-place patching of a live surface.

pub mod compiler;
pub mod differ;
pub mod error;
pub mod identity;
pub mod locate;
pub mod markup;
pub mod patcher;
pub mod vdom;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use compiler::{
    CompileOptions, CompileOutput, Compiler, CompilerError, Diagnostic, LineMapping, Severity,
};
pub use differ::{apply_patches, diff_render_tree, RenderPatch};
pub use error::PatchError;
pub use identity::{find_block_path, find_path_by_key, resolve_sub_target, NodeAnchor, SubTarget};
pub use locate::{
    block_roots, enclosing_block_path, find_path_for_line, find_render_node_for_line,
    origin_line_at_path,
};
pub use markup::{
    normalize_whitespace, render_markup, renders_equivalent, to_html, MarkupOptions, MarkupSpan,
    RenderedMarkup, StripRules,
};
pub use patcher::{
    DiffPatchStrategy, FullReplaceStrategy, LiveSurface, PatchStats, PatchStrategy, RenderPatcher,
    ReplaceReason, ScrollPosition, TransientState, UpdateOutcome,
};
pub use vdom::{NodePath, RenderTree, VNode, WalkControl};
