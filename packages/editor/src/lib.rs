//! # Quire Editor
//!
//! Keeps the source text, the live preview and the raw markup of one
//! document in sync.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ views: source │ preview │ raw markup        │
//! └─────────────────────────────────────────────┘
//!        │ positions              │ preview edits
//!        ↓                        ↓
//! ┌──────────────────────┐  ┌──────────────────────┐
//! │ focus orchestrator   │  │ reverse sync engine  │
//! │  - block locator     │  │  - debounce          │
//! │  - versioned state   │  │  - reverse compile   │
//! │  - scroll arbitration│  │  - validate / revert │
//! └──────────────────────┘  └──────────────────────┘
//!                                 │ commit
//!                                 ↓
//! ┌─────────────────────────────────────────────┐
//! │ document store: the only write path         │
//! │  → undo manager (checkpoints + patches)     │
//! │  → compiler → render patcher → preview      │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Source is the truth**: renders are derived, and only source is persisted
//! 2. **No feedback loops**: a view never scrolls in response to its own event
//! 3. **Patch, don't remount**: live preview state survives recompiles
//! 4. **Failures stay local**: a bad preview edit reverts with a notice
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quire_editor::{DocumentId, EditorConfig, EditorSession, ViewKind, ViewPosition};
//!
//! let mut session = EditorSession::open(DocumentId::new("deck"), source, compiler, EditorConfig::default())?;
//!
//! session.move_cursor(ViewKind::Source, ViewPosition::SourceLine(12));
//! session.edit_preview(now, edited_tree, Some(&path));
//!
//! // once per frame
//! for command in session.tick(Instant::now()) {
//!     host.apply(command);
//! }
//! ```

mod config;
mod errors;
mod focus;
mod identity_resolver;
mod locator;
mod notice;
mod persistence;
mod reverse_sync;
mod session;
mod store;
mod text_patch;
mod undo_manager;

pub use config::{EditorConfig, DEFAULT_CONFIG_NAME};
pub use errors::EditorError;
pub use focus::{
    should_scroll, FocusIntent, FocusOrchestrator, FocusState, SyncContext, ViewKind, ViewReaction,
    ViewSubscriber,
};
pub use identity_resolver::{resolve_block_identity, resolve_by_proximity, IdentityHint};
pub use locator::{block_line_range, find_block_node, find_render_node_for_line, resolve_block_at, BlockAnchor};
pub use notice::{Notice, NoticeKind};
pub use persistence::{
    Checkpoint, FileHistoryStore, HistoryError, HistoryStore, HistoryWriter, MemoryHistoryStore,
    PersistedHistory,
};
pub use reverse_sync::{ReverseSyncConfig, ReverseSyncEngine, SyncOutcome, SyncPhase};
pub use session::{EditorSession, ViewCommand, ViewPosition, ViewTarget};
pub use store::{ChangeOrigin, DocumentId, DocumentStore};
pub use text_patch::TextPatch;
pub use undo_manager::{UndoConfig, UndoManager};
