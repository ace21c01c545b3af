//! # Reverse Sync Engine
//!
//! Turns edits made directly in the rendered preview back into source.
//!
//! ```text
//! Idle ─edit─▶ Capturing ─quiet window─▶ Debounced ─reverse compile─▶ Validating
//!                 ▲  │                                                   │
//!                 └──┘ edit (restarts the window)          ┌─────────────┴──────────┐
//!                                                           ▼                        ▼
//!                                                       Committed           Reverted (delayed)
//! ```
//!
//! Each burst of edits gets at most one validation: a new edit replaces the
//! pending capture and restarts its window instead of queuing another one.
//! Failures never escape the engine; they become a [`Notice`] plus a
//! delayed revert of the preview to the last known-good render.

use quire_common::BlockSyntax;
use quire_vdom::{renders_equivalent, CompileOptions, CompileOutput, Compiler, RenderTree, StripRules};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::focus::{FocusState, SyncContext};
use crate::identity_resolver::{resolve_block_identity, IdentityHint};
use crate::locator::{resolve_block_at, BlockAnchor};
use crate::notice::{Notice, NoticeKind};
use crate::store::{ChangeOrigin, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Capturing,
    Debounced,
    Validating,
    Committed,
    Reverted,
}

#[derive(Debug, Clone)]
pub struct ReverseSyncConfig {
    pub debounce: Duration,
    pub revert_delay: Duration,
    pub strip: StripRules,
    pub syntax: BlockSyntax,
}

impl ReverseSyncConfig {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            debounce: config.reverse_sync_debounce(),
            revert_delay: config.revert_delay(),
            strip: config.strip_rules(),
            syntax: config.syntax.clone(),
        }
    }
}

impl Default for ReverseSyncConfig {
    fn default() -> Self {
        Self::from_config(&EditorConfig::default())
    }
}

/// Result of a fired timer
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The store now holds the reverse-compiled source
    Committed {
        output: CompileOutput,
        /// Where the edited block landed, `None` on a resolution miss
        focus: Option<BlockAnchor>,
    },
    /// Valid, but nothing to write
    Unchanged,
    /// Rejected; a notice is queued and a revert scheduled
    Failed,
    /// Restore the preview from the last known-good render
    Revert,
}

#[derive(Debug)]
struct PendingEdit {
    tree: RenderTree,
    due_at: Instant,
    hint: Option<IdentityHint>,
    edits: usize,
}

#[derive(Debug)]
pub struct ReverseSyncEngine {
    config: ReverseSyncConfig,
    phase: SyncPhase,
    pending: Option<PendingEdit>,
    revert_due: Option<Instant>,
    /// Recompiled preview held back while the preview is busy
    queued_view: Option<RenderTree>,
    notices: Vec<Notice>,
    /// Identifies the last reported failure so repeats stay quiet
    last_failure: Option<String>,
}

impl ReverseSyncEngine {
    pub fn new(config: ReverseSyncConfig) -> Self {
        Self {
            config,
            phase: SyncPhase::Idle,
            pending: None,
            revert_due: None,
            queued_view: None,
            notices: Vec::new(),
            last_failure: None,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn revert_scheduled(&self) -> bool {
        self.revert_due.is_some()
    }

    /// Capture an edited preview tree.
    ///
    /// `edit_line` is the origin line of the edited node, used to record
    /// which block was being edited; the focused block is the fallback.
    pub fn on_edit(
        &mut self,
        now: Instant,
        tree: RenderTree,
        edit_line: Option<usize>,
        source: &str,
        focus: &FocusState,
        context: &mut SyncContext,
    ) {
        // a newer edit supersedes a scheduled revert
        self.revert_due = None;
        let due_at = now + self.config.debounce;

        match &mut self.pending {
            Some(pending) => {
                pending.tree = tree;
                pending.due_at = due_at;
                pending.edits += 1;
            }
            None => {
                let anchor = edit_line
                    .and_then(|line| resolve_block_at(line, source, &self.config.syntax))
                    .or_else(|| focus.block.clone());
                let hint = anchor.map(|anchor| IdentityHint::capture(anchor, source, &self.config.syntax));
                debug!(?hint, "capturing preview edit");
                self.pending = Some(PendingEdit {
                    tree,
                    due_at,
                    hint,
                    edits: 1,
                });
            }
        }

        self.phase = SyncPhase::Capturing;
        context.set_editing(true);
    }

    /// Drop an uncommitted capture, e.g. when the source changed underneath it
    pub fn cancel(&mut self, context: &mut SyncContext) {
        if self.pending.take().is_some() {
            debug!("pending preview edit cancelled");
        }
        self.revert_due = None;
        self.phase = SyncPhase::Idle;
        context.set_editing(false);
    }

    /// Fire whichever timer is due
    pub fn poll<C: Compiler>(
        &mut self,
        now: Instant,
        compiler: &C,
        options: &CompileOptions,
        store: &mut DocumentStore,
        current: &CompileOutput,
        context: &mut SyncContext,
    ) -> Option<SyncOutcome> {
        if self.pending.is_none() {
            if let Some(due) = self.revert_due.filter(|due| now >= *due) {
                debug!(?due, "reverting preview to last good render");
                self.revert_due = None;
                self.last_failure = None;
                self.phase = SyncPhase::Reverted;
                return Some(SyncOutcome::Revert);
            }
        }

        if !self.pending.as_ref().is_some_and(|p| now >= p.due_at) {
            return None;
        }
        let pending = self.pending.take()?;
        let outcome = self.validate(now, pending, compiler, options, store, current);
        context.set_editing(false);
        Some(outcome)
    }

    fn validate<C: Compiler>(
        &mut self,
        now: Instant,
        pending: PendingEdit,
        compiler: &C,
        options: &CompileOptions,
        store: &mut DocumentStore,
        current: &CompileOutput,
    ) -> SyncOutcome {
        self.phase = SyncPhase::Debounced;
        debug!(edits = pending.edits, "debounce fired");

        let edited = self.config.strip.strip(&pending.tree);
        let candidate = match compiler.reverse_compile(&edited) {
            Ok(candidate) => candidate,
            Err(e) => return self.fail(now, NoticeKind::Internal, e.to_string(), e.to_string()),
        };

        self.phase = SyncPhase::Validating;
        let compiled = match compiler.compile(&candidate, options) {
            Ok(compiled) => compiled,
            Err(e) => return self.fail(now, NoticeKind::Internal, e.to_string(), candidate),
        };
        if let Some(diagnostic) = compiled.errors().next() {
            let message = format!(
                "Edit reverted: line {}: {}",
                diagnostic.line, diagnostic.message
            );
            return self.fail(now, NoticeKind::CompileFailure, message, candidate);
        }

        let strip = &self.config.strip;
        // a mismatch with the old render too means the edit was dropped,
        // not undone by the user
        if !renders_equivalent(&edited, &compiled.render, strip)
            && !renders_equivalent(&edited, &current.render, strip)
        {
            warn!("preview edit did not survive the round trip");
            self.notices.push(Notice::new(
                NoticeKind::UnsupportedEdit,
                "Part of this edit cannot be expressed in source and was not kept",
            ));
        }

        if candidate == store.source() || renders_equivalent(&compiled.render, &current.render, strip) {
            debug!("preview edit has no effect on the document");
            self.phase = SyncPhase::Idle;
            return SyncOutcome::Unchanged;
        }

        store.set_source(candidate, ChangeOrigin::Preview);
        let focus = pending
            .hint
            .as_ref()
            .and_then(|hint| resolve_block_identity(hint, store.source(), &self.config.syntax));
        info!(revision = store.revision(), ?focus, "preview edit committed");

        self.last_failure = None;
        self.phase = SyncPhase::Committed;
        SyncOutcome::Committed {
            output: compiled,
            focus,
        }
    }

    fn fail(&mut self, now: Instant, kind: NoticeKind, message: String, failure_key: String) -> SyncOutcome {
        warn!(?kind, %message, "preview edit rejected");
        if self.last_failure.as_deref() == Some(failure_key.as_str()) {
            debug!("failure already reported");
        } else {
            self.notices.push(Notice::new(kind, message));
            self.last_failure = Some(failure_key);
        }
        self.revert_due = Some(now + self.config.revert_delay);
        self.phase = SyncPhase::Reverted;
        SyncOutcome::Failed
    }

    /// Hand a recompiled render to the preview, or hold it while the
    /// preview has input focus or uncommitted edits
    pub fn offer_view_update(&mut self, render: RenderTree, view_busy: bool) -> Option<RenderTree> {
        if view_busy || self.pending.is_some() {
            debug!("preview busy, queueing update");
            self.queued_view = Some(render);
            return None;
        }
        self.queued_view = None;
        Some(render)
    }

    /// Release the queued update once the preview loses focus
    pub fn on_blur(&mut self) -> Option<RenderTree> {
        if self.pending.is_some() {
            return None;
        }
        self.queued_view.take()
    }

    pub fn has_queued_view(&self) -> bool {
        self.queued_view.is_some()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
