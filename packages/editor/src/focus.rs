//! # Focus/Selection Orchestrator
//!
//! Owns the single [`FocusState`] describing where the user's attention is,
//! and the [`SyncContext`] holding the two flags shared across components.
//!
//! Every transition replaces the state wholesale with a fresh version.
//! Views subscribe through a [`ViewSubscriber`], which drops versions it
//! has already seen and decides per view whether to scroll:
//!
//! ```text
//! highlight  always
//! scroll     origin != self  &&  intent == Navigate  &&  !scroll_suppressed
//! ```

use quire_common::BlockSyntax;
use quire_vdom::SubTarget;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::locator::{resolve_block_at, BlockAnchor};

/// The three synchronized views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViewKind {
    Source,
    Preview,
    Markup,
}

impl ViewKind {
    pub const ALL: [ViewKind; 3] = [ViewKind::Source, ViewKind::Preview, ViewKind::Markup];
}

/// Why the focus moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FocusIntent {
    /// The user explicitly moved; scrolling is warranted
    #[default]
    Navigate,
    /// A property editor changed the block in place
    EditProperty,
    /// The source changed as a side effect of editing; keep scroll positions
    Recompile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusState {
    pub source_line: Option<usize>,
    pub block: Option<BlockAnchor>,
    /// `None` for changes that no view originated (undo, property panels)
    pub origin: Option<ViewKind>,
    pub intent: FocusIntent,
    pub version: u64,
    /// Finer-grained highlight target inside `block`
    pub sub_target: Option<SubTarget>,
}

/// Cross-component flags, owned by the orchestrator
#[derive(Debug, Clone)]
pub struct SyncContext {
    scroll_suppressed_until: Option<Instant>,
    editing: bool,
    failsafe: Duration,
}

impl SyncContext {
    pub fn new(failsafe: Duration) -> Self {
        Self {
            scroll_suppressed_until: None,
            editing: false,
            failsafe,
        }
    }

    /// A view is rewriting its own surface; hold scrolling until released
    /// or until the failsafe elapses
    pub fn suppress_scroll(&mut self, now: Instant) {
        self.scroll_suppressed_until = Some(now + self.failsafe);
    }

    pub fn release_scroll(&mut self) {
        self.scroll_suppressed_until = None;
    }

    pub fn is_scroll_suppressed(&self, now: Instant) -> bool {
        self.scroll_suppressed_until.is_some_and(|until| now < until)
    }

    /// Clear a suppression whose completion never arrived.
    /// Returns true when the failsafe fired.
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.scroll_suppressed_until {
            Some(until) if now >= until => {
                warn!("scroll suppression not released in time, clearing");
                self.scroll_suppressed_until = None;
                true
            }
            _ => false,
        }
    }

    pub fn set_editing(&mut self, editing: bool) {
        self.editing = editing;
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[derive(Debug)]
pub struct FocusOrchestrator {
    state: FocusState,
    syntax: BlockSyntax,
    context: SyncContext,
}

impl FocusOrchestrator {
    pub fn new(syntax: BlockSyntax, context: SyncContext) -> Self {
        Self {
            state: FocusState::default(),
            syntax,
            context,
        }
    }

    pub fn state(&self) -> &FocusState {
        &self.state
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut SyncContext {
        &mut self.context
    }

    pub fn syntax(&self) -> &BlockSyntax {
        &self.syntax
    }

    /// Move focus to `line`, resolving its enclosing block in `source`
    pub fn focus_block(
        &mut self,
        line: usize,
        origin: Option<ViewKind>,
        intent: FocusIntent,
        source: &str,
    ) -> &FocusState {
        let block = resolve_block_at(line, source, &self.syntax);
        self.replace(FocusState {
            source_line: Some(line),
            block,
            origin,
            intent,
            version: 0,
            sub_target: None,
        })
    }

    /// Drop the active block, e.g. after a resolution miss
    pub fn clear_focus(&mut self, origin: Option<ViewKind>, intent: FocusIntent) -> &FocusState {
        self.replace(FocusState {
            source_line: None,
            block: None,
            origin,
            intent,
            version: 0,
            sub_target: None,
        })
    }

    /// Narrow (or widen, with `None`) the highlight inside the active block
    pub fn select_sub_target(&mut self, target: Option<SubTarget>, origin: Option<ViewKind>) -> &FocusState {
        let next = FocusState {
            origin,
            intent: FocusIntent::EditProperty,
            sub_target: target,
            ..self.state.clone()
        };
        self.replace(next)
    }

    fn replace(&mut self, mut next: FocusState) -> &FocusState {
        next.version = self.state.version + 1;
        debug!(
            version = next.version,
            line = ?next.source_line,
            block = ?next.block,
            origin = ?next.origin,
            intent = ?next.intent,
            "focus changed"
        );
        self.state = next;
        &self.state
    }
}

/// What a view should do for one focus version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewReaction {
    pub view: ViewKind,
    pub version: u64,
    pub block: Option<BlockAnchor>,
    pub sub_target: Option<SubTarget>,
    pub scroll: bool,
}

/// The anti-feedback rule for one view
pub fn should_scroll(view: ViewKind, state: &FocusState, context: &SyncContext, now: Instant) -> bool {
    state.origin != Some(view) && state.intent == FocusIntent::Navigate && !context.is_scroll_suppressed(now)
}

/// Per-view subscription to the focus state
#[derive(Debug, Clone)]
pub struct ViewSubscriber {
    view: ViewKind,
    last_version: Option<u64>,
}

impl ViewSubscriber {
    pub fn new(view: ViewKind) -> Self {
        Self {
            view,
            last_version: None,
        }
    }

    pub fn view(&self) -> ViewKind {
        self.view
    }

    pub fn last_version(&self) -> Option<u64> {
        self.last_version
    }

    /// React to `state` unless this version was already handled
    pub fn react(&mut self, state: &FocusState, context: &SyncContext, now: Instant) -> Option<ViewReaction> {
        if self.last_version.is_some_and(|seen| seen >= state.version) {
            return None;
        }
        self.last_version = Some(state.version);

        Some(ViewReaction {
            view: self.view,
            version: state.version,
            block: state.block.clone(),
            sub_target: state.sub_target.clone(),
            scroll: should_scroll(self.view, state, context, now),
        })
    }
}
