//! # Editor Session
//!
//! One open document and its three views. The host forwards view events
//! (`edit_*`, `move_cursor`, focus changes) and calls [`EditorSession::tick`]
//! once per frame; `tick` fires due timers and returns the commands each
//! view should carry out.

use quire_common::LineIndex;
use quire_vdom::{
    find_path_by_key, origin_line_at_path, render_markup, resolve_sub_target, CompileOptions,
    CompileOutput, Compiler, Diagnostic, LiveSurface, MarkupOptions, NodePath, RenderPatcher,
    RenderTree, RenderedMarkup, SubTarget, UpdateOutcome,
};
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::errors::EditorError;
use crate::focus::{FocusIntent, FocusOrchestrator, FocusState, SyncContext, ViewKind, ViewReaction, ViewSubscriber};
use crate::locator::{block_line_range, find_block_node, BlockAnchor};
use crate::notice::Notice;
use crate::persistence::{HistoryStore, HistoryWriter};
use crate::reverse_sync::{ReverseSyncConfig, ReverseSyncEngine, SyncOutcome, SyncPhase};
use crate::store::{ChangeOrigin, DocumentId, DocumentStore};
use crate::undo_manager::{UndoConfig, UndoManager};

/// A location reported by one of the views
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewPosition {
    SourceLine(usize),
    /// Byte offset into the source text, as a text widget reports its caret
    SourceOffset(usize),
    /// Stable node key in the preview
    PreviewKey(String),
    PreviewPath(NodePath),
    /// Byte offset into the raw markup text
    MarkupOffset(usize),
}

/// Where a highlight or scroll lands in a given view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewTarget {
    SourceLines { start: usize, end: usize },
    PreviewNode(NodePath),
    MarkupRange { start: usize, end: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewCommand {
    /// Move the highlight; `None` clears it
    Highlight {
        view: ViewKind,
        target: Option<ViewTarget>,
        version: u64,
    },
    Scroll {
        view: ViewKind,
        target: ViewTarget,
    },
    PreviewUpdated(UpdateOutcome),
    MarkupUpdated,
    Notice(Notice),
}

#[derive(Debug)]
pub struct EditorSession<C: Compiler> {
    compiler: C,
    config: EditorConfig,
    options: CompileOptions,
    store: DocumentStore,
    /// Compile of the current source, the last known-good render
    compiled: CompileOutput,
    markup: RenderedMarkup,
    preview: LiveSurface,
    patcher: RenderPatcher,
    focus: FocusOrchestrator,
    subscribers: Vec<ViewSubscriber>,
    reverse_sync: ReverseSyncEngine,
    history: UndoManager,
    preview_focused: bool,
    commands: Vec<ViewCommand>,
}

impl<C: Compiler> EditorSession<C> {
    pub fn open(id: DocumentId, source: impl Into<String>, compiler: C, config: EditorConfig) -> Result<Self, EditorError> {
        let source = source.into();
        let history = UndoManager::new(id.clone(), source.as_str(), UndoConfig::from_config(&config));
        Self::open_inner(id, source, compiler, config, history)
    }

    /// Open with undo history restored from `store`; snapshots go to `writer`
    pub fn open_with_history(
        id: DocumentId,
        source: impl Into<String>,
        compiler: C,
        config: EditorConfig,
        store: &dyn HistoryStore,
        writer: HistoryWriter,
    ) -> Result<Self, EditorError> {
        let source = source.into();
        let undo_config = UndoConfig::from_config(&config);
        let history = match store.load(&id) {
            Ok(Some(persisted)) => UndoManager::restore(id.clone(), &source, persisted, undo_config),
            Ok(None) => UndoManager::new(id.clone(), source.as_str(), undo_config),
            Err(e) => {
                warn!(document = %id, error = %e, "could not load stored history");
                UndoManager::new(id.clone(), source.as_str(), undo_config)
            }
        };
        Self::open_inner(id, source, compiler, config, history.with_writer(writer))
    }

    fn open_inner(
        id: DocumentId,
        source: String,
        compiler: C,
        config: EditorConfig,
        history: UndoManager,
    ) -> Result<Self, EditorError> {
        let options = CompileOptions {
            theme: None,
            document_id: Some(id.to_string()),
        };
        let compiled = compiler.compile(&source, &options)?;
        let context = SyncContext::new(config.scroll_suppression_failsafe());

        let mut session = Self {
            focus: FocusOrchestrator::new(config.syntax.clone(), context),
            reverse_sync: ReverseSyncEngine::new(ReverseSyncConfig::from_config(&config)),
            subscribers: ViewKind::ALL.into_iter().map(ViewSubscriber::new).collect(),
            store: DocumentStore::new(id, source),
            markup: RenderedMarkup::default(),
            compiled: CompileOutput::default(),
            preview: LiveSurface::new(),
            patcher: RenderPatcher::new(),
            preview_focused: false,
            commands: Vec::new(),
            compiler,
            config,
            options,
            history,
        };
        session.install(compiled);
        Ok(session)
    }

    pub fn id(&self) -> &DocumentId {
        self.store.id()
    }

    pub fn source(&self) -> &str {
        self.store.source()
    }

    pub fn revision(&self) -> u64 {
        self.store.revision()
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn focus_state(&self) -> &FocusState {
        self.focus.state()
    }

    pub fn sync_context(&self) -> &SyncContext {
        self.focus.context()
    }

    pub fn compiled(&self) -> &CompileOutput {
        &self.compiled
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.compiled.diagnostics
    }

    pub fn markup(&self) -> &RenderedMarkup {
        &self.markup
    }

    pub fn preview(&self) -> &LiveSurface {
        &self.preview
    }

    /// Hosts record hover, selection and scroll on the live surface
    pub fn preview_mut(&mut self) -> &mut LiveSurface {
        &mut self.preview
    }

    pub fn history(&self) -> &UndoManager {
        &self.history
    }

    pub fn sync_phase(&self) -> SyncPhase {
        self.reverse_sync.phase()
    }

    /// Source view edit
    pub fn edit_source(&mut self, now: Instant, source: &str) -> Result<bool, EditorError> {
        if !self.store.set_source(source.to_string(), ChangeOrigin::SourceView) {
            return Ok(false);
        }
        self.reverse_sync.cancel(self.focus.context_mut());
        self.history.record_change(now, self.store.source());
        self.recompile()?;
        self.refocus(Some(ViewKind::Source), FocusIntent::Recompile);
        Ok(true)
    }

    /// Property panel edit of the block at `block_line`; never scrolls
    pub fn edit_property(&mut self, now: Instant, block_line: usize, source: &str) -> Result<bool, EditorError> {
        if !self.store.set_source(source.to_string(), ChangeOrigin::Property) {
            return Ok(false);
        }
        self.reverse_sync.cancel(self.focus.context_mut());
        self.history.record_change(now, self.store.source());
        self.recompile()?;
        self.focus
            .focus_block(block_line, None, FocusIntent::EditProperty, self.store.source());
        Ok(true)
    }

    /// Switch the preview theme; the preview is remounted
    pub fn set_theme(&mut self, theme: Option<String>) -> Result<(), EditorError> {
        if self.options.theme == theme {
            return Ok(());
        }
        self.options.theme = theme;
        self.recompile()
    }

    /// A view reports where the user now is
    pub fn move_cursor(&mut self, view: ViewKind, position: ViewPosition) -> Option<&FocusState> {
        let line = match position {
            ViewPosition::SourceLine(line) => Some(line),
            ViewPosition::SourceOffset(offset) => {
                let source = self.store.source();
                match LineIndex::new(source).line_col(source, offset) {
                    Ok((line, _)) => Some(line),
                    Err(e) => {
                        debug!(error = %e, "ignoring source caret");
                        None
                    }
                }
            }
            ViewPosition::PreviewKey(key) => {
                let tree = self.preview.tree().unwrap_or(&self.compiled.render);
                find_path_by_key(tree, &key).and_then(|path| origin_line_at_path(tree, &path))
            }
            ViewPosition::PreviewPath(path) => {
                let tree = self.preview.tree().unwrap_or(&self.compiled.render);
                origin_line_at_path(tree, &path)
            }
            ViewPosition::MarkupOffset(offset) => self.markup.origin_line_at(offset),
        };

        let Some(line) = line else {
            debug!(?view, "position has no source line");
            return None;
        };
        Some(
            self.focus
                .focus_block(line, Some(view), FocusIntent::Navigate, self.store.source()),
        )
    }

    pub fn select_sub_target(&mut self, view: Option<ViewKind>, target: Option<SubTarget>) -> &FocusState {
        self.focus.select_sub_target(target, view)
    }

    /// The user edited the preview in place; `edit_path` is the edited node
    pub fn edit_preview(&mut self, now: Instant, edited: RenderTree, edit_path: Option<&[usize]>) {
        let edit_line = edit_path.and_then(|path| origin_line_at_path(&edited, path));
        // the surface now shows what was typed; a revert has to diff against it
        self.preview.record_user_edit(self.config.strip_rules().strip(&edited));
        let focus = self.focus.state().clone();
        self.reverse_sync.on_edit(
            now,
            edited,
            edit_line,
            self.store.source(),
            &focus,
            self.focus.context_mut(),
        );
    }

    pub fn preview_focus_changed(&mut self, focused: bool) {
        self.preview_focused = focused;
        if focused {
            return;
        }
        if let Some(render) = self.reverse_sync.on_blur() {
            debug!("flushing queued preview update");
            self.patch_preview(render);
        }
    }

    /// A view starts rewriting its own surface; scrolling pauses
    pub fn begin_surface_rewrite(&mut self, now: Instant) {
        self.focus.context_mut().suppress_scroll(now);
    }

    pub fn end_surface_rewrite(&mut self) {
        self.focus.context_mut().release_scroll();
    }

    pub fn undo(&mut self) -> Result<bool, EditorError> {
        match self.history.undo()? {
            Some(source) => self.apply_history(source),
            None => Ok(false),
        }
    }

    pub fn redo(&mut self) -> Result<bool, EditorError> {
        match self.history.redo()? {
            Some(source) => self.apply_history(source),
            None => Ok(false),
        }
    }

    fn apply_history(&mut self, source: String) -> Result<bool, EditorError> {
        self.reverse_sync.cancel(self.focus.context_mut());
        if !self.store.set_source(source, ChangeOrigin::History) {
            return Ok(false);
        }
        self.recompile()?;
        self.refocus(None, FocusIntent::Recompile);
        Ok(true)
    }

    /// Fire due timers and collect what each view should do
    pub fn tick(&mut self, now: Instant) -> Vec<ViewCommand> {
        self.focus.context_mut().expire(now);

        let outcome = self.reverse_sync.poll(
            now,
            &self.compiler,
            &self.options,
            &mut self.store,
            &self.compiled,
            self.focus.context_mut(),
        );
        if let Some(outcome) = outcome {
            self.apply_sync(now, outcome);
        }

        self.history.poll(now);

        let notices = self.reverse_sync.drain_notices();
        self.commands.extend(notices.into_iter().map(ViewCommand::Notice));
        self.react(now);

        std::mem::take(&mut self.commands)
    }

    fn apply_sync(&mut self, now: Instant, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Committed { output, focus } => {
                self.history.record_change(now, self.store.source());
                self.install(output);
                match focus {
                    Some(anchor) => {
                        self.focus.focus_block(
                            anchor.line,
                            Some(ViewKind::Preview),
                            FocusIntent::Recompile,
                            self.store.source(),
                        );
                    }
                    None => {
                        self.focus.clear_focus(Some(ViewKind::Preview), FocusIntent::Recompile);
                    }
                }
            }
            SyncOutcome::Revert => {
                let render = self.compiled.render.clone();
                self.patch_preview(render);
            }
            SyncOutcome::Unchanged | SyncOutcome::Failed => {}
        }
    }

    fn recompile(&mut self) -> Result<(), EditorError> {
        let output = self.compiler.compile(self.store.source(), &self.options)?;
        self.install(output);
        Ok(())
    }

    fn install(&mut self, output: CompileOutput) {
        self.markup = render_markup(&output.render, MarkupOptions::default());
        self.commands.push(ViewCommand::MarkupUpdated);

        let busy = self.preview_focused || self.focus.context().is_editing();
        if let Some(render) = self.reverse_sync.offer_view_update(output.render.clone(), busy) {
            self.patch_preview(render);
        }
        self.compiled = output;
    }

    fn patch_preview(&mut self, render: RenderTree) {
        let outcome = self
            .patcher
            .update(&mut self.preview, render, self.options.theme.as_deref());
        self.commands.push(ViewCommand::PreviewUpdated(outcome));
    }

    /// Re-resolve the focused line against the new source
    fn refocus(&mut self, origin: Option<ViewKind>, intent: FocusIntent) {
        match self.focus.state().source_line {
            Some(line) => {
                self.focus.focus_block(line, origin, intent, self.store.source());
            }
            None => {
                self.focus.clear_focus(origin, intent);
            }
        }
    }

    fn react(&mut self, now: Instant) {
        let state = self.focus.state().clone();
        let context = self.focus.context();
        let reactions: Vec<ViewReaction> = self
            .subscribers
            .iter_mut()
            .filter_map(|subscriber| subscriber.react(&state, context, now))
            .collect();

        for reaction in reactions {
            let target = self.resolve_target(reaction.view, reaction.block.as_ref(), reaction.sub_target.as_ref());
            if reaction.view == ViewKind::Preview {
                let path = match &target {
                    Some(ViewTarget::PreviewNode(path)) => Some(path.as_slice()),
                    _ => None,
                };
                self.preview.set_active(path);
            }

            if let (true, Some(target)) = (reaction.scroll, target.clone()) {
                self.commands.push(ViewCommand::Scroll {
                    view: reaction.view,
                    target,
                });
            }
            self.commands.push(ViewCommand::Highlight {
                view: reaction.view,
                target,
                version: reaction.version,
            });
        }
    }

    fn resolve_target(
        &self,
        view: ViewKind,
        block: Option<&BlockAnchor>,
        sub_target: Option<&SubTarget>,
    ) -> Option<ViewTarget> {
        let block = block?;
        match view {
            ViewKind::Source => block_line_range(self.store.source(), block, &self.config.syntax)
                .map(|(start, end)| ViewTarget::SourceLines { start, end }),
            ViewKind::Preview => {
                let tree = self.preview.tree()?;
                node_target(tree, block, sub_target)
                    .or_else(|| {
                        // the mounted tree lags behind a queued update; join on the key
                        let path = node_target(&self.compiled.render, block, sub_target)?;
                        let key = self.compiled.render.node_at(&path)?.key()?;
                        find_path_by_key(tree, key)
                    })
                    .map(ViewTarget::PreviewNode)
            }
            ViewKind::Markup => {
                let path = node_target(&self.compiled.render, block, sub_target)?;
                self.markup
                    .span_for_path(&path)
                    .map(|span| ViewTarget::MarkupRange {
                        start: span.start,
                        end: span.end,
                    })
            }
        }
    }
}

/// Block root path, narrowed to the sub-target when one resolves
fn node_target(tree: &RenderTree, block: &BlockAnchor, sub_target: Option<&SubTarget>) -> Option<NodePath> {
    let root = find_block_node(tree, block)?;
    let narrowed = sub_target.and_then(|target| resolve_sub_target(tree, &root, target));
    Some(narrowed.unwrap_or(root))
}
