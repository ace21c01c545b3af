//! # Incremental Render Patcher
//!
//! Applies a new render to a live surface without remounting it. The
//! surface carries transient UI state the compiler knows nothing about
//! (active/hover/selection markers, input focus, scroll anchor); after a
//! patch each piece is re-resolved onto its matching new node.
//!
//! Patching is a [`PatchStrategy`]. When there is nothing mounted, the
//! theme changed, the strategy declines, or the patch fails, the patcher
//! degrades to a full replace. A full replace is always correct, it just
//! loses the transient state.

use tracing::debug;

use crate::differ::{apply_patches, diff_render_tree};
use crate::error::PatchError;
use crate::identity::NodeAnchor;
use crate::vdom::{NodePath, RenderTree, VNode};

pub const ACTIVE_ATTR: &str = "data-active";
pub const HOVER_ATTR: &str = "data-hover";
pub const SELECTED_ATTR: &str = "data-selected";

/// Scroll position pinned to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollPosition {
    pub anchor: Option<NodeAnchor>,
    /// Offset from the anchor (or from the top when unanchored)
    pub offset: u32,
}

/// UI state layered on top of a mounted tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransientState {
    pub active: Option<NodeAnchor>,
    pub hover: Option<NodeAnchor>,
    pub selection: Option<NodeAnchor>,
    pub focus: Option<NodeAnchor>,
    pub scroll: Option<ScrollPosition>,
}

/// A mounted render surface (the live preview)
#[derive(Debug, Default)]
pub struct LiveSurface {
    tree: Option<RenderTree>,
    theme: Option<String>,
    transient: TransientState,
    mounts: u64,
}

impl LiveSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.tree.is_some()
    }

    pub fn tree(&self) -> Option<&RenderTree> {
        self.tree.as_ref()
    }

    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref()
    }

    pub fn transient(&self) -> &TransientState {
        &self.transient
    }

    /// Number of full mounts so far
    pub fn mount_count(&self) -> u64 {
        self.mounts
    }

    pub fn set_active(&mut self, path: Option<&[usize]>) {
        self.transient.active = self.anchor(path);
    }

    pub fn set_hover(&mut self, path: Option<&[usize]>) {
        self.transient.hover = self.anchor(path);
    }

    pub fn set_selection(&mut self, path: Option<&[usize]>) {
        self.transient.selection = self.anchor(path);
    }

    pub fn set_focus(&mut self, path: Option<&[usize]>) {
        self.transient.focus = self.anchor(path);
    }

    pub fn set_scroll(&mut self, path: Option<&[usize]>, offset: u32) {
        self.transient.scroll = Some(ScrollPosition {
            anchor: self.anchor(path),
            offset,
        });
    }

    pub fn active_path(&self) -> Option<NodePath> {
        self.resolve(self.transient.active.as_ref())
    }

    pub fn hover_path(&self) -> Option<NodePath> {
        self.resolve(self.transient.hover.as_ref())
    }

    pub fn selection_path(&self) -> Option<NodePath> {
        self.resolve(self.transient.selection.as_ref())
    }

    pub fn focus_path(&self) -> Option<NodePath> {
        self.resolve(self.transient.focus.as_ref())
    }

    /// The mounted tree with marker attributes applied, as a host would see it
    pub fn decorated(&self) -> Option<RenderTree> {
        let mut tree = self.tree.clone()?;
        let markers = [
            (self.active_path(), ACTIVE_ATTR),
            (self.hover_path(), HOVER_ATTR),
            (self.selection_path(), SELECTED_ATTR),
        ];
        for (path, attr) in markers {
            let Some(path) = path else {
                continue;
            };
            if let Some(VNode::Element { attributes, .. }) = tree.node_at_mut(&path) {
                attributes.insert(attr.to_string(), "true".to_string());
            }
        }
        Some(tree)
    }

    /// Take on what the user typed straight into the surface.
    ///
    /// The next update then diffs against the edited content, so pushing
    /// the last good render undoes the edit. Ignored when nothing is mounted.
    pub fn record_user_edit(&mut self, tree: RenderTree) {
        if self.tree.is_none() {
            return;
        }
        self.tree = Some(tree);
        self.reattach();
    }

    fn anchor(&self, path: Option<&[usize]>) -> Option<NodeAnchor> {
        NodeAnchor::capture(self.tree.as_ref()?, path?)
    }

    fn resolve(&self, anchor: Option<&NodeAnchor>) -> Option<NodePath> {
        anchor?.resolve(self.tree.as_ref()?)
    }

    fn mount(&mut self, tree: RenderTree, theme: Option<&str>) {
        self.tree = Some(tree);
        self.theme = theme.map(str::to_string);
        self.transient = TransientState::default();
        self.mounts += 1;
    }

    /// Re-resolve every transient anchor against the current tree
    fn reattach(&mut self) -> (usize, usize) {
        let Some(tree) = self.tree.as_ref() else {
            return (0, 0);
        };
        let mut kept = 0;
        let mut dropped = 0;
        let mut carry = |slot: &mut Option<NodeAnchor>| {
            if let Some(anchor) = slot.take() {
                match anchor.resolve(tree).and_then(|p| NodeAnchor::capture(tree, &p)) {
                    Some(next) => {
                        *slot = Some(next);
                        kept += 1;
                    }
                    None => dropped += 1,
                }
            }
        };
        carry(&mut self.transient.active);
        carry(&mut self.transient.hover);
        carry(&mut self.transient.selection);
        carry(&mut self.transient.focus);
        if let Some(scroll) = self.transient.scroll.as_mut() {
            // an orphaned scroll anchor keeps its offset from the top
            carry(&mut scroll.anchor);
        }
        (kept, dropped)
    }
}

/// Counters from a successful in-place patch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub patches: usize,
    pub reattached: usize,
    pub dropped: usize,
}

/// Why the patcher fell back to a full replace
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceReason {
    NotMounted,
    ThemeChanged,
    Incompatible,
    PatchFailed(PatchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Patched(PatchStats),
    Replaced(ReplaceReason),
}

/// Strategy for updating a mounted tree in place
pub trait PatchStrategy: std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Cheap check whether an in-place patch is worth attempting
    fn can_patch(&self, old: &RenderTree, new: &RenderTree) -> bool;

    /// Patch `mounted` until it equals `new`; returns the number of edits
    fn patch(&self, mounted: &mut RenderTree, new: &RenderTree) -> Result<usize, PatchError>;
}

/// Node-by-node diff then apply
#[derive(Debug, Default)]
pub struct DiffPatchStrategy;

impl PatchStrategy for DiffPatchStrategy {
    fn name(&self) -> &'static str {
        "diff"
    }

    fn can_patch(&self, old: &RenderTree, new: &RenderTree) -> bool {
        shares_root(old, new)
    }

    fn patch(&self, mounted: &mut RenderTree, new: &RenderTree) -> Result<usize, PatchError> {
        if !shares_root(mounted, new) {
            return Err(PatchError::NoMatchingRoot);
        }
        let patches = diff_render_tree(mounted, new);
        apply_patches(mounted, &patches)?;
        if mounted != new {
            return Err(PatchError::Diverged);
        }
        Ok(patches.len())
    }
}

/// Some root of `new` has the same key (or, unkeyed, the same tag) as a mounted root
fn shares_root(old: &RenderTree, new: &RenderTree) -> bool {
    let identity = |n: &VNode| (n.key().map(str::to_string), n.tag().map(str::to_string));
    new.nodes.iter().any(|n| {
        let id = identity(n);
        id.1.is_some() && old.nodes.iter().any(|o| identity(o) == id)
    })
}

/// Strategy that never patches; every update remounts
#[derive(Debug, Default)]
pub struct FullReplaceStrategy;

impl PatchStrategy for FullReplaceStrategy {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn can_patch(&self, _old: &RenderTree, _new: &RenderTree) -> bool {
        false
    }

    fn patch(&self, _mounted: &mut RenderTree, _new: &RenderTree) -> Result<usize, PatchError> {
        Err(PatchError::NoMatchingRoot)
    }
}

#[derive(Debug)]
pub struct RenderPatcher {
    strategy: Box<dyn PatchStrategy>,
}

impl Default for RenderPatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPatcher {
    pub fn new() -> Self {
        Self::with_strategy(Box::new(DiffPatchStrategy))
    }

    pub fn with_strategy(strategy: Box<dyn PatchStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Bring `surface` up to date with `new`
    pub fn update(&self, surface: &mut LiveSurface, new: RenderTree, theme: Option<&str>) -> UpdateOutcome {
        let attempt = match surface.tree.as_mut() {
            None => Err(ReplaceReason::NotMounted),
            Some(_) if surface.theme.as_deref() != theme => Err(ReplaceReason::ThemeChanged),
            Some(mounted) if !self.strategy.can_patch(mounted, &new) => Err(ReplaceReason::Incompatible),
            Some(mounted) => self
                .strategy
                .patch(mounted, &new)
                .map_err(ReplaceReason::PatchFailed),
        };

        let reason = match attempt {
            Ok(count) => {
                let (reattached, dropped) = surface.reattach();
                debug!(
                    strategy = self.strategy.name(),
                    patches = count,
                    reattached,
                    dropped,
                    "patched live surface in place"
                );
                return UpdateOutcome::Patched(PatchStats {
                    patches: count,
                    reattached,
                    dropped,
                });
            }
            Err(reason) => reason,
        };

        debug!(?reason, "full replace of live surface");
        surface.mount(new, theme);
        UpdateOutcome::Replaced(reason)
    }
}
