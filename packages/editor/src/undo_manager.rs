//! # Undo Manager
//!
//! Per-document edit history over the source text, independent of any
//! view's native undo.
//!
//! ## Design
//!
//! - History positions are absolute states; `patches[i]` leads from state
//!   `base + i` to `base + i + 1`
//! - Checkpoints are full snapshots; the first always sits at `base`
//! - Any state is rebuilt by replaying patches from the nearest checkpoint
//!   at or below it
//! - Edits inside the group window merge into the previous step
//! - A checkpoint is taken once edits go quiet for the checkpoint delay
//! - Past `max_chain` patches, the oldest half collapses into a checkpoint;
//!   past the byte budget, the oldest checkpoints are evicted
//! - Recording after an undo drops the redo branch
//! - Snapshots go to a [`HistoryWriter`] and never block the caller
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut history = UndoManager::new(id, source, UndoConfig::default());
//! history.record_change(now, &edited);
//! let previous = history.undo()?; // Some(source)
//! ```

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::EditorConfig;
use crate::persistence::{Checkpoint, HistoryError, HistoryWriter, PersistedHistory};
use crate::store::DocumentId;
use crate::text_patch::TextPatch;

#[derive(Debug, Clone)]
pub struct UndoConfig {
    pub group_window: Duration,
    pub checkpoint_delay: Duration,
    pub max_chain: usize,
    pub byte_budget: usize,
}

impl UndoConfig {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            group_window: config.undo_group_window(),
            checkpoint_delay: config.checkpoint_delay(),
            max_chain: config.max_patch_chain,
            byte_budget: config.history_byte_budget,
        }
    }
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self::from_config(&EditorConfig::default())
    }
}

#[derive(Debug)]
pub struct UndoManager {
    id: DocumentId,
    config: UndoConfig,
    checkpoints: Vec<Checkpoint>,
    patches: Vec<TextPatch>,
    base: usize,
    cursor: usize,
    /// Source at `cursor`
    current: String,
    /// Time of the last edit in the open group
    group_last: Option<Instant>,
    checkpoint_due: Option<Instant>,
    writer: Option<HistoryWriter>,
}

impl UndoManager {
    pub fn new(id: DocumentId, source: impl Into<String>, config: UndoConfig) -> Self {
        let source = source.into();
        Self {
            id,
            config,
            checkpoints: vec![Checkpoint {
                state: 0,
                source: source.clone(),
            }],
            patches: Vec::new(),
            base: 0,
            cursor: 0,
            current: source,
            group_last: None,
            checkpoint_due: None,
            writer: None,
        }
    }

    /// Resume from a persisted history.
    ///
    /// Falls back to a fresh history when the snapshot is inconsistent or
    /// does not reproduce `source`.
    pub fn restore(id: DocumentId, source: &str, persisted: PersistedHistory, config: UndoConfig) -> Self {
        let manager = Self::new(id, source, config);
        if !persisted.is_consistent() {
            warn!(document = %manager.id, "ignoring inconsistent stored history");
            return manager;
        }

        let mut restored = Self {
            checkpoints: persisted.checkpoints,
            patches: persisted.patches,
            base: persisted.base_state,
            cursor: persisted.cursor_position,
            ..Self::new(manager.id.clone(), String::new(), manager.config.clone())
        };
        match restored.reconstruct(restored.cursor) {
            Ok(text) if text == source => {
                restored.current = text;
                info!(document = %restored.id, levels = restored.undo_levels(), "history restored");
                restored
            }
            Ok(_) => {
                warn!(document = %manager.id, "stored history does not match the document");
                manager
            }
            Err(e) => {
                warn!(document = %manager.id, error = %e, "stored history is corrupt");
                manager
            }
        }
    }

    pub fn with_writer(mut self, writer: HistoryWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    fn head(&self) -> usize {
        self.base + self.patches.len()
    }

    /// Record the document's new source; returns false when unchanged
    pub fn record_change(&mut self, now: Instant, source: &str) -> bool {
        if source == self.current {
            return false;
        }

        if self.cursor < self.head() {
            debug!(dropped = self.head() - self.cursor, "discarding redo branch");
            self.patches.truncate(self.cursor - self.base);
            let cursor = self.cursor;
            self.checkpoints.retain(|c| c.state <= cursor);
            self.group_last = None;
        }

        let grouped = self
            .group_last
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.group_window)
            && self.cursor > self.base;

        let group_open = if grouped {
            self.merge_into_last(source)
        } else {
            self.patches.push(TextPatch::between(&self.current, source));
            self.cursor += 1;
            true
        };

        self.current = source.to_string();
        self.group_last = group_open.then_some(now);
        self.checkpoint_due = Some(now + self.config.checkpoint_delay);

        self.compact();
        self.enforce_budget();
        true
    }

    /// Fold `source` into the newest step; returns whether the group stays open
    fn merge_into_last(&mut self, source: &str) -> bool {
        let Some(last) = self.patches.pop() else {
            return false;
        };
        let previous = match last.revert(&self.current) {
            Ok(previous) => previous,
            Err(e) => {
                // cannot merge without the previous text; keep both steps
                warn!(error = %e, "undo group merge failed");
                self.patches.push(last);
                self.patches.push(TextPatch::between(&self.current, source));
                self.cursor += 1;
                return true;
            }
        };

        // the state being rewritten can no longer anchor a checkpoint
        let cursor = self.cursor;
        self.checkpoints.retain(|c| c.state != cursor);

        let merged = TextPatch::between(&previous, source);
        if merged.is_empty() {
            // the group typed its way back to where it started
            self.cursor -= 1;
            return false;
        }
        self.patches.push(merged);
        true
    }

    /// Fire due timers: close the edit group, take a debounced checkpoint
    pub fn poll(&mut self, now: Instant) -> bool {
        if self
            .group_last
            .is_some_and(|last| now.saturating_duration_since(last) >= self.config.group_window)
        {
            self.group_last = None;
        }

        let Some(due) = self.checkpoint_due.filter(|due| now >= *due) else {
            return false;
        };
        debug!(?due, "checkpoint timer fired");
        self.checkpoint_due = None;
        self.group_last = None;

        if !self.checkpoints.iter().any(|c| c.state == self.cursor) {
            self.checkpoints.push(Checkpoint {
                state: self.cursor,
                source: self.current.clone(),
            });
            self.checkpoints.sort_by_key(|c| c.state);
            self.enforce_budget();
        }
        self.persist();
        true
    }

    pub fn undo(&mut self) -> Result<Option<String>, HistoryError> {
        self.group_last = None;
        if self.cursor == self.base {
            return Ok(None);
        }
        self.move_to(self.cursor - 1).map(Some)
    }

    pub fn redo(&mut self) -> Result<Option<String>, HistoryError> {
        self.group_last = None;
        if self.cursor == self.head() {
            return Ok(None);
        }
        self.move_to(self.cursor + 1).map(Some)
    }

    fn move_to(&mut self, state: usize) -> Result<String, HistoryError> {
        let source = self.reconstruct(state)?;
        self.cursor = state;
        self.current = source.clone();
        self.persist();
        Ok(source)
    }

    /// Rebuild the source at `state` from the nearest checkpoint below it
    fn reconstruct(&self, state: usize) -> Result<String, HistoryError> {
        let checkpoint = self
            .checkpoints
            .iter()
            .rev()
            .find(|c| c.state <= state)
            .ok_or(HistoryError::MissingCheckpoint(state))?;

        let from = checkpoint.state - self.base;
        let to = state - self.base;
        self.patches[from..to]
            .iter()
            .try_fold(checkpoint.source.clone(), |text, patch| patch.apply(&text))
    }

    /// Collapse the oldest half of an over-long chain into a checkpoint
    fn compact(&mut self) {
        if self.patches.len() <= self.config.max_chain {
            return;
        }
        // never compact past the cursor, its state must stay reachable
        let collapse = (self.patches.len() / 2).min(self.cursor - self.base);
        if collapse == 0 {
            return;
        }

        let new_base = self.base + collapse;
        let snapshot = match self.reconstruct(new_base) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "history compaction skipped");
                return;
            }
        };

        self.patches.drain(..collapse);
        self.checkpoints.retain(|c| c.state > new_base);
        self.checkpoints.insert(
            0,
            Checkpoint {
                state: new_base,
                source: snapshot,
            },
        );
        self.base = new_base;
        info!(
            document = %self.id,
            collapsed = collapse,
            remaining = self.patches.len(),
            "history compacted"
        );
    }

    /// Evict the oldest checkpoints (and the patches they anchor) while over
    /// the byte budget
    fn enforce_budget(&mut self) {
        while self.stored_bytes() > self.config.byte_budget && self.checkpoints.len() > 1 {
            let next_base = self.checkpoints[1].state;
            if next_base > self.cursor {
                break;
            }
            self.patches.drain(..next_base - self.base);
            self.checkpoints.remove(0);
            self.base = next_base;
            debug!(document = %self.id, base = self.base, "evicted oldest checkpoint");
        }
    }

    pub fn stored_bytes(&self) -> usize {
        self.checkpoints.iter().map(|c| c.source.len()).sum::<usize>()
            + self.patches.iter().map(TextPatch::byte_len).sum::<usize>()
    }

    pub fn snapshot(&self) -> PersistedHistory {
        PersistedHistory {
            checkpoints: self.checkpoints.clone(),
            patches: self.patches.clone(),
            base_state: self.base,
            cursor_position: self.cursor,
        }
    }

    fn persist(&self) {
        if let Some(writer) = &self.writer {
            writer.submit(&self.id, self.snapshot());
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > self.base
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.head()
    }

    pub fn undo_levels(&self) -> usize {
        self.cursor - self.base
    }

    pub fn redo_levels(&self) -> usize {
        self.head() - self.cursor
    }

    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> UndoConfig {
        UndoConfig {
            group_window: Duration::from_millis(500),
            checkpoint_delay: Duration::from_millis(2000),
            max_chain: 64,
            byte_budget: usize::MAX,
        }
    }

    fn manager() -> UndoManager {
        UndoManager::new(DocumentId::new("doc"), "v0", config())
    }

    /// Record `edits` one second apart so none of them group
    fn record_spaced(history: &mut UndoManager, start: Instant, edits: &[&str]) {
        for (i, edit) in edits.iter().enumerate() {
            history.record_change(start + Duration::from_secs(i as u64 + 1), edit);
        }
    }

    #[test]
    fn test_undo_stack_creation() {
        let history = manager();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.current(), "v0");
        assert_eq!(history.checkpoint_count(), 1);
    }

    #[test]
    fn test_undo_and_redo_at_boundaries() {
        let mut history = manager();
        assert_eq!(history.undo().unwrap(), None);

        record_spaced(&mut history, Instant::now(), &["v1", "v2"]);
        assert_eq!(history.undo().unwrap().as_deref(), Some("v1"));
        assert_eq!(history.undo().unwrap().as_deref(), Some("v0"));
        assert_eq!(history.undo().unwrap(), None);
        assert_eq!(history.redo().unwrap().as_deref(), Some("v1"));
        assert_eq!(history.redo().unwrap().as_deref(), Some("v2"));
        assert_eq!(history.redo().unwrap(), None);
    }

    #[test]
    fn test_rapid_edits_group_into_one_step() {
        let mut history = manager();
        let start = Instant::now();
        for (i, text) in ["v0 a", "v0 ab", "v0 abc"].iter().enumerate() {
            history.record_change(start + Duration::from_millis(100 * i as u64), text);
        }
        assert_eq!(history.undo_levels(), 1);
        assert_eq!(history.undo().unwrap().as_deref(), Some("v0"));

        // a pause closes the group
        let mut history = manager();
        history.record_change(start, "v0 a");
        history.poll(start + Duration::from_millis(600));
        history.record_change(start + Duration::from_millis(700), "v0 ab");
        assert_eq!(history.undo_levels(), 2);
    }

    #[test]
    fn test_group_that_returns_to_start_is_dropped() {
        let mut history = manager();
        let start = Instant::now();
        history.record_change(start, "v0!");
        history.record_change(start + Duration::from_millis(100), "v0");
        assert!(!history.can_undo());
        assert_eq!(history.patch_count(), 0);
    }

    #[test]
    fn test_new_mutation_clears_redo() {
        let mut history = manager();
        record_spaced(&mut history, Instant::now(), &["v1", "v2"]);
        history.undo().unwrap();
        assert!(history.can_redo());

        history.record_change(Instant::now() + Duration::from_secs(10), "other");
        assert!(!history.can_redo());
        assert_eq!(history.undo().unwrap().as_deref(), Some("v1"));
    }

    #[test]
    fn test_checkpoint_after_quiet_period() {
        let mut history = manager();
        let start = Instant::now();
        history.record_change(start, "v1");
        assert!(!history.poll(start + Duration::from_millis(1000)));
        assert!(history.poll(start + Duration::from_millis(2000)));
        assert_eq!(history.checkpoint_count(), 2);
        // nothing left to fire
        assert!(!history.poll(start + Duration::from_millis(5000)));
    }

    #[test]
    fn test_compaction_keeps_sources_reproducible() {
        let mut history = UndoManager::new(
            DocumentId::new("doc"),
            "0",
            UndoConfig {
                max_chain: 8,
                ..config()
            },
        );
        let edits: Vec<String> = (1..=9).map(|i| i.to_string()).collect();
        let refs: Vec<&str> = edits.iter().map(String::as_str).collect();
        record_spaced(&mut history, Instant::now(), &refs);

        assert_eq!(history.patch_count(), 5);
        assert_eq!(history.undo_levels(), 5);
        assert_eq!(history.current(), "9");
        assert_eq!(history.reconstruct(history.cursor).unwrap(), "9");
        assert_eq!(history.undo().unwrap().as_deref(), Some("8"));
    }

    #[test]
    fn test_byte_budget_evicts_oldest_checkpoint() {
        let mut history = UndoManager::new(
            DocumentId::new("doc"),
            "x".repeat(100),
            UndoConfig {
                byte_budget: 250,
                ..config()
            },
        );
        let start = Instant::now();
        history.record_change(start, &"y".repeat(100));
        assert_eq!(history.stored_bytes(), 300);

        // the checkpoint makes the original snapshot evictable
        history.poll(start + Duration::from_secs(3));
        assert_eq!(history.checkpoint_count(), 1);
        assert_eq!(history.stored_bytes(), 100);
        assert!(!history.can_undo());

        history.record_change(start + Duration::from_secs(4), &"z".repeat(100));
        assert_eq!(history.undo().unwrap(), Some("y".repeat(100)));
        assert_eq!(history.undo().unwrap(), None);
    }

    #[test]
    fn test_restore_from_snapshot() {
        let mut history = manager();
        record_spaced(&mut history, Instant::now(), &["v1", "v2"]);
        history.undo().unwrap();
        let snapshot = history.snapshot();

        let mut restored = UndoManager::restore(DocumentId::new("doc"), "v1", snapshot.clone(), config());
        assert_eq!(restored.undo_levels(), 1);
        assert_eq!(restored.redo().unwrap().as_deref(), Some("v2"));

        // a document edited elsewhere starts over
        let fresh = UndoManager::restore(DocumentId::new("doc"), "elsewhere", snapshot, config());
        assert!(!fresh.can_undo());
        assert_eq!(fresh.current(), "elsewhere");
    }
}
