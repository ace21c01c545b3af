//! Undo history: round trips, compaction and background persistence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use quire_editor::{
    DocumentId, EditorConfig, EditorSession, FileHistoryStore, HistoryError, HistoryStore, HistoryWriter,
    MemoryHistoryStore, PersistedHistory, UndoConfig, UndoManager,
};
use quire_vdom::testing::BlockCompiler;

fn spaced(start: Instant, i: usize) -> Instant {
    start + Duration::from_secs(i as u64 + 1)
}

fn edits(n: usize) -> Vec<String> {
    (1..=n)
        .map(|i| format!("%card\nrevision {i}\n{}\n", "x".repeat(i % 7)))
        .collect()
}

#[test]
fn test_undo_then_redo_round_trip() {
    let mut history = UndoManager::new(DocumentId::new("doc"), "%card\nstart\n", UndoConfig::default());
    let start = Instant::now();
    let edits = edits(12);
    for (i, edit) in edits.iter().enumerate() {
        assert!(history.record_change(spaced(start, i), edit));
    }

    for _ in 0..edits.len() {
        assert!(history.undo().unwrap().is_some());
    }
    assert_eq!(history.current(), "%card\nstart\n");
    assert_eq!(history.undo().unwrap(), None);

    for _ in 0..edits.len() {
        assert!(history.redo().unwrap().is_some());
    }
    assert_eq!(history.current(), edits[edits.len() - 1]);
    assert_eq!(history.redo().unwrap(), None);
}

#[test]
fn test_compaction_at_capacity() {
    let config = UndoConfig {
        max_chain: 10,
        ..UndoConfig::default()
    };
    let mut history = UndoManager::new(DocumentId::new("doc"), "%card\nstart\n", config.clone());
    let start = Instant::now();
    let edits = edits(11);

    for (i, edit) in edits.iter().take(10).enumerate() {
        history.record_change(spaced(start, i), edit);
    }
    assert_eq!(history.patch_count(), 10);
    let before = history.snapshot();

    history.record_change(spaced(start, 10), &edits[10]);
    assert!(history.patch_count() < before.patches.len());
    assert_eq!(history.patch_count(), 6);

    // a fresh manager replaying from the newest checkpoint lands on the same text
    let snapshot = history.snapshot();
    let mut replayed = UndoManager::restore(DocumentId::new("doc"), &edits[10], snapshot, config);
    assert_eq!(replayed.undo_levels(), 6);
    assert_eq!(replayed.undo().unwrap().as_deref(), Some(edits[9].as_str()));
    while replayed.undo().unwrap().is_some() {}
    assert_eq!(replayed.current(), edits[4]);
}

#[test]
fn test_grouped_typing_is_one_step() {
    let mut history = UndoManager::new(DocumentId::new("doc"), "", UndoConfig::default());
    let start = Instant::now();
    let mut text = String::new();
    for (i, ch) in "hello".chars().enumerate() {
        text.push(ch);
        history.record_change(start + Duration::from_millis(i as u64 * 80), &text);
    }
    history.poll(start + Duration::from_secs(5));

    assert_eq!(history.undo_levels(), 1);
    assert_eq!(history.checkpoint_count(), 2);
    assert_eq!(history.undo().unwrap().as_deref(), Some(""));
}

#[tokio::test]
async fn test_session_history_survives_reopen() -> anyhow::Result<()> {
    let store = Arc::new(MemoryHistoryStore::from_config(&EditorConfig::default()));
    let id = DocumentId::new("deck");
    let source = "%card\none\n".to_string();
    let edited = "%card\none two\n".to_string();

    let (writer, handle) = HistoryWriter::spawn(store.clone());
    {
        let mut session = EditorSession::open_with_history(
            id.clone(),
            source.as_str(),
            BlockCompiler::default(),
            EditorConfig::default(),
            store.as_ref(),
            writer,
        )?;
        let t0 = Instant::now();
        session.edit_source(t0, &edited)?;
        // checkpoint delay elapses; the snapshot is queued, not written inline
        session.tick(t0 + Duration::from_secs(3));
    }
    handle.await?;

    let stored = store.load(&id)?.ok_or_else(|| anyhow::anyhow!("nothing persisted"))?;
    assert_eq!(stored.cursor_position, 1);

    let (writer, handle) = HistoryWriter::spawn(store.clone());
    let mut reopened = EditorSession::open_with_history(
        id,
        edited.as_str(),
        BlockCompiler::default(),
        EditorConfig::default(),
        store.as_ref(),
        writer,
    )?;
    assert!(reopened.undo()?);
    assert_eq!(reopened.source(), source);
    drop(reopened);
    handle.await?;
    Ok(())
}

#[tokio::test]
async fn test_file_store_persistence() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(FileHistoryStore::new(dir.path(), 4, 1 << 20)?);
    let id = DocumentId::new("notes/today");

    let (writer, handle) = HistoryWriter::spawn(store.clone());
    let mut history = UndoManager::new(id.clone(), "a", UndoConfig::default()).with_writer(writer);
    let t0 = Instant::now();
    history.record_change(t0, "ab");
    history.poll(t0 + Duration::from_secs(3));
    drop(history);
    handle.await?;

    let stored = store.load(&id)?.ok_or_else(|| anyhow::anyhow!("nothing persisted"))?;
    let mut restored = UndoManager::restore(id, "ab", stored, UndoConfig::default());
    assert_eq!(restored.undo()?.as_deref(), Some("a"));
    Ok(())
}

#[derive(Debug)]
struct UnwritableStore;

impl HistoryStore for UnwritableStore {
    fn load(&self, _id: &DocumentId) -> Result<Option<PersistedHistory>, HistoryError> {
        Err(HistoryError::Io(std::io::Error::other("unreadable")))
    }

    fn save(&self, _id: &DocumentId, _history: &PersistedHistory) -> Result<(), HistoryError> {
        Err(HistoryError::Io(std::io::Error::other("read-only")))
    }

    fn remove(&self, _id: &DocumentId) -> Result<(), HistoryError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_persistence_failures_do_not_interrupt_editing() -> anyhow::Result<()> {
    let store = Arc::new(UnwritableStore);
    let (writer, handle) = HistoryWriter::spawn(store.clone());

    let mut session = EditorSession::open_with_history(
        DocumentId::new("deck"),
        "%card\none\n",
        BlockCompiler::default(),
        EditorConfig::default(),
        store.as_ref(),
        writer,
    )?;
    let t0 = Instant::now();
    session.edit_source(t0, "%card\nchanged\n")?;
    session.tick(t0 + Duration::from_secs(3));
    assert!(session.undo()?);
    assert_eq!(session.source(), "%card\none\n");

    drop(session);
    handle.await?;
    Ok(())
}
