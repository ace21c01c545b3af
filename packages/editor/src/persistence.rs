//! # Undo History Persistence
//!
//! Stores are synchronous and keyed by document id. The edit path never
//! touches them directly: [`HistoryWriter`] hands snapshots to a tokio task
//! which performs the write on the blocking pool and only logs failures.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EditorConfig;
use crate::store::DocumentId;
use crate::text_patch::TextPatch;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Patch does not apply at offset {offset}")]
    PatchMismatch { offset: usize },

    #[error("No checkpoint at or below state {0}")]
    MissingCheckpoint(usize),

    #[error("History of {size} bytes exceeds the {limit} byte ceiling")]
    TooLarge { size: usize, limit: usize },

    #[error("History store lock poisoned")]
    Poisoned,
}

/// Full source snapshot at an absolute history position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: usize,
    pub source: String,
}

/// What gets written per document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedHistory {
    pub checkpoints: Vec<Checkpoint>,
    /// `patches[i]` leads from state `base_state + i` to the next one
    pub patches: Vec<TextPatch>,
    pub base_state: usize,
    pub cursor_position: usize,
}

impl PersistedHistory {
    pub fn head(&self) -> usize {
        self.base_state + self.patches.len()
    }

    /// Cheap structural check before trusting a loaded history
    pub fn is_consistent(&self) -> bool {
        let head = self.head();
        self.checkpoints.first().is_some_and(|c| c.state == self.base_state)
            && self.checkpoints.windows(2).all(|w| w[0].state < w[1].state)
            && self.checkpoints.iter().all(|c| c.state <= head)
            && (self.base_state..=head).contains(&self.cursor_position)
    }
}

pub trait HistoryStore: Send + Sync + Debug {
    fn load(&self, id: &DocumentId) -> Result<Option<PersistedHistory>, HistoryError>;

    fn save(&self, id: &DocumentId, history: &PersistedHistory) -> Result<(), HistoryError>;

    fn remove(&self, id: &DocumentId) -> Result<(), HistoryError>;
}

/// In-process store, mostly for tests and hosts without a disk
#[derive(Debug)]
pub struct MemoryHistoryStore {
    entries: Mutex<HashMap<DocumentId, (u64, PersistedHistory)>>,
    max_entries: usize,
    byte_ceiling: usize,
    writes: AtomicU64,
}

impl MemoryHistoryStore {
    pub fn new(max_entries: usize, byte_ceiling: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            byte_ceiling,
            writes: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::new(config.max_stored_documents, config.history_store_ceiling())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn load(&self, id: &DocumentId) -> Result<Option<PersistedHistory>, HistoryError> {
        let entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        Ok(entries.get(id).map(|(_, history)| history.clone()))
    }

    fn save(&self, id: &DocumentId, history: &PersistedHistory) -> Result<(), HistoryError> {
        let size = serde_json::to_vec(history)?.len();
        if size > self.byte_ceiling {
            return Err(HistoryError::TooLarge {
                size,
                limit: self.byte_ceiling,
            });
        }

        let seq = self.writes.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        entries.insert(id.clone(), (seq, history.clone()));

        while entries.len() > self.max_entries.max(1) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (seq, _))| *seq)
                .map(|(id, _)| id.clone());
            match oldest {
                Some(oldest) => {
                    debug!(document = %oldest, "evicting stored history");
                    entries.remove(&oldest);
                }
                None => break,
            }
        }
        Ok(())
    }

    fn remove(&self, id: &DocumentId) -> Result<(), HistoryError> {
        let mut entries = self.entries.lock().map_err(|_| HistoryError::Poisoned)?;
        entries.remove(id);
        Ok(())
    }
}

/// One JSON file per document under a directory
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    dir: PathBuf,
    max_entries: usize,
    byte_ceiling: usize,
}

impl FileHistoryStore {
    pub fn new(dir: impl Into<PathBuf>, max_entries: usize, byte_ceiling: usize) -> Result<Self, HistoryError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_entries,
            byte_ceiling,
        })
    }

    pub fn from_config(dir: impl Into<PathBuf>, config: &EditorConfig) -> Result<Self, HistoryError> {
        Self::new(dir, config.max_stored_documents, config.history_store_ceiling())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &DocumentId) -> PathBuf {
        let name: String = id
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        // ids that sanitize alike still get distinct files
        let digest = Sha256::digest(id.as_str().as_bytes());
        let tag = hex::encode(&digest[..4]);
        self.dir.join(format!("{name}-{tag}.json"))
    }

    fn stored_files(&self) -> Result<Vec<(std::time::SystemTime, PathBuf)>, HistoryError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let modified = std::fs::metadata(&path)?.modified()?;
                files.push((modified, path));
            }
        }
        files.sort();
        Ok(files)
    }

    fn evict_oldest(&self, keep: &Path) -> Result<(), HistoryError> {
        let files = self.stored_files()?;
        let excess = files.len().saturating_sub(self.max_entries.max(1));
        for (_, path) in files.into_iter().filter(|(_, p)| p != keep).take(excess) {
            debug!(path = %path.display(), "evicting stored history");
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self, id: &DocumentId) -> Result<Option<PersistedHistory>, HistoryError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&content)?))
    }

    fn save(&self, id: &DocumentId, history: &PersistedHistory) -> Result<(), HistoryError> {
        let content = serde_json::to_vec(history)?;
        if content.len() > self.byte_ceiling {
            return Err(HistoryError::TooLarge {
                size: content.len(),
                limit: self.byte_ceiling,
            });
        }

        let path = self.path_for(id);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;

        self.evict_oldest(&path)
    }

    fn remove(&self, id: &DocumentId) -> Result<(), HistoryError> {
        let path = self.path_for(id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PersistJob {
    id: DocumentId,
    history: PersistedHistory,
}

/// Non-blocking handle for background history writes
#[derive(Debug, Clone)]
pub struct HistoryWriter {
    tx: mpsc::UnboundedSender<PersistJob>,
}

impl HistoryWriter {
    /// Start the writer task on the current tokio runtime.
    ///
    /// The task ends once every `HistoryWriter` clone is dropped and the
    /// queue has drained.
    pub fn spawn(store: Arc<dyn HistoryStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PersistJob>();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                // only the newest snapshot per document is worth writing
                let mut latest = HashMap::new();
                latest.insert(job.id, job.history);
                while let Ok(job) = rx.try_recv() {
                    latest.insert(job.id, job.history);
                }

                for (id, history) in latest {
                    let store = Arc::clone(&store);
                    let target = id.clone();
                    let result = tokio::task::spawn_blocking(move || store.save(&target, &history)).await;
                    match result {
                        Ok(Ok(())) => debug!(document = %id, "history persisted"),
                        Ok(Err(e)) => warn!(document = %id, error = %e, "failed to persist history"),
                        Err(e) => warn!(document = %id, error = %e, "history write task failed"),
                    }
                }
            }
        });

        (Self { tx }, handle)
    }

    /// Queue a snapshot; never blocks
    pub fn submit(&self, id: &DocumentId, history: PersistedHistory) {
        let job = PersistJob {
            id: id.clone(),
            history,
        };
        if self.tx.send(job).is_err() {
            warn!(document = %id, "history writer stopped, snapshot dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(source: &str) -> PersistedHistory {
        PersistedHistory {
            checkpoints: vec![Checkpoint {
                state: 0,
                source: source.to_string(),
            }],
            patches: vec![TextPatch::between(source, "changed")],
            base_state: 0,
            cursor_position: 1,
        }
    }

    #[test]
    fn test_persisted_shape() {
        let json = serde_json::to_value(history("a")).unwrap();
        assert!(json.get("checkpoints").is_some());
        assert!(json.get("patches").is_some());
        assert_eq!(json["cursorPosition"], 1);
    }

    #[test]
    fn test_consistency_check() {
        assert!(history("a").is_consistent());
        let mut broken = history("a");
        broken.cursor_position = 5;
        assert!(!broken.is_consistent());
        assert!(!PersistedHistory::default().is_consistent());
    }

    #[test]
    fn test_memory_store_evicts_least_recently_written() {
        let store = MemoryHistoryStore::new(2, usize::MAX);
        for id in ["a", "b", "a", "c"] {
            store.save(&DocumentId::new(id), &history(id)).unwrap();
        }
        assert_eq!(store.len(), 2);
        assert!(store.load(&DocumentId::new("b")).unwrap().is_none());
        assert!(store.load(&DocumentId::new("a")).unwrap().is_some());
    }

    #[test]
    fn test_memory_store_byte_ceiling() {
        let store = MemoryHistoryStore::new(10, 16);
        let err = store.save(&DocumentId::new("a"), &history("a")).unwrap_err();
        assert!(matches!(err, HistoryError::TooLarge { limit: 16, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("history"), 10, usize::MAX).unwrap();
        let id = DocumentId::new("slides/intro.qd");

        assert!(store.load(&id).unwrap().is_none());
        store.save(&id, &history("x")).unwrap();
        assert_eq!(store.load(&id).unwrap(), Some(history("x")));
        let file = store.path_for(&id);
        assert!(file.exists());
        assert!(file
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("slides_intro_qd-")));

        store.remove(&id).unwrap();
        assert!(store.load(&id).unwrap().is_none());
    }

    #[test]
    fn test_file_store_keeps_similar_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path(), 10, usize::MAX).unwrap();
        let nested = DocumentId::new("notes/today");
        let flat = DocumentId::new("notes_today");

        store.save(&nested, &history("nested")).unwrap();
        store.save(&flat, &history("flat")).unwrap();

        assert_ne!(store.path_for(&nested), store.path_for(&flat));
        assert_eq!(store.load(&nested).unwrap(), Some(history("nested")));
        assert_eq!(store.load(&flat).unwrap(), Some(history("flat")));
    }

    #[test]
    fn test_stores_take_limits_from_config() {
        let config = EditorConfig {
            max_stored_documents: 1,
            ..EditorConfig::default()
        };
        let store = MemoryHistoryStore::from_config(&config);
        store.save(&DocumentId::new("a"), &history("a")).unwrap();
        store.save(&DocumentId::new("b"), &history("b")).unwrap();
        assert_eq!(store.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let files = FileHistoryStore::from_config(dir.path(), &config).unwrap();
        files.save(&DocumentId::new("a"), &history("a")).unwrap();
        files.save(&DocumentId::new("b"), &history("b")).unwrap();
        assert_eq!(files.stored_files().unwrap().len(), 1);
    }

    #[test]
    fn test_file_store_entry_ceiling() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path(), 2, usize::MAX).unwrap();
        for id in ["a", "b", "c"] {
            store.save(&DocumentId::new(id), &history(id)).unwrap();
            // keep modification times apart on coarse filesystems
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert_eq!(store.stored_files().unwrap().len(), 2);
        assert!(store.load(&DocumentId::new("a")).unwrap().is_none());
        assert!(store.load(&DocumentId::new("c")).unwrap().is_some());
    }

    #[derive(Debug)]
    struct FailingStore;

    impl HistoryStore for FailingStore {
        fn load(&self, _id: &DocumentId) -> Result<Option<PersistedHistory>, HistoryError> {
            Ok(None)
        }

        fn save(&self, _id: &DocumentId, _history: &PersistedHistory) -> Result<(), HistoryError> {
            Err(HistoryError::Io(std::io::Error::other("disk full")))
        }

        fn remove(&self, _id: &DocumentId) -> Result<(), HistoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_writer_persists_latest_snapshot() {
        let store = Arc::new(MemoryHistoryStore::new(10, usize::MAX));
        let (writer, handle) = HistoryWriter::spawn(store.clone());
        let id = DocumentId::new("doc");

        writer.submit(&id, history("first"));
        writer.submit(&id, history("second"));
        drop(writer);
        handle.await.unwrap();

        let stored = store.load(&id).unwrap().unwrap();
        assert_eq!(stored.checkpoints[0].source, "second");
    }

    #[tokio::test]
    async fn test_writer_swallows_store_failures() {
        let (writer, handle) = HistoryWriter::spawn(Arc::new(FailingStore));
        writer.submit(&DocumentId::new("doc"), history("x"));
        drop(writer);
        // completes without panicking
        handle.await.unwrap();
    }
}
