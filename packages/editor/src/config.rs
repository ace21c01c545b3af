//! # Editor Configuration
//!
//! Loaded from `quire.config.json` in camelCase JSON; every field has a
//! default so a partial or missing file is fine.

use quire_common::BlockSyntax;
use quire_vdom::StripRules;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::EditorError;

pub const DEFAULT_CONFIG_NAME: &str = "quire.config.json";

/// Editor configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Quiet window before a preview edit is reverse-compiled
    #[serde(default = "default_reverse_sync_debounce_ms")]
    pub reverse_sync_debounce_ms: u64,

    /// Delay before a failed preview edit is reverted
    #[serde(default = "default_revert_delay_ms")]
    pub revert_delay_ms: u64,

    /// Edits closer together than this share one undo step
    #[serde(default = "default_undo_group_window_ms")]
    pub undo_group_window_ms: u64,

    /// Quiet period after which a checkpoint is taken
    #[serde(default = "default_checkpoint_delay_ms")]
    pub checkpoint_delay_ms: u64,

    #[serde(default = "default_max_patch_chain")]
    pub max_patch_chain: usize,

    #[serde(default = "default_history_byte_budget")]
    pub history_byte_budget: usize,

    /// Documents a history store keeps before evicting the least recently written
    #[serde(default = "default_max_stored_documents")]
    pub max_stored_documents: usize,

    #[serde(default = "default_scroll_suppression_failsafe_ms")]
    pub scroll_suppression_failsafe_ms: u64,

    /// Attributes stripped before reverse compiling
    #[serde(default = "default_injected_attributes")]
    pub injected_attributes: Vec<String>,

    #[serde(default, flatten)]
    pub syntax: BlockSyntax,
}

fn default_reverse_sync_debounce_ms() -> u64 {
    300
}

fn default_revert_delay_ms() -> u64 {
    300
}

fn default_undo_group_window_ms() -> u64 {
    500
}

fn default_checkpoint_delay_ms() -> u64 {
    2000
}

fn default_max_patch_chain() -> usize {
    64
}

fn default_history_byte_budget() -> usize {
    4 * 1024 * 1024
}

fn default_max_stored_documents() -> usize {
    50
}

fn default_scroll_suppression_failsafe_ms() -> u64 {
    500
}

fn default_injected_attributes() -> Vec<String> {
    StripRules::default().injected
}

impl EditorConfig {
    /// Load config from a directory, falling back to defaults when absent
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, EditorError> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: EditorConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(EditorConfig::default())
        }
    }

    /// Serialized size allowed per stored history; JSON escaping can
    /// outgrow the in-memory budget
    pub fn history_store_ceiling(&self) -> usize {
        self.history_byte_budget.saturating_mul(2)
    }

    pub fn strip_rules(&self) -> StripRules {
        StripRules::new(self.injected_attributes.clone())
    }

    pub fn reverse_sync_debounce(&self) -> Duration {
        Duration::from_millis(self.reverse_sync_debounce_ms)
    }

    pub fn revert_delay(&self) -> Duration {
        Duration::from_millis(self.revert_delay_ms)
    }

    pub fn undo_group_window(&self) -> Duration {
        Duration::from_millis(self.undo_group_window_ms)
    }

    pub fn checkpoint_delay(&self) -> Duration {
        Duration::from_millis(self.checkpoint_delay_ms)
    }

    pub fn scroll_suppression_failsafe(&self) -> Duration {
        Duration::from_millis(self.scroll_suppression_failsafe_ms)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            reverse_sync_debounce_ms: default_reverse_sync_debounce_ms(),
            revert_delay_ms: default_revert_delay_ms(),
            undo_group_window_ms: default_undo_group_window_ms(),
            checkpoint_delay_ms: default_checkpoint_delay_ms(),
            max_patch_chain: default_max_patch_chain(),
            history_byte_budget: default_history_byte_budget(),
            max_stored_documents: default_max_stored_documents(),
            scroll_suppression_failsafe_ms: default_scroll_suppression_failsafe_ms(),
            injected_attributes: default_injected_attributes(),
            syntax: BlockSyntax::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r##"{
            "reverseSyncDebounceMs": 150,
            "maxPatchChain": 8,
            "structuralTypes": ["meta"],
            "marker": "#"
        }"##;

        let config: EditorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.reverse_sync_debounce(), Duration::from_millis(150));
        assert_eq!(config.max_patch_chain, 8);
        assert_eq!(config.syntax.structural_types, vec!["meta"]);
        assert_eq!(config.syntax.marker, '#');
        assert_eq!(config.syntax.close_keyword, "end");
        assert_eq!(config.revert_delay_ms, 300);
    }

    #[test]
    fn test_store_limits() {
        let config: EditorConfig =
            serde_json::from_str(r#"{ "maxStoredDocuments": 3, "historyByteBudget": 100 }"#).unwrap();
        assert_eq!(config.max_stored_documents, 3);
        assert_eq!(config.history_store_ceiling(), 200);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EditorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert!(config.strip_rules().is_injected("data-editor-caret"));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(EditorConfig::load(dir.path()).unwrap(), EditorConfig::default());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_NAME),
            r#"{ "historyByteBudget": 1024 }"#,
        )
        .unwrap();
        assert_eq!(EditorConfig::load(dir.path()).unwrap().history_byte_budget, 1024);

        std::fs::write(dir.path().join(DEFAULT_CONFIG_NAME), "not json").unwrap();
        assert!(matches!(
            EditorConfig::load(dir.path()),
            Err(EditorError::Config(_))
        ));
    }
}
