//! Reversible single-splice text patches.
//!
//! A patch replaces `removed` with `inserted` at a byte offset. Both sides
//! are kept so a patch can be applied in either direction and verified
//! against the text it is applied to.

use serde::{Deserialize, Serialize};

use crate::persistence::HistoryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPatch {
    pub offset: usize,
    pub removed: String,
    pub inserted: String,
}

impl TextPatch {
    /// Smallest single splice turning `old` into `new`
    pub fn between(old: &str, new: &str) -> Self {
        let prefix: usize = old
            .chars()
            .zip(new.chars())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();
        let old_rest = &old[prefix..];
        let new_rest = &new[prefix..];

        let suffix: usize = old_rest
            .chars()
            .rev()
            .zip(new_rest.chars().rev())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| a.len_utf8())
            .sum();

        Self {
            offset: prefix,
            removed: old_rest[..old_rest.len() - suffix].to_string(),
            inserted: new_rest[..new_rest.len() - suffix].to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.inserted.is_empty()
    }

    /// Bytes this patch costs in storage
    pub fn byte_len(&self) -> usize {
        self.removed.len() + self.inserted.len()
    }

    pub fn apply(&self, text: &str) -> Result<String, HistoryError> {
        splice(text, self.offset, &self.removed, &self.inserted)
    }

    pub fn revert(&self, text: &str) -> Result<String, HistoryError> {
        splice(text, self.offset, &self.inserted, &self.removed)
    }
}

fn splice(text: &str, offset: usize, expected: &str, replacement: &str) -> Result<String, HistoryError> {
    let end = offset + expected.len();
    if text.get(offset..end) != Some(expected) {
        return Err(HistoryError::PatchMismatch { offset });
    }

    let mut out = String::with_capacity(text.len() - expected.len() + replacement.len());
    out.push_str(&text[..offset]);
    out.push_str(replacement);
    out.push_str(&text[end..]);
    Ok(out)
}
