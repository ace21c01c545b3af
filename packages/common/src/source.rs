//! Line bookkeeping for source text.
//!
//! Line numbers are 1-based throughout quire; byte offsets are 0-based.

use crate::error::CommonError;
use crate::result::CommonResult;

/// Precomputed line starts for a source snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = Vec::new();
        if !source.is_empty() {
            starts.push(0);
        }
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' && i + 1 < source.len() {
                starts.push(i + 1);
            }
        }

        Self {
            starts,
            len: source.len(),
        }
    }

    /// Line containing `offset`; offsets past the end clamp to the last line
    pub fn line_of_offset(&self, offset: usize) -> Option<usize> {
        if self.starts.is_empty() {
            return None;
        }
        let offset = offset.min(self.len);
        let idx = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Some(idx + 1)
    }

    /// Convert a byte offset into a (line, column) pair, column counted in chars
    pub fn line_col(&self, source: &str, offset: usize) -> CommonResult<(usize, usize)> {
        if offset > source.len() || !source.is_char_boundary(offset) {
            return Err(CommonError::NotCharBoundary { offset });
        }
        let Some(line) = self.line_of_offset(offset) else {
            return Ok((1, 0));
        };
        let start = self.starts[line - 1];
        Ok((line, source[start..offset].chars().count()))
    }
}
