//! # Block Delimiters
//!
//! Blocks are introduced by delimiter lines. The marker count encodes the
//! nesting depth (`%` is depth 0, `%%` depth 1, ...).
//!
//! ```text
//! %slide Intro          opens `slide` at depth 0 with label "Intro"
//! %%ui.card Welcome     opens `ui.card` at depth 1
//! %%end                 closes the innermost depth-1 block
//! %%                    separator: closes depth >= 1 without opening
//! ```
//!
//! An opening delimiter also closes every open block at the same or a
//! deeper depth. Structural types (imports, metadata, styles) are scanned
//! like any other block but have no visual counterpart.

use serde::{Deserialize, Serialize};

use crate::error::CommonError;
use crate::result::CommonResult;

/// Delimiter grammar shared by the scanner, the locator and the compilers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSyntax {
    #[serde(default = "default_marker")]
    pub marker: char,

    #[serde(default = "default_close_keyword")]
    pub close_keyword: String,

    #[serde(default = "default_structural_types")]
    pub structural_types: Vec<String>,
}

fn default_marker() -> char {
    '%'
}

fn default_close_keyword() -> String {
    "end".to_string()
}

fn default_structural_types() -> Vec<String> {
    vec!["import".to_string(), "meta".to_string(), "style".to_string()]
}

impl Default for BlockSyntax {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            close_keyword: default_close_keyword(),
            structural_types: default_structural_types(),
        }
    }
}

/// A classified delimiter line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter<'a> {
    Open {
        depth: usize,
        block_type: &'a str,
        label: Option<&'a str>,
    },
    Close {
        depth: usize,
    },
    /// Markers only; closes blocks at `depth` or deeper
    Separator {
        depth: usize,
    },
}

impl Delimiter<'_> {
    pub fn depth(&self) -> usize {
        match self {
            Delimiter::Open { depth, .. }
            | Delimiter::Close { depth }
            | Delimiter::Separator { depth } => *depth,
        }
    }
}

impl BlockSyntax {
    /// Classify a single line. Content lines return `None`.
    pub fn parse_line<'a>(&self, line: &'a str) -> Option<Delimiter<'a>> {
        let markers = line.chars().take_while(|c| *c == self.marker).count();
        if markers == 0 {
            return None;
        }
        let depth = markers - 1;
        let rest = &line[markers * self.marker.len_utf8()..];

        if rest.trim().is_empty() {
            return Some(Delimiter::Separator { depth });
        }
        // `% note` is content, not a delimiter
        if rest.starts_with(char::is_whitespace) {
            return None;
        }

        let rest = rest.trim_end();
        let (token, label) = match rest.find(char::is_whitespace) {
            Some(at) => (&rest[..at], Some(rest[at..].trim_start())),
            None => (rest, None),
        };

        if !is_block_type(token) {
            return None;
        }
        if token == self.close_keyword && label.is_none() {
            return Some(Delimiter::Close { depth });
        }

        Some(Delimiter::Open {
            depth,
            block_type: token,
            label: label.filter(|l| !l.is_empty()),
        })
    }

    pub fn is_structural(&self, block_type: &str) -> bool {
        self.structural_types.iter().any(|t| t == block_type)
    }

    /// Render an opening delimiter line
    pub fn open_line(&self, depth: usize, block_type: &str, label: Option<&str>) -> CommonResult<String> {
        if !is_block_type(block_type) {
            return Err(CommonError::InvalidBlockType(block_type.to_string()));
        }
        let mut line: String = std::iter::repeat(self.marker).take(depth + 1).collect();
        line.push_str(block_type);
        if let Some(label) = label.filter(|l| !l.trim().is_empty()) {
            line.push(' ');
            line.push_str(label.trim());
        }
        Ok(line)
    }

    /// Render an explicit close line
    pub fn close_line(&self, depth: usize) -> String {
        let mut line: String = std::iter::repeat(self.marker).take(depth + 1).collect();
        line.push_str(&self.close_keyword);
        line
    }
}

/// Namespaced identifier: segments joined by `.`, `:` or `/`
pub fn is_block_type(token: &str) -> bool {
    !token.is_empty()
        && token.split(['.', ':', '/']).all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

/// A scanned block range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Line of the opening delimiter
    pub start_line: usize,
    /// Last line belonging to the block (the close line when explicit)
    pub end_line: usize,
    pub depth: usize,
    pub block_type: String,
    pub label: Option<String>,
    pub structural: bool,
    /// Index of the enclosing block in the scan result
    pub parent: Option<usize>,
}

impl Block {
    pub fn contains_line(&self, line: usize) -> bool {
        (self.start_line..=self.end_line).contains(&line)
    }
}

/// Line-at-a-time block scanner.
///
/// Feeding a prefix of the source gives the blocks open at its last line,
/// with the same rules [`scan_blocks`] applies to the whole text.
#[derive(Debug)]
pub struct BlockScanner<'s> {
    syntax: &'s BlockSyntax,
    blocks: Vec<Block>,
    open: Vec<usize>,
    line: usize,
}

impl<'s> BlockScanner<'s> {
    pub fn new(syntax: &'s BlockSyntax) -> Self {
        Self {
            syntax,
            blocks: Vec::new(),
            open: Vec::new(),
            line: 0,
        }
    }

    pub fn push_line(&mut self, text: &str) {
        self.line += 1;
        let line = self.line;

        let Some(delimiter) = self.syntax.parse_line(text) else {
            return;
        };
        match delimiter {
            Delimiter::Open {
                depth,
                block_type,
                label,
            } => {
                self.close_open_blocks(depth, line - 1);
                self.blocks.push(Block {
                    start_line: line,
                    end_line: line,
                    depth,
                    block_type: block_type.to_string(),
                    label: label.map(str::to_string),
                    structural: self.syntax.is_structural(block_type),
                    parent: self.open.last().copied(),
                });
                self.open.push(self.blocks.len() - 1);
            }
            Delimiter::Close { depth } => {
                if !self.open.iter().any(|&idx| self.blocks[idx].depth == depth) {
                    // stray close, nothing to end
                    return;
                }
                self.close_open_blocks(depth + 1, line - 1);
                if let Some(idx) = self.open.pop() {
                    self.blocks[idx].end_line = line;
                }
            }
            Delimiter::Separator { depth } => {
                self.close_open_blocks(depth, line - 1);
            }
        }
    }

    /// Blocks still open after the last line fed, outermost first
    pub fn open_blocks(&self) -> impl Iterator<Item = &Block> {
        self.open.iter().map(|&idx| &self.blocks[idx])
    }

    pub fn finish(mut self) -> Vec<Block> {
        for &idx in &self.open {
            self.blocks[idx].end_line = self.line;
        }
        self.blocks
    }

    fn close_open_blocks(&mut self, depth: usize, end_line: usize) {
        while let Some(&idx) = self.open.last() {
            let block = &mut self.blocks[idx];
            if block.depth < depth {
                break;
            }
            block.end_line = end_line.max(block.start_line);
            self.open.pop();
        }
    }
}

/// Scan every block in `source`, ordered by start line
pub fn scan_blocks(source: &str, syntax: &BlockSyntax) -> Vec<Block> {
    let mut scanner = BlockScanner::new(syntax);
    for text in source.lines() {
        scanner.push_line(text);
    }
    scanner.finish()
}
