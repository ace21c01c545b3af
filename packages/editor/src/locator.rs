//! # Block Locator
//!
//! Maps a source line to the content block that encloses it.
//!
//! The lines up to the cursor are fed through the same [`BlockScanner`]
//! that builds block ranges, so the locator and [`scan_blocks`] always
//! agree on what is open (stray closes included). A close line has already
//! ended its block when the cursor sits on it, so it resolves to the
//! parent.

use quire_common::{scan_blocks, BlockScanner, BlockSyntax};
use quire_vdom::{find_block_path, NodePath, RenderTree};
use serde::{Deserialize, Serialize};

pub use quire_vdom::find_render_node_for_line;

/// A content block identified by its opening line and type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAnchor {
    pub line: usize,
    pub block_type: String,
}

impl BlockAnchor {
    pub fn new(line: usize, block_type: impl Into<String>) -> Self {
        Self {
            line,
            block_type: block_type.into(),
        }
    }
}

/// Nearest enclosing non-structural block for `cursor_line`
///
/// Returns `None` when the cursor is outside every block or only structural
/// blocks enclose it.
pub fn resolve_block_at(cursor_line: usize, source: &str, syntax: &BlockSyntax) -> Option<BlockAnchor> {
    if cursor_line == 0 {
        return None;
    }

    let mut scanner = BlockScanner::new(syntax);
    for text in source.lines().take(cursor_line) {
        scanner.push_line(text);
    }

    // structural blocks hand their content to the nearest content block
    scanner
        .open_blocks()
        .filter(|block| !block.structural)
        .last()
        .map(|block| BlockAnchor::new(block.start_line, block.block_type.clone()))
}

/// Render node path for a block anchor
pub fn find_block_node(tree: &RenderTree, anchor: &BlockAnchor) -> Option<NodePath> {
    find_block_path(tree, anchor.line, &anchor.block_type)
}

/// Source line range `[start, end]` of the block opened at `anchor.line`
pub fn block_line_range(source: &str, anchor: &BlockAnchor, syntax: &BlockSyntax) -> Option<(usize, usize)> {
    scan_blocks(source, syntax)
        .into_iter()
        .find(|b| b.start_line == anchor.line && b.block_type == anchor.block_type)
        .map(|b| (b.start_line, b.end_line))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1  intro
    // 2  %meta
    // 3  title: x
    // 4  %slide Opening
    // 5  hello
    // 6  %%card First
    // 7  one
    // 8  %%end
    // 9  after cards
    // 10 %%card Second
    // 11 %%%style
    // 12 color: red
    // 13 %%%
    // 14 two
    // 15 %
    // 16 loose
    const SOURCE: &str = "intro\n%meta\ntitle: x\n%slide Opening\nhello\n%%card First\none\n%%end\nafter cards\n%%card Second\n%%%style\ncolor: red\n%%%\ntwo\n%\nloose";

    fn at(line: usize) -> Option<BlockAnchor> {
        resolve_block_at(line, SOURCE, &BlockSyntax::default())
    }

    #[test]
    fn test_outside_any_block() {
        assert_eq!(at(1), None);
        assert_eq!(at(0), None);
    }

    #[test]
    fn test_inside_structural_block() {
        assert_eq!(at(2), None);
        assert_eq!(at(3), None);
    }

    #[test]
    fn test_on_delimiter_line_and_content() {
        assert_eq!(at(4), Some(BlockAnchor::new(4, "slide")));
        assert_eq!(at(5), Some(BlockAnchor::new(4, "slide")));
        assert_eq!(at(6), Some(BlockAnchor::new(6, "card")));
        assert_eq!(at(7), Some(BlockAnchor::new(6, "card")));
    }

    #[test]
    fn test_close_line_resolves_to_parent() {
        assert_eq!(at(8), Some(BlockAnchor::new(4, "slide")));
        assert_eq!(at(9), Some(BlockAnchor::new(4, "slide")));
    }

    #[test]
    fn test_nested_structural_block_is_skipped() {
        assert_eq!(at(11), Some(BlockAnchor::new(10, "card")));
        assert_eq!(at(12), Some(BlockAnchor::new(10, "card")));
        // the separator closes the style block, content belongs to the card
        assert_eq!(at(14), Some(BlockAnchor::new(10, "card")));
    }

    #[test]
    fn test_top_level_separator_closes_everything() {
        assert_eq!(at(15), None);
        assert_eq!(at(16), None);
    }

    #[test]
    fn test_cursor_past_end_clamps() {
        let source = "%card\ntext";
        assert_eq!(
            resolve_block_at(40, source, &BlockSyntax::default()),
            Some(BlockAnchor::new(1, "card"))
        );
    }

    #[test]
    fn test_stray_close_agrees_with_block_ranges() {
        let source = "%a\n%%%c\n%%end\nx\n";
        let syntax = BlockSyntax::default();

        let anchor = resolve_block_at(4, source, &syntax);
        assert_eq!(anchor, Some(BlockAnchor::new(2, "c")));

        let anchor = anchor.unwrap();
        assert_eq!(block_line_range(source, &anchor, &syntax), Some((2, 4)));
        let enclosing: Vec<_> = scan_blocks(source, &syntax)
            .into_iter()
            .filter(|b| b.contains_line(4))
            .map(|b| b.start_line)
            .collect();
        assert_eq!(enclosing, vec![1, 2]);
    }

    #[test]
    fn test_block_line_range() {
        let syntax = BlockSyntax::default();
        let range = block_line_range(SOURCE, &BlockAnchor::new(6, "card"), &syntax);
        assert_eq!(range, Some((6, 8)));
        assert_eq!(block_line_range(SOURCE, &BlockAnchor::new(5, "card"), &syntax), None);
    }
}
