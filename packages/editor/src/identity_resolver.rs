//! # Block Identity Resolver
//!
//! Re-finds a block in a new source revision after a reverse compile has
//! renumbered (and possibly restructured) the document.
//!
//! Resolution order, first hit wins:
//!
//! 1. **Ordinal**: when the new source has as many blocks of the type as
//!    the old one did, the block at the same position in type order.
//! 2. **Same type by proximity**: the block of that type whose opening line
//!    is numerically closest to the old line.
//! 3. **Any type by proximity**: the closest content block of any type.
//! 4. Nothing (no content blocks at all).
//!
//! Proximity ties go to the earliest line.

use quire_common::{scan_blocks, Block, BlockSyntax};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::locator::BlockAnchor;

/// What is known about a block before the edit that moved it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHint {
    pub anchor: BlockAnchor,
    /// Position among blocks of the same type, if the anchor was found
    pub ordinal: Option<usize>,
    /// Number of blocks of the same type in the old source
    pub type_count: usize,
}

impl IdentityHint {
    pub fn capture(anchor: BlockAnchor, source: &str, syntax: &BlockSyntax) -> Self {
        let blocks = content_blocks(source, syntax);
        let same_type: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.block_type == anchor.block_type)
            .collect();
        let ordinal = same_type.iter().position(|b| b.start_line == anchor.line);

        Self {
            type_count: same_type.len(),
            ordinal,
            anchor,
        }
    }
}

/// Best match for `hint` in `new_source`
pub fn resolve_block_identity(hint: &IdentityHint, new_source: &str, syntax: &BlockSyntax) -> Option<BlockAnchor> {
    let blocks = content_blocks(new_source, syntax);

    if let Some(ordinal) = hint.ordinal {
        let same_type: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.block_type == hint.anchor.block_type)
            .collect();
        if same_type.len() == hint.type_count {
            if let Some(block) = same_type.get(ordinal) {
                debug!(
                    block_type = %hint.anchor.block_type,
                    ordinal,
                    from = hint.anchor.line,
                    to = block.start_line,
                    "block resolved by ordinal"
                );
                return Some(anchor_of(block));
            }
        }
    }

    closest_block(hint.anchor.line, &hint.anchor.block_type, &blocks)
}

/// Proximity-only resolution: same type first, then any type
pub fn resolve_by_proximity(
    original_line: usize,
    block_type: &str,
    new_source: &str,
    syntax: &BlockSyntax,
) -> Option<BlockAnchor> {
    closest_block(original_line, block_type, &content_blocks(new_source, syntax))
}

fn closest_block(line: usize, block_type: &str, blocks: &[Block]) -> Option<BlockAnchor> {
    let found = nearest(blocks.iter().filter(|b| b.block_type == block_type), line)
        .or_else(|| nearest(blocks.iter(), line));
    if found.is_none() {
        debug!(line, block_type, "no content block to resolve to");
    }
    found.map(anchor_of)
}

fn nearest<'a>(candidates: impl Iterator<Item = &'a Block>, line: usize) -> Option<&'a Block> {
    candidates.min_by_key(|b| (b.start_line.abs_diff(line), b.start_line))
}

fn content_blocks(source: &str, syntax: &BlockSyntax) -> Vec<Block> {
    scan_blocks(source, syntax)
        .into_iter()
        .filter(|b| !b.structural)
        .collect()
}

fn anchor_of(block: &Block) -> BlockAnchor {
    BlockAnchor::new(block.start_line, block.block_type.clone())
}
