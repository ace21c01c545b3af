//! Source line <-> render node lookups.

use crate::vdom::{NodePath, RenderTree, VNode, WalkControl};

/// First node (pre-order) whose origin-line marker equals `line`
pub fn find_render_node_for_line(line: usize, tree: &RenderTree) -> Option<&VNode> {
    let path = find_path_for_line(line, tree)?;
    tree.node_at(&path)
}

pub fn find_path_for_line(line: usize, tree: &RenderTree) -> Option<NodePath> {
    let mut found = None;
    tree.walk(|path, node| {
        if node.origin_line() == Some(line) {
            found = Some(path.to_vec());
            WalkControl::Stop
        } else {
            WalkControl::Continue
        }
    });
    found
}

/// Origin line of the node at `path`, or of its nearest attributed ancestor
pub fn origin_line_at_path(tree: &RenderTree, path: &[usize]) -> Option<usize> {
    (1..=path.len())
        .rev()
        .find_map(|len| tree.node_at(&path[..len]).and_then(VNode::origin_line))
}

/// Path of the nearest enclosing block root (the node itself included)
pub fn enclosing_block_path(tree: &RenderTree, path: &[usize]) -> Option<NodePath> {
    (1..=path.len())
        .rev()
        .find(|len| tree.node_at(&path[..*len]).is_some_and(VNode::is_block_root))
        .map(|len| path[..len].to_vec())
}

/// Every block root in document order
pub fn block_roots(tree: &RenderTree) -> Vec<(NodePath, &VNode)> {
    let mut roots = Vec::new();
    tree.walk(|path, node| {
        if node.is_block_root() {
            roots.push((path.to_vec(), node));
        }
        WalkControl::Continue
    });
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> RenderTree {
        RenderTree::from_nodes(vec![
            VNode::element("p").with_origin_line(1).with_child(VNode::text("intro")),
            VNode::block("section", "slide", 2)
                .with_child(VNode::element("p").with_origin_line(3).with_child(
                    VNode::element("em").with_child(VNode::text("inline")),
                ))
                .with_child(
                    VNode::block("section", "card", 4)
                        .with_child(VNode::element("p").with_origin_line(5)),
                ),
        ])
    }

    #[test]
    fn test_find_render_node_for_line() {
        let tree = tree();
        assert_eq!(find_render_node_for_line(4, &tree).and_then(VNode::block_type), Some("card"));
        assert_eq!(find_path_for_line(5, &tree), Some(vec![1, 1, 0]));
        assert!(find_render_node_for_line(42, &tree).is_none());
    }

    #[test]
    fn test_origin_line_climbs_to_ancestor() {
        let tree = tree();
        // the <em> has no marker of its own
        assert_eq!(origin_line_at_path(&tree, &[1, 0, 0]), Some(3));
        assert_eq!(origin_line_at_path(&tree, &[1, 0, 0, 0]), Some(3));
        assert_eq!(origin_line_at_path(&tree, &[7]), None);
    }

    #[test]
    fn test_enclosing_block_path() {
        let tree = tree();
        assert_eq!(enclosing_block_path(&tree, &[1, 1, 0]), Some(vec![1, 1]));
        assert_eq!(enclosing_block_path(&tree, &[1, 0, 0]), Some(vec![1]));
        assert_eq!(enclosing_block_path(&tree, &[0]), None);
    }

    #[test]
    fn test_block_roots_in_document_order() {
        let tree = tree();
        let types: Vec<_> = block_roots(&tree).iter().filter_map(|(_, n)| n.block_type()).collect();
        assert_eq!(types, vec!["slide", "card"]);
    }
}
