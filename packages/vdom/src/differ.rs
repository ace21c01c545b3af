//! Render tree diffing.
//!
//! Nodes are compared position by position. A node whose kind, tag or
//! stable key changed is replaced wholesale; otherwise attributes, identity
//! markers and children are diffed in place so unchanged nodes survive.
//!
//! Patch order is significant: trailing removals are emitted from the
//! highest index down so earlier paths stay valid while applying.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PatchError;
use crate::vdom::{NodePath, RenderTree, VNode};

/// A single in-place edit of a render tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum RenderPatch {
    CreateNode {
        path: NodePath,
        node: VNode,
    },
    RemoveNode {
        path: NodePath,
    },
    ReplaceNode {
        path: NodePath,
        node: VNode,
    },
    UpdateAttributes {
        path: NodePath,
        attributes: BTreeMap<String, String>,
    },
    /// Origin line or type tag moved while the node stayed the same
    UpdateMarkers {
        path: NodePath,
        origin_line: Option<usize>,
        block_type: Option<String>,
    },
    UpdateText {
        path: NodePath,
        content: String,
    },
}

impl RenderPatch {
    pub fn path(&self) -> &[usize] {
        match self {
            RenderPatch::CreateNode { path, .. }
            | RenderPatch::RemoveNode { path }
            | RenderPatch::ReplaceNode { path, .. }
            | RenderPatch::UpdateAttributes { path, .. }
            | RenderPatch::UpdateMarkers { path, .. }
            | RenderPatch::UpdateText { path, .. } => path,
        }
    }
}

/// Diff two render trees
pub fn diff_render_tree(old: &RenderTree, new: &RenderTree) -> Vec<RenderPatch> {
    let mut patches = Vec::new();
    diff_children(&old.nodes, &new.nodes, &[], &mut patches);
    patches
}

fn diff_children(old: &[VNode], new: &[VNode], parent: &[usize], patches: &mut Vec<RenderPatch>) {
    let shared = old.len().min(new.len());
    for i in 0..shared {
        let mut path = parent.to_vec();
        path.push(i);
        diff_node(&old[i], &new[i], path, patches);
    }

    for i in (shared..old.len()).rev() {
        let mut path = parent.to_vec();
        path.push(i);
        patches.push(RenderPatch::RemoveNode { path });
    }

    for (i, node) in new.iter().enumerate().skip(shared) {
        let mut path = parent.to_vec();
        path.push(i);
        patches.push(RenderPatch::CreateNode {
            path,
            node: node.clone(),
        });
    }
}

fn diff_node(old: &VNode, new: &VNode, path: NodePath, patches: &mut Vec<RenderPatch>) {
    match (old, new) {
        (
            VNode::Element {
                tag: old_tag,
                attributes: old_attrs,
                children: old_children,
                key: old_key,
                origin_line: old_line,
                block_type: old_type,
            },
            VNode::Element {
                tag: new_tag,
                attributes: new_attrs,
                children: new_children,
                key: new_key,
                origin_line: new_line,
                block_type: new_type,
            },
        ) => {
            if old_tag != new_tag || old_key != new_key {
                patches.push(RenderPatch::ReplaceNode {
                    path,
                    node: new.clone(),
                });
                return;
            }

            if old_attrs != new_attrs {
                patches.push(RenderPatch::UpdateAttributes {
                    path: path.clone(),
                    attributes: new_attrs.clone(),
                });
            }

            if old_line != new_line || old_type != new_type {
                patches.push(RenderPatch::UpdateMarkers {
                    path: path.clone(),
                    origin_line: *new_line,
                    block_type: new_type.clone(),
                });
            }

            diff_children(old_children, new_children, &path, patches);
        }
        (VNode::Text { content: old_text }, VNode::Text { content: new_text }) => {
            if old_text != new_text {
                patches.push(RenderPatch::UpdateText {
                    path,
                    content: new_text.clone(),
                });
            }
        }
        (VNode::Comment { content: old_text }, VNode::Comment { content: new_text }) => {
            if old_text != new_text {
                patches.push(RenderPatch::ReplaceNode {
                    path,
                    node: new.clone(),
                });
            }
        }
        // kind changed
        _ => patches.push(RenderPatch::ReplaceNode {
            path,
            node: new.clone(),
        }),
    }
}

/// Apply patches in order, mutating `tree` in place
pub fn apply_patches(tree: &mut RenderTree, patches: &[RenderPatch]) -> Result<(), PatchError> {
    for patch in patches {
        apply_patch(tree, patch)?;
    }
    Ok(())
}

fn apply_patch(tree: &mut RenderTree, patch: &RenderPatch) -> Result<(), PatchError> {
    let path = patch.path();
    let invalid = || PatchError::InvalidPath(path.to_vec());

    match patch {
        RenderPatch::CreateNode { node, .. } => {
            let index = *path.last().ok_or_else(invalid)?;
            let siblings = tree.siblings_mut(path).ok_or_else(invalid)?;
            if index > siblings.len() {
                return Err(invalid());
            }
            siblings.insert(index, node.clone());
        }
        RenderPatch::RemoveNode { .. } => {
            let index = *path.last().ok_or_else(invalid)?;
            let siblings = tree.siblings_mut(path).ok_or_else(invalid)?;
            if index >= siblings.len() {
                return Err(invalid());
            }
            siblings.remove(index);
        }
        RenderPatch::ReplaceNode { node, .. } => {
            let target = tree.node_at_mut(path).ok_or_else(invalid)?;
            *target = node.clone();
        }
        RenderPatch::UpdateAttributes { attributes, .. } => match tree.node_at_mut(path) {
            Some(VNode::Element {
                attributes: target, ..
            }) => *target = attributes.clone(),
            Some(_) => return Err(PatchError::NotAnElement(path.to_vec())),
            None => return Err(invalid()),
        },
        RenderPatch::UpdateMarkers {
            origin_line,
            block_type,
            ..
        } => match tree.node_at_mut(path) {
            Some(VNode::Element {
                origin_line: line,
                block_type: ty,
                ..
            }) => {
                *line = *origin_line;
                *ty = block_type.clone();
            }
            Some(_) => return Err(PatchError::NotAnElement(path.to_vec())),
            None => return Err(invalid()),
        },
        RenderPatch::UpdateText { content, .. } => match tree.node_at_mut(path) {
            Some(VNode::Text { content: target }) => *target = content.clone(),
            Some(_) => return Err(PatchError::NotText(path.to_vec())),
            None => return Err(invalid()),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card(key: &str, line: usize, text: &str) -> VNode {
        VNode::block("section", "card", line)
            .with_key(key)
            .with_child(VNode::element("p").with_origin_line(line + 1).with_child(VNode::text(text)))
    }

    #[test]
    fn test_identical_trees_produce_no_patches() {
        let tree = RenderTree::from_nodes(vec![card("card-1", 1, "a"), card("card-2", 3, "b")]);
        assert!(diff_render_tree(&tree, &tree.clone()).is_empty());
    }

    #[test]
    fn test_text_change_is_a_single_update() {
        let old = RenderTree::from_nodes(vec![card("card-1", 1, "a")]);
        let new = RenderTree::from_nodes(vec![card("card-1", 1, "b")]);

        let patches = diff_render_tree(&old, &new);
        assert_eq!(
            patches,
            vec![RenderPatch::UpdateText {
                path: vec![0, 0, 0],
                content: "b".to_string()
            }]
        );
    }

    #[test]
    fn test_line_shift_updates_markers_only() {
        let old = RenderTree::from_nodes(vec![card("card-1", 1, "a")]);
        let new = RenderTree::from_nodes(vec![card("card-1", 4, "a")]);

        let patches = diff_render_tree(&old, &new);
        assert_eq!(patches.len(), 2);
        assert!(patches.iter().all(|p| matches!(p, RenderPatch::UpdateMarkers { .. })));
    }

    #[test]
    fn test_key_change_replaces_node() {
        let old = RenderTree::from_nodes(vec![card("card-1", 1, "a")]);
        let new = RenderTree::from_nodes(vec![card("card-9", 1, "a")]);

        let patches = diff_render_tree(&old, &new);
        assert!(matches!(&patches[..], [RenderPatch::ReplaceNode { path, .. }] if path == &vec![0]));
    }

    #[test]
    fn test_trailing_removals_apply_cleanly() {
        let mut old = RenderTree::from_nodes(vec![
            card("card-1", 1, "a"),
            card("card-2", 3, "b"),
            card("card-3", 5, "c"),
        ]);
        let new = RenderTree::from_nodes(vec![card("card-1", 1, "a")]);

        let patches = diff_render_tree(&old, &new);
        assert_eq!(
            patches,
            vec![
                RenderPatch::RemoveNode { path: vec![2] },
                RenderPatch::RemoveNode { path: vec![1] },
            ]
        );
        apply_patches(&mut old, &patches).unwrap();
        assert_eq!(old, new);
    }

    #[test]
    fn test_apply_reaches_new_tree() {
        let mut old = RenderTree::from_nodes(vec![
            card("card-1", 1, "a"),
            VNode::comment("note"),
            VNode::text("tail"),
        ]);
        let new = RenderTree::from_nodes(vec![
            card("card-1", 2, "changed").with_attr("class", "wide"),
            VNode::text("was a comment"),
            VNode::text("tail"),
            card("card-2", 9, "new"),
        ]);

        let patches = diff_render_tree(&old, &new);
        apply_patches(&mut old, &patches).unwrap();
        assert_eq!(old, new);
    }

    #[test]
    fn test_apply_rejects_bad_paths() {
        let mut tree = RenderTree::from_nodes(vec![VNode::text("x")]);
        let err = apply_patches(
            &mut tree,
            &[RenderPatch::UpdateAttributes {
                path: vec![0],
                attributes: BTreeMap::new(),
            }],
        )
        .unwrap_err();
        assert_eq!(err, PatchError::NotAnElement(vec![0]));

        let err = apply_patches(&mut tree, &[RenderPatch::RemoveNode { path: vec![3] }]).unwrap_err();
        assert_eq!(err, PatchError::InvalidPath(vec![3]));
    }
}
