//! Node identity across recompiles.
//!
//! The compiler embeds a stable `key` on block roots and on the
//! sub-elements it can attribute. Everything else here (origin line plus
//! type tag, class suffixes, nth-of-type counting) is a fallback for
//! output that lacks keys.

use serde::{Deserialize, Serialize};

use crate::vdom::{NodePath, RenderTree, VNode, WalkControl};

/// Attribute carrying a persisted opaque selection id
pub const SELECTION_ID_ATTR: &str = "data-selection-id";

/// Everything needed to find "the same" node in a later render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAnchor {
    pub key: Option<String>,
    pub origin_line: Option<usize>,
    pub block_type: Option<String>,
    pub tag: Option<String>,
    pub path: NodePath,
}

impl NodeAnchor {
    /// Capture the anchor for the node at `path`
    pub fn capture(tree: &RenderTree, path: &[usize]) -> Option<Self> {
        let node = tree.node_at(path)?;
        Some(Self {
            key: node.key().map(str::to_string),
            origin_line: node.origin_line(),
            block_type: node.block_type().map(str::to_string),
            tag: node.tag().map(str::to_string),
            path: path.to_vec(),
        })
    }

    /// Locate the anchored node in `tree`: key, then line and type, then path
    pub fn resolve(&self, tree: &RenderTree) -> Option<NodePath> {
        if let Some(key) = &self.key {
            if let Some(path) = find_path_by_key(tree, key) {
                return Some(path);
            }
        }

        if let (Some(line), Some(block_type)) = (self.origin_line, &self.block_type) {
            if let Some(path) = find_block_path(tree, line, block_type) {
                return Some(path);
            }
        }

        let node = tree.node_at(&self.path)?;
        // positional match only counts when it still looks like the same node
        let same_shape = node.tag() == self.tag.as_deref() && node.key() == self.key.as_deref();
        same_shape.then(|| self.path.clone())
    }
}

/// Finer-grained target inside a block, tried in field order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTarget {
    pub key: Option<String>,
    pub selection_id: Option<String>,
    /// BEM element suffix, matched against `block__suffix` classes
    pub class_suffix: Option<String>,
    pub nth_of_type: Option<(String, usize)>,
}

impl SubTarget {
    pub fn by_key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    pub fn by_class_suffix(suffix: impl Into<String>) -> Self {
        Self {
            class_suffix: Some(suffix.into()),
            ..Self::default()
        }
    }

    pub fn by_nth_of_type(tag: impl Into<String>, index: usize) -> Self {
        Self {
            nth_of_type: Some((tag.into(), index)),
            ..Self::default()
        }
    }

    pub fn by_selection_id(id: impl Into<String>) -> Self {
        Self {
            selection_id: Some(id.into()),
            ..Self::default()
        }
    }
}

pub fn find_path_by_key(tree: &RenderTree, key: &str) -> Option<NodePath> {
    let mut found = None;
    tree.walk(|path, node| {
        if node.key() == Some(key) {
            found = Some(path.to_vec());
            WalkControl::Stop
        } else {
            WalkControl::Continue
        }
    });
    found
}

/// Block root carrying both `line` and `block_type` markers
pub fn find_block_path(tree: &RenderTree, line: usize, block_type: &str) -> Option<NodePath> {
    let mut found = None;
    tree.walk(|path, node| {
        if node.origin_line() == Some(line) && node.block_type() == Some(block_type) {
            found = Some(path.to_vec());
            WalkControl::Stop
        } else {
            WalkControl::Continue
        }
    });
    found
}

/// Resolve `target` inside the block rooted at `block_path`.
///
/// Nested block roots are not descended into, so a class that also
/// appears in a child block never matches.
pub fn resolve_sub_target(tree: &RenderTree, block_path: &[usize], target: &SubTarget) -> Option<NodePath> {
    let root = tree.node_at(block_path)?;
    let members = block_members(root);

    let relative = target
        .key
        .as_deref()
        .and_then(|key| members.iter().find(|(_, n)| n.key() == Some(key)))
        .or_else(|| {
            let id = target.selection_id.as_deref()?;
            members.iter().find(|(_, n)| n.attr(SELECTION_ID_ATTR) == Some(id))
        })
        .or_else(|| {
            let suffix = target.class_suffix.as_deref()?;
            members.iter().find(|(_, n)| has_bem_suffix(n, suffix))
        })
        .or_else(|| {
            let (tag, index) = target.nth_of_type.as_ref()?;
            members
                .iter()
                .filter(|(_, n)| n.tag() == Some(tag.as_str()))
                .nth(*index)
        })
        .map(|(path, _)| path.clone())?;

    let mut full = block_path.to_vec();
    full.extend(relative);
    Some(full)
}

fn has_bem_suffix(node: &VNode, suffix: &str) -> bool {
    node.classes().any(|class| {
        class
            .rsplit_once("__")
            .is_some_and(|(_, element)| element == suffix)
    })
}

/// Descendant elements owned by this block (paths relative to `root`)
fn block_members(root: &VNode) -> Vec<(NodePath, &VNode)> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    collect_members(root, &mut path, &mut out);
    out
}

fn collect_members<'a>(node: &'a VNode, path: &mut NodePath, out: &mut Vec<(NodePath, &'a VNode)>) {
    for (i, child) in node.children().iter().enumerate() {
        if !matches!(child, VNode::Element { .. }) || child.is_block_root() {
            continue;
        }
        path.push(i);
        out.push((path.clone(), child));
        collect_members(child, path, out);
        path.pop();
    }
}
