use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index path from the tree roots down to a node
pub type NodePath = Vec<usize>;

/// Render tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum VNode {
    /// Element with identity markers
    Element {
        tag: String,
        attributes: BTreeMap<String, String>,
        children: Vec<VNode>,
        /// Stable id embedded by the compiler (primary identity)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        /// Source line the compiler attributed this node to
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_line: Option<usize>,
        /// Type tag, present on block roots only
        #[serde(default, skip_serializing_if = "Option::is_none")]
        block_type: Option<String>,
    },

    /// Text node
    Text { content: String },

    /// Comment node
    Comment { content: String },
}

impl VNode {
    pub fn element(tag: impl Into<String>) -> Self {
        VNode::Element {
            tag: tag.into(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            key: None,
            origin_line: None,
            block_type: None,
        }
    }

    /// Block root carrying both identity markers
    pub fn block(tag: impl Into<String>, block_type: impl Into<String>, origin_line: usize) -> Self {
        VNode::element(tag)
            .with_block_type(block_type)
            .with_origin_line(origin_line)
    }

    pub fn text(content: impl Into<String>) -> Self {
        VNode::Text {
            content: content.into(),
        }
    }

    pub fn comment(content: impl Into<String>) -> Self {
        VNode::Comment {
            content: content.into(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        if let VNode::Element {
            ref mut attributes, ..
        } = self
        {
            attributes.insert(key.into(), value.into());
        }
        self
    }

    pub fn with_child(mut self, child: VNode) -> Self {
        if let VNode::Element {
            ref mut children, ..
        } = self
        {
            children.push(child);
        }
        self
    }

    pub fn with_children(mut self, new_children: Vec<VNode>) -> Self {
        if let VNode::Element {
            ref mut children, ..
        } = self
        {
            children.extend(new_children);
        }
        self
    }

    pub fn with_key(mut self, new_key: impl Into<String>) -> Self {
        if let VNode::Element { ref mut key, .. } = self {
            *key = Some(new_key.into());
        }
        self
    }

    pub fn with_origin_line(mut self, line: usize) -> Self {
        if let VNode::Element {
            ref mut origin_line,
            ..
        } = self
        {
            *origin_line = Some(line);
        }
        self
    }

    pub fn with_block_type(mut self, new_type: impl Into<String>) -> Self {
        if let VNode::Element {
            ref mut block_type,
            ..
        } = self
        {
            *block_type = Some(new_type.into());
        }
        self
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            VNode::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            VNode::Element { key, .. } => key.as_deref(),
            _ => None,
        }
    }

    pub fn origin_line(&self) -> Option<usize> {
        match self {
            VNode::Element { origin_line, .. } => *origin_line,
            _ => None,
        }
    }

    pub fn block_type(&self) -> Option<&str> {
        match self {
            VNode::Element { block_type, .. } => block_type.as_deref(),
            _ => None,
        }
    }

    pub fn is_block_root(&self) -> bool {
        self.block_type().is_some()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            VNode::Element { attributes, .. } => attributes.get(name).map(String::as_str),
            _ => None,
        }
    }

    pub fn children(&self) -> &[VNode] {
        match self {
            VNode::Element { children, .. } => children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<VNode>> {
        match self {
            VNode::Element { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Whitespace-separated entries of the `class` attribute
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    /// Concatenated text of this node and its descendants
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &VNode, out: &mut String) {
    match node {
        VNode::Text { content } => out.push_str(content),
        VNode::Element { children, .. } => {
            for child in children {
                collect_text(child, out);
            }
        }
        VNode::Comment { .. } => {}
    }
}

/// Compiled render output (a forest of root nodes)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderTree {
    pub nodes: Vec<VNode>,
}

impl RenderTree {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn from_nodes(nodes: Vec<VNode>) -> Self {
        Self { nodes }
    }

    pub fn add_node(&mut self, node: VNode) {
        self.nodes.push(node);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_at(&self, path: &[usize]) -> Option<&VNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.nodes.get(*first)?;
        for idx in rest {
            node = node.children().get(*idx)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut VNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.nodes.get_mut(*first)?;
        for idx in rest {
            node = node.children_mut()?.get_mut(*idx)?;
        }
        Some(node)
    }

    /// Child list that contains the node at `path`
    pub fn siblings_mut(&mut self, path: &[usize]) -> Option<&mut Vec<VNode>> {
        match path.split_last() {
            None => None,
            Some((_, [])) => Some(&mut self.nodes),
            Some((_, parent)) => self.node_at_mut(parent)?.children_mut(),
        }
    }

    /// Pre-order walk over every node with its path
    pub fn walk<'a>(&'a self, mut visit: impl FnMut(&[usize], &'a VNode) -> WalkControl) {
        let mut path = Vec::new();
        for (i, node) in self.nodes.iter().enumerate() {
            path.push(i);
            let stop = walk_node(node, &mut path, &mut visit);
            path.pop();
            if stop {
                return;
            }
        }
    }
}

/// Returned by walk visitors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    SkipChildren,
    Stop,
}

fn walk_node<'a>(
    node: &'a VNode,
    path: &mut Vec<usize>,
    visit: &mut impl FnMut(&[usize], &'a VNode) -> WalkControl,
) -> bool {
    match visit(path, node) {
        WalkControl::Stop => return true,
        WalkControl::SkipChildren => return false,
        WalkControl::Continue => {}
    }
    for (i, child) in node.children().iter().enumerate() {
        path.push(i);
        let stop = walk_node(child, path, visit);
        path.pop();
        if stop {
            return true;
        }
    }
    false
}
