//! # Raw Markup View
//!
//! Serializes a render tree to HTML. Every element records the byte span
//! it occupies so an offset in the raw markup maps back to an origin line,
//! and a source line maps to the span to highlight.
//!
//! Identity markers are emitted as `data-key`, `data-line` and
//! `data-block` attributes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vdom::{NodePath, RenderTree, VNode};

pub const KEY_ATTR: &str = "data-key";
pub const LINE_ATTR: &str = "data-line";
pub const BLOCK_ATTR: &str = "data-block";

/// Attributes the editor injects into a live surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripRules {
    /// Exact names or name prefixes (entries ending in `-`)
    pub injected: Vec<String>,
}

impl Default for StripRules {
    fn default() -> Self {
        Self {
            injected: vec![
                "contenteditable".to_string(),
                "spellcheck".to_string(),
                "data-editor-".to_string(),
                "data-hover".to_string(),
                "data-active".to_string(),
                "data-selected".to_string(),
            ],
        }
    }
}

impl StripRules {
    pub fn new(injected: Vec<String>) -> Self {
        Self { injected }
    }

    pub fn is_injected(&self, name: &str) -> bool {
        self.injected.iter().any(|rule| {
            if rule.ends_with('-') {
                name.starts_with(rule.as_str())
            } else {
                name == rule
            }
        })
    }

    /// Copy of `tree` without editor-injected attributes
    pub fn strip(&self, tree: &RenderTree) -> RenderTree {
        RenderTree::from_nodes(tree.nodes.iter().map(|n| self.strip_node(n)).collect())
    }

    fn strip_node(&self, node: &VNode) -> VNode {
        match node {
            VNode::Element {
                tag,
                attributes,
                children,
                key,
                origin_line,
                block_type,
            } => VNode::Element {
                tag: tag.clone(),
                attributes: attributes
                    .iter()
                    .filter(|(name, _)| !self.is_injected(name))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>(),
                children: children.iter().map(|c| self.strip_node(c)).collect(),
                key: key.clone(),
                origin_line: *origin_line,
                block_type: block_type.clone(),
            },
            other => other.clone(),
        }
    }
}

/// Serialization switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkupOptions {
    /// Emit `data-line`; off when comparing renders across line shifts
    pub line_markers: bool,
    /// Newline + indentation between elements
    pub pretty: bool,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self {
            line_markers: true,
            pretty: true,
        }
    }
}

/// Byte range one element occupies in the serialized markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSpan {
    pub start: usize,
    pub end: usize,
    pub path: NodePath,
    pub origin_line: Option<usize>,
}

/// The raw-markup view's content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedMarkup {
    pub text: String,
    /// Element spans in pre-order (parents before children)
    pub spans: Vec<MarkupSpan>,
}

impl RenderedMarkup {
    /// Origin line of the innermost attributed element containing `offset`
    pub fn origin_line_at(&self, offset: usize) -> Option<usize> {
        self.spans
            .iter()
            .filter(|s| s.start <= offset && offset < s.end)
            .filter_map(|s| s.origin_line.map(|line| (s.path.len(), line)))
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, line)| line)
    }

    /// Outermost span attributed to `line`
    pub fn span_for_line(&self, line: usize) -> Option<&MarkupSpan> {
        self.spans.iter().find(|s| s.origin_line == Some(line))
    }

    pub fn span_for_path(&self, path: &[usize]) -> Option<&MarkupSpan> {
        self.spans.iter().find(|s| s.path == path)
    }
}

pub fn render_markup(tree: &RenderTree, options: MarkupOptions) -> RenderedMarkup {
    let mut writer = MarkupWriter {
        out: RenderedMarkup::default(),
        options,
    };
    let mut path = Vec::new();
    for (i, node) in tree.nodes.iter().enumerate() {
        path.push(i);
        writer.write_node(node, &mut path, 0);
        path.pop();
    }
    writer.out
}

/// Compact HTML string, for comparisons
pub fn to_html(tree: &RenderTree, options: MarkupOptions) -> String {
    render_markup(tree, options).text
}

/// Collapse whitespace runs and drop whitespace between tags
pub fn normalize_whitespace(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pending_space = false;
    for ch in html.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            if !out.is_empty() && !out.ends_with('>') && ch != '<' {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

/// Whether two renders look the same once injected attributes, line
/// markers and formatting whitespace are ignored
pub fn renders_equivalent(a: &RenderTree, b: &RenderTree, strip: &StripRules) -> bool {
    let options = MarkupOptions {
        line_markers: false,
        pretty: false,
    };
    normalize_whitespace(&to_html(&strip.strip(a), options))
        == normalize_whitespace(&to_html(&strip.strip(b), options))
}

struct MarkupWriter {
    out: RenderedMarkup,
    options: MarkupOptions,
}

impl MarkupWriter {
    fn write_node(&mut self, node: &VNode, path: &mut NodePath, depth: usize) {
        match node {
            VNode::Element {
                tag,
                attributes,
                children,
                key,
                origin_line,
                block_type,
            } => {
                self.indent(depth);
                let start = self.out.text.len();
                let span_index = self.out.spans.len();
                self.out.spans.push(MarkupSpan {
                    start,
                    end: start,
                    path: path.clone(),
                    origin_line: *origin_line,
                });

                self.push("<");
                self.push(tag);
                if let Some(key) = key {
                    self.write_attr(KEY_ATTR, key);
                }
                if let Some(block_type) = block_type {
                    self.write_attr(BLOCK_ATTR, block_type);
                }
                if let (true, Some(line)) = (self.options.line_markers, origin_line) {
                    self.write_attr(LINE_ATTR, &line.to_string());
                }
                for (name, value) in attributes {
                    self.write_attr(name, value);
                }
                self.push(">");

                let only_text = children.iter().all(|c| !matches!(c, VNode::Element { .. }));
                for (i, child) in children.iter().enumerate() {
                    path.push(i);
                    if only_text {
                        self.write_inline(child);
                    } else {
                        self.write_node(child, path, depth + 1);
                    }
                    path.pop();
                }
                if !only_text {
                    self.indent(depth);
                }

                self.push("</");
                self.push(tag);
                self.push(">");
                self.out.spans[span_index].end = self.out.text.len();
            }
            other => {
                self.indent(depth);
                self.write_inline(other);
            }
        }
    }

    fn write_inline(&mut self, node: &VNode) {
        match node {
            VNode::Text { content } => {
                let escaped = escape(content, false);
                self.push(&escaped);
            }
            VNode::Comment { content } => {
                self.push("<!--");
                self.push(&content.replace("--", "- -"));
                self.push("-->");
            }
            // elements never reach here
            VNode::Element { .. } => {}
        }
    }

    fn write_attr(&mut self, name: &str, value: &str) {
        self.push(" ");
        self.push(name);
        self.push("=\"");
        let escaped = escape(value, true);
        self.push(&escaped);
        self.push("\"");
    }

    fn indent(&mut self, depth: usize) {
        if !self.options.pretty {
            return;
        }
        if !self.out.text.is_empty() {
            self.out.text.push('\n');
        }
        for _ in 0..depth {
            self.out.text.push_str("  ");
        }
    }

    fn push(&mut self, s: &str) {
        self.out.text.push_str(s);
    }
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> RenderTree {
        RenderTree::from_nodes(vec![VNode::block("section", "card", 2)
            .with_key("card-1")
            .with_child(
                VNode::element("p")
                    .with_origin_line(3)
                    .with_child(VNode::text("a < b")),
            )
            .with_child(VNode::element("p").with_child(VNode::text("unattributed")))])
    }

    #[test]
    fn test_pretty_markup_and_spans() {
        let markup = render_markup(&tree(), MarkupOptions::default());
        assert_eq!(
            markup.text,
            "<section data-key=\"card-1\" data-block=\"card\" data-line=\"2\">\n  <p data-line=\"3\">a &lt; b</p>\n  <p>unattributed</p>\n</section>"
        );
        assert_eq!(markup.spans.len(), 3);
        assert_eq!(markup.spans[0].start, 0);
        assert_eq!(markup.spans[0].end, markup.text.len());
    }

    #[test]
    fn test_offset_maps_to_innermost_origin_line() {
        let markup = render_markup(&tree(), MarkupOptions::default());
        let inner = markup.text.find("a &lt;").unwrap();
        assert_eq!(markup.origin_line_at(inner), Some(3));

        // the second paragraph has no marker, so its block wins
        let plain = markup.text.find("unattributed").unwrap();
        assert_eq!(markup.origin_line_at(plain), Some(2));
        assert_eq!(markup.origin_line_at(markup.text.len() + 5), None);
    }

    #[test]
    fn test_span_for_line() {
        let markup = render_markup(&tree(), MarkupOptions::default());
        let span = markup.span_for_line(3).unwrap();
        assert!(markup.text[span.start..span.end].starts_with("<p data-line=\"3\">"));
        assert!(markup.span_for_line(99).is_none());
    }

    #[test]
    fn test_strip_rules() {
        let rules = StripRules::default();
        assert!(rules.is_injected("contenteditable"));
        assert!(rules.is_injected("data-editor-caret"));
        assert!(!rules.is_injected("data-label"));

        let live = RenderTree::from_nodes(vec![VNode::element("p")
            .with_attr("contenteditable", "true")
            .with_attr("data-label", "x")]);
        let stripped = rules.strip(&live);
        assert_eq!(stripped.nodes[0].attr("contenteditable"), None);
        assert_eq!(stripped.nodes[0].attr("data-label"), Some("x"));
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("<p>\n  hello   world \n</p>\n<p>x</p>"),
            "<p>hello world</p><p>x</p>"
        );
    }

    #[test]
    fn test_renders_equivalent_ignores_lines_and_injected() {
        let a = tree();
        let mut b = tree();
        if let Some(VNode::Element { origin_line, attributes, .. }) = b.nodes.get_mut(0) {
            *origin_line = Some(40);
            attributes.insert("data-hover".into(), "true".into());
        }
        assert!(renders_equivalent(&a, &b, &StripRules::default()));

        let c = RenderTree::from_nodes(vec![VNode::element("p").with_child(VNode::text("other"))]);
        assert!(!renders_equivalent(&a, &c, &StripRules::default()));
    }
}
