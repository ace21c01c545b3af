//! Reference compiler for the block format.
//!
//! Real hosts plug in their own compiler. This one is small, deterministic
//! and complete enough to drive the sync engine in tests:
//!
//! - content blocks become `<section>` roots keyed `{type}-{n}`
//! - structural blocks become hidden `<template>` roots that keep their
//!   lines verbatim, so a reverse compile does not lose them
//! - non-blank content lines become `<p>` elements keyed `{parent}/{n}`
//! - a line with an unclosed `{{` is a fatal diagnostic

use std::collections::HashMap;

use quire_common::{BlockSyntax, Delimiter};

use crate::compiler::{CompileOptions, CompileOutput, Compiler, CompilerError, Diagnostic, LineMapping};
use crate::vdom::{RenderTree, VNode};

pub const LABEL_ATTR: &str = "data-label";

#[derive(Debug, Clone, Default)]
pub struct BlockCompiler {
    syntax: BlockSyntax,
}

struct OpenNode {
    node: VNode,
    depth: usize,
    paragraphs: usize,
    structural: bool,
}

impl BlockCompiler {
    pub fn new(syntax: BlockSyntax) -> Self {
        Self { syntax }
    }

    pub fn syntax(&self) -> &BlockSyntax {
        &self.syntax
    }
}

fn slug(block_type: &str) -> String {
    block_type
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

fn close_until(stack: &mut Vec<OpenNode>, roots: &mut Vec<VNode>, depth: usize) {
    while stack.last().is_some_and(|open| open.depth >= depth) {
        if let Some(open) = stack.pop() {
            attach(stack, roots, open.node);
        }
    }
}

fn attach(stack: &mut [OpenNode], roots: &mut Vec<VNode>, node: VNode) {
    match stack.last_mut().and_then(|open| open.node.children_mut()) {
        Some(children) => children.push(node),
        None => roots.push(node),
    }
}

impl Compiler for BlockCompiler {
    fn compile(&self, source: &str, _options: &CompileOptions) -> Result<CompileOutput, CompilerError> {
        let mut output = CompileOutput::default();
        let mut roots = Vec::new();
        let mut stack: Vec<OpenNode> = Vec::new();
        let mut ordinals: HashMap<String, usize> = HashMap::new();
        let mut root_paragraphs = 0;

        for (i, text) in source.lines().enumerate() {
            let line = i + 1;

            if let Some(open) = stack.last_mut().filter(|open| open.structural) {
                // only a delimiter at or above the structural block's depth ends it
                let ends_block = self
                    .syntax
                    .parse_line(text)
                    .is_some_and(|d| d.depth() <= open.depth);
                if !ends_block {
                    if let Some(children) = open.node.children_mut() {
                        children.push(
                            VNode::element("span")
                                .with_origin_line(line)
                                .with_child(VNode::text(text)),
                        );
                    }
                    continue;
                }
            }

            match self.syntax.parse_line(text) {
                Some(Delimiter::Open {
                    depth,
                    block_type,
                    label,
                }) => {
                    close_until(&mut stack, &mut roots, depth);

                    let n = ordinals.entry(block_type.to_string()).or_insert(0);
                    *n += 1;
                    let key = format!("{block_type}-{n}");
                    let structural = self.syntax.is_structural(block_type);

                    let mut node = if structural {
                        VNode::block("template", block_type, line)
                    } else {
                        VNode::block("section", block_type, line)
                            .with_attr("class", format!("block block--{}", slug(block_type)))
                    };
                    node = node.with_key(key.clone());
                    if let Some(label) = label {
                        node = node.with_attr(LABEL_ATTR, label);
                    }

                    output.line_map.push(LineMapping {
                        source_line: line,
                        node_key: key,
                    });
                    stack.push(OpenNode {
                        node,
                        depth,
                        paragraphs: 0,
                        structural,
                    });
                }
                Some(Delimiter::Close { depth }) => {
                    if stack.iter().any(|open| open.depth == depth) {
                        close_until(&mut stack, &mut roots, depth);
                    } else {
                        output
                            .diagnostics
                            .push(Diagnostic::warning(line, "close delimiter without an open block"));
                    }
                }
                Some(Delimiter::Separator { depth }) => close_until(&mut stack, &mut roots, depth),
                None => {
                    let content = text.trim_end();
                    if content.trim().is_empty() {
                        continue;
                    }
                    if let Some(at) = content.find("{{") {
                        if !content[at..].contains("}}") {
                            output.diagnostics.push(Diagnostic::error(line, "unclosed interpolation"));
                        }
                    }

                    let paragraph = match stack.last_mut() {
                        Some(open) => {
                            open.paragraphs += 1;
                            let parent_key = open.node.key().unwrap_or_default();
                            let parent_type = open.node.block_type().unwrap_or_default();
                            VNode::element("p")
                                .with_key(format!("{parent_key}/{}", open.paragraphs))
                                .with_attr("class", format!("{}__line", slug(parent_type)))
                        }
                        None => {
                            root_paragraphs += 1;
                            VNode::element("p").with_key(format!("p-{root_paragraphs}"))
                        }
                    };
                    let paragraph = paragraph.with_origin_line(line).with_child(VNode::text(content));
                    output.line_map.push(LineMapping {
                        source_line: line,
                        node_key: paragraph.key().unwrap_or_default().to_string(),
                    });
                    attach(&mut stack, &mut roots, paragraph);
                }
            }
        }

        close_until(&mut stack, &mut roots, 0);
        output.render = RenderTree::from_nodes(roots);
        Ok(output)
    }

    fn reverse_compile(&self, render: &RenderTree) -> Result<String, CompilerError> {
        let mut lines = Vec::new();
        self.emit_children(&render.nodes, 0, &mut lines)?;
        let mut source = lines.join("\n");
        source.push('\n');
        Ok(source)
    }
}

impl BlockCompiler {
    fn emit_children(&self, nodes: &[VNode], depth: usize, lines: &mut Vec<String>) -> Result<(), CompilerError> {
        for (i, node) in nodes.iter().enumerate() {
            match node {
                VNode::Element { .. } if node.is_block_root() => {
                    self.emit_block(node, depth, lines)?;
                    let followed_by_content = nodes
                        .get(i + 1)
                        .is_some_and(|next| !next.is_block_root() && !matches!(next, VNode::Comment { .. }));
                    if followed_by_content {
                        lines.push(self.syntax.close_line(depth));
                    }
                }
                VNode::Element { tag, .. } if tag == "section" || tag == "template" => {
                    return Err(CompilerError::Reverse(format!("<{tag}> without a type tag")));
                }
                VNode::Element { .. } | VNode::Text { .. } => {
                    let text = node.text_content();
                    lines.extend(
                        text.lines()
                            .map(str::trim_end)
                            .filter(|l| !l.trim().is_empty())
                            .map(str::to_string),
                    );
                }
                VNode::Comment { .. } => {}
            }
        }
        Ok(())
    }

    fn emit_block(&self, node: &VNode, depth: usize, lines: &mut Vec<String>) -> Result<(), CompilerError> {
        let block_type = node.block_type().unwrap_or_default();
        let open = self
            .syntax
            .open_line(depth, block_type, node.attr(LABEL_ATTR))
            .map_err(|e| CompilerError::Reverse(e.to_string()))?;
        lines.push(open);

        if self.syntax.is_structural(block_type) {
            for child in node.children() {
                lines.push(child.text_content());
            }
            return Ok(());
        }
        self.emit_children(node.children(), depth + 1, lines)
    }
}
