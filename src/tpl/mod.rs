mod cache;
pub mod engine;
pub mod expr;
mod filters;
pub mod parser;
mod render;
mod render_context;

use expr::{Expr, ForSpec, Output};

/// Include reference as it appears in the source, quotes included.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRef {
    pub input: String,
}

/// One node of a compiled template.
///
/// `file` and `tpls` are independent: an include carries only `file`,
/// block tags carry only `tpls`, and `layout` carries both.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub line: usize,
    pub file: Option<FileRef>,
    pub tpls: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Text(String),
    Output(Output),
    Assign { name: String, value: Output },
    Include { args: Vec<(String, Expr)> },
    Layout,
    Block { name: String },
    /// `if` / `unless`; children are [`NodeKind::Branch`] nodes.
    If,
    Branch { test: Option<Expr>, negate: bool },
    For(ForSpec),
}

impl Node {
    pub fn inert(kind: NodeKind, line: usize) -> Self {
        Node {
            kind,
            line,
            file: None,
            tpls: None,
        }
    }

    pub fn container(kind: NodeKind, line: usize, tpls: Vec<Node>) -> Self {
        Node {
            kind,
            line,
            file: None,
            tpls: Some(tpls),
        }
    }

    pub fn with_file(mut self, input: impl Into<String>) -> Self {
        self.file = Some(FileRef {
            input: input.into(),
        });
        self
    }

    pub fn text(text: impl Into<String>, line: usize) -> Self {
        Node::inert(NodeKind::Text(text.into()), line)
    }

    pub fn include(input: impl Into<String>, line: usize) -> Self {
        Node::inert(NodeKind::Include { args: Vec::new() }, line).with_file(input)
    }
}

/// Unlinks children onto a heap stack so deeply nested trees drop
/// without recursing.
impl Drop for Node {
    fn drop(&mut self) {
        let Some(mut stack) = self.tpls.take() else {
            return;
        };
        while let Some(mut node) = stack.pop() {
            if let Some(children) = node.tpls.take() {
                stack.extend(children);
            }
        }
    }
}
