use crate::error::CompileError;
use crate::tpl::expr::{self, Expr, ForSpec};
use crate::tpl::{Node, NodeKind};

enum TagFrame {
    If {
        line: usize,
        tag: &'static str,
        branches: Vec<Node>,
        test: Option<Expr>,
        negate: bool,
        branch_line: usize,
        seen_else: bool,
    },
    For {
        line: usize,
        spec: ForSpec,
    },
    Block {
        line: usize,
        name: String,
    },
    /// Runs to the end of the template.
    Layout {
        line: usize,
        file: String,
    },
}

impl TagFrame {
    fn tag(&self) -> &'static str {
        match self {
            TagFrame::If { tag, .. } => *tag,
            TagFrame::For { .. } => "for",
            TagFrame::Block { .. } => "block",
            TagFrame::Layout { .. } => "layout",
        }
    }

    fn end_tag(&self) -> Option<&'static str> {
        match self {
            TagFrame::If { tag: "unless", .. } => Some("endunless"),
            TagFrame::If { .. } => Some("endif"),
            TagFrame::For { .. } => Some("endfor"),
            TagFrame::Block { .. } => Some("endblock"),
            TagFrame::Layout { .. } => None,
        }
    }

    fn line(&self) -> usize {
        match self {
            TagFrame::If { line, .. }
            | TagFrame::For { line, .. }
            | TagFrame::Block { line, .. }
            | TagFrame::Layout { line, .. } => *line,
        }
    }
}

/// Compiles template source into its node tree.
pub fn parse_template(template: &str) -> Result<Vec<Node>, CompileError> {
    Parser {
        src: template,
        pos: 0,
        line_pos: 0,
        line: 1,
        nodes_stack: vec![Vec::new()],
        tag_stack: Vec::new(),
        trim_next: false,
    }
    .parse()
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    /// `line` is the line number of byte offset `line_pos`.
    line_pos: usize,
    line: usize,
    nodes_stack: Vec<Vec<Node>>,
    tag_stack: Vec<TagFrame>,
    trim_next: bool,
}

impl<'a> Parser<'a> {
    fn parse(mut self) -> Result<Vec<Node>, CompileError> {
        let src = self.src;
        while self.pos < src.len() {
            let remaining = &src[self.pos..];
            let start = match (remaining.find("{{"), remaining.find("{%")) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => {
                    let line = self.line_at(self.pos);
                    self.append_text(remaining, line);
                    break;
                }
            };
            if start > 0 {
                let line = self.line_at(self.pos);
                self.append_text(&remaining[..start], line);
            }
            self.pos += start;

            let line = self.line_at(self.pos);
            let rest = &src[self.pos..];
            if rest.starts_with("{{") {
                let end = find_close(rest, "}}").ok_or(CompileError::Unterminated {
                    line,
                    delimiter: "{{",
                })?;
                let (inner, trim_left, trim_right) = strip_dashes(&rest[2..end]);
                if trim_left {
                    self.trim_last_text();
                }
                let output = expr::parse_output(inner).map_err(syntax(line, "output"))?;
                self.append_node(Node::inert(NodeKind::Output(output), line));
                self.pos += end + 2;
                self.trim_next = trim_right;
            } else {
                let end = find_close(rest, "%}").ok_or(CompileError::Unterminated {
                    line,
                    delimiter: "{%",
                })?;
                let (inner, trim_left, trim_right) = strip_dashes(&rest[2..end]);
                if trim_left {
                    self.trim_last_text();
                }
                self.pos += end + 2;
                self.trim_next = trim_right;
                self.handle_tag(inner.trim(), line)?;
            }
        }
        self.finish()
    }

    fn handle_tag(&mut self, inner: &'a str, line: usize) -> Result<(), CompileError> {
        let (name, args) = match inner.find(char::is_whitespace) {
            Some(i) => (&inner[..i], inner[i..].trim()),
            None => (inner, ""),
        };

        match name {
            "" => return Err(syntax(line, "tag")("empty tag".to_string())),
            "if" | "unless" => {
                let test = expr::parse_condition(args).map_err(syntax(line, name))?;
                let unless = name == "unless";
                self.open(TagFrame::If {
                    line,
                    tag: if unless { "unless" } else { "if" },
                    branches: Vec::new(),
                    test: Some(test),
                    negate: unless,
                    branch_line: line,
                    seen_else: false,
                });
            }
            "elsif" | "else" => {
                if !matches!(
                    self.tag_stack.last(),
                    Some(TagFrame::If {
                        seen_else: false,
                        ..
                    })
                ) {
                    return Err(CompileError::UnexpectedTag {
                        line,
                        tag: name.to_string(),
                    });
                }
                let next_test = if name == "elsif" {
                    Some(expr::parse_condition(args).map_err(syntax(line, name))?)
                } else {
                    None
                };
                let body = self.nodes_stack.pop().unwrap_or_default();
                if let Some(TagFrame::If {
                    branches,
                    test,
                    negate,
                    branch_line,
                    seen_else,
                    ..
                }) = self.tag_stack.last_mut()
                {
                    branches.push(Node::container(
                        NodeKind::Branch {
                            test: test.take(),
                            negate: *negate,
                        },
                        *branch_line,
                        body,
                    ));
                    *test = next_test;
                    *negate = false;
                    *branch_line = line;
                    *seen_else = name == "else";
                }
                self.nodes_stack.push(Vec::new());
            }
            "for" => {
                let spec = expr::parse_for(args).map_err(syntax(line, name))?;
                self.open(TagFrame::For { line, spec });
            }
            "block" => {
                let block_name = strip_quotes(args);
                if block_name.contains(char::is_whitespace) {
                    return Err(syntax(line, name)(format!(
                        "invalid block name '{}'",
                        args
                    )));
                }
                self.open(TagFrame::Block {
                    line,
                    name: block_name.to_string(),
                });
            }
            "endif" | "endunless" | "endfor" | "endblock" => self.close(name, line)?,
            "include" => {
                let (file, include_args) =
                    expr::parse_file_ref(args).map_err(syntax(line, name))?;
                self.append_node(
                    Node::inert(NodeKind::Include { args: include_args }, line).with_file(file),
                );
            }
            "layout" => {
                if !self.tag_stack.is_empty() {
                    return Err(syntax(line, name)(
                        "layout must appear at the top level".to_string(),
                    ));
                }
                let (file, layout_args) = expr::parse_file_ref(args).map_err(syntax(line, name))?;
                if !layout_args.is_empty() {
                    return Err(syntax(line, name)("layout takes no arguments".to_string()));
                }
                self.open(TagFrame::Layout { line, file });
            }
            "assign" => {
                let (var, value) = expr::parse_assign(args).map_err(syntax(line, name))?;
                self.append_node(Node::inert(NodeKind::Assign { name: var, value }, line));
            }
            "raw" => {
                let (body, trim_left, trim_right) = self.take_until("endraw", line)?;
                let body = if trim_left { body.trim_end() } else { body };
                self.append_text(body, line);
                self.trim_next = trim_right;
            }
            "comment" => {
                let (_, _, trim_right) = self.take_until("endcomment", line)?;
                self.trim_next = trim_right;
            }
            "endraw" | "endcomment" => {
                return Err(CompileError::UnexpectedTag {
                    line,
                    tag: name.to_string(),
                });
            }
            _ => {
                return Err(CompileError::UnknownTag {
                    line,
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn open(&mut self, frame: TagFrame) {
        self.tag_stack.push(frame);
        self.nodes_stack.push(Vec::new());
    }

    fn close(&mut self, end: &str, line: usize) -> Result<(), CompileError> {
        let unexpected = || CompileError::UnexpectedTag {
            line,
            tag: end.to_string(),
        };
        if self.tag_stack.last().and_then(TagFrame::end_tag) != Some(end) {
            return Err(unexpected());
        }
        let frame = self.tag_stack.pop().ok_or_else(unexpected)?;
        let body = self.nodes_stack.pop().unwrap_or_default();
        let node = match frame {
            TagFrame::If {
                line,
                mut branches,
                test,
                negate,
                branch_line,
                ..
            } => {
                branches.push(Node::container(
                    NodeKind::Branch { test, negate },
                    branch_line,
                    body,
                ));
                Node::container(NodeKind::If, line, branches)
            }
            TagFrame::For { line, spec } => Node::container(NodeKind::For(spec), line, body),
            TagFrame::Block { line, name } => {
                Node::container(NodeKind::Block { name }, line, body)
            }
            TagFrame::Layout { .. } => return Err(unexpected()),
        };
        self.append_node(node);
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<Node>, CompileError> {
        while let Some(frame) = self.tag_stack.pop() {
            match frame {
                TagFrame::Layout { line, file } => {
                    let body = self.nodes_stack.pop().unwrap_or_default();
                    let layout = Node::container(NodeKind::Layout, line, body).with_file(file);
                    self.append_node(layout);
                }
                other => {
                    return Err(CompileError::Unclosed {
                        line: other.line(),
                        tag: other.tag().to_string(),
                    });
                }
            }
        }
        Ok(self.nodes_stack.pop().unwrap_or_default())
    }

    /// Consumes source up to `{% end %}`, returning the skipped text and
    /// the closing tag's whitespace-control flags.
    fn take_until(
        &mut self,
        end: &str,
        line: usize,
    ) -> Result<(&'a str, bool, bool), CompileError> {
        let src = self.src;
        let mut search = self.pos;
        loop {
            let Some(rel) = src[search..].find("{%") else {
                return Err(CompileError::Unclosed {
                    line,
                    tag: end.trim_start_matches("end").to_string(),
                });
            };
            let tag_start = search + rel;
            let Some(close) = src[tag_start..].find("%}") else {
                return Err(CompileError::Unterminated {
                    line: self.line_at(tag_start),
                    delimiter: "{%",
                });
            };
            let (inner, trim_left, trim_right) =
                strip_dashes(&src[tag_start + 2..tag_start + close]);
            if inner.trim() == end {
                let body = &src[self.pos..tag_start];
                self.pos = tag_start + close + 2;
                return Ok((body, trim_left, trim_right));
            }
            search = tag_start + 2;
        }
    }

    fn append_node(&mut self, node: Node) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            nodes.push(node);
        }
    }

    fn append_text(&mut self, text: &str, line: usize) {
        let text = if std::mem::take(&mut self.trim_next) {
            text.trim_start()
        } else {
            text
        };
        if text.is_empty() {
            return;
        }
        let Some(nodes) = self.nodes_stack.last_mut() else {
            return;
        };
        if let Some(Node {
            kind: NodeKind::Text(last_text),
            ..
        }) = nodes.last_mut()
        {
            last_text.push_str(text);
        } else {
            nodes.push(Node::text(text, line));
        }
    }

    fn trim_last_text(&mut self) {
        let Some(nodes) = self.nodes_stack.last_mut() else {
            return;
        };
        if let Some(Node {
            kind: NodeKind::Text(text),
            ..
        }) = nodes.last_mut()
        {
            let trimmed_len = text.trim_end().len();
            text.truncate(trimmed_len);
            if text.is_empty() {
                nodes.pop();
            }
        }
    }

    /// Line of byte offset `pos`, counted from the last offset asked for.
    fn line_at(&mut self, pos: usize) -> usize {
        if pos >= self.line_pos {
            self.line += self.src[self.line_pos..pos].matches('\n').count();
        } else {
            self.line -= self.src[pos..self.line_pos].matches('\n').count();
        }
        self.line_pos = pos;
        self.line
    }
}

fn syntax(line: usize, tag: &str) -> impl Fn(String) -> CompileError + '_ {
    move |message| CompileError::Syntax {
        line,
        tag: tag.to_string(),
        message,
    }
}

/// Offset of the first `delim` in `tag` that is outside a string literal.
/// `tag` starts with the opening delimiter.
fn find_close(tag: &str, delim: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in tag.char_indices().skip(2) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if tag[i..].starts_with(delim) => return Some(i),
            None => {}
        }
    }
    None
}

/// Splits `{%- ... -%}` whitespace-control markers off a tag body.
fn strip_dashes(inner: &str) -> (&str, bool, bool) {
    let trim_left = inner.starts_with('-');
    let inner = if trim_left { &inner[1..] } else { inner };
    let trim_right = inner.ends_with('-');
    let inner = if trim_right {
        &inner[..inner.len() - 1]
    } else {
        inner
    };
    (inner, trim_left, trim_right)
}

fn strip_quotes(s: &str) -> &str {
    crate::resolve::strip_quotes(s)
}
