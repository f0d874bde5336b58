use crate::error::RenderError;
use crate::models::options::LoaderOptions;
use crate::resolve;
use crate::tpl::cache::PartialCache;
use crate::tpl::expr::{self, CmpOp, Expr, ForSpec, Output, Segment};
use crate::tpl::filters;
use crate::tpl::render_context::{BlockMode, Context};
use crate::tpl::{FileRef, Node, NodeKind};
use crate::value::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

type RenderFuture<'a> = Pin<Box<dyn Future<Output = Result<(), RenderError>> + Send + 'a>>;

const MAX_RANGE_LEN: i64 = 1_000_000;

pub(crate) struct Renderer<'o> {
    options: &'o LoaderOptions,
    cache: PartialCache,
}

impl<'o> Renderer<'o> {
    pub(crate) fn new(options: &'o LoaderOptions) -> Self {
        Self {
            options,
            cache: PartialCache::default(),
        }
    }

    /// Boxed so includes can recurse.
    pub(crate) fn render_nodes<'a, 'c: 'a>(
        &'a self,
        nodes: &'a [Node],
        ctx: &'a mut Context<'c>,
        out: &'a mut String,
    ) -> RenderFuture<'a> {
        Box::pin(async move {
            for node in nodes {
                self.render_node(node, ctx, out).await?;
            }
            Ok(())
        })
    }

    async fn render_node(
        &self,
        node: &Node,
        ctx: &mut Context<'_>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Output(output) => {
                let value = self.eval_output(output, ctx)?;
                out.push_str(&value.to_string());
            }
            NodeKind::Assign { name, value } => {
                let value = self.eval_output(value, ctx)?;
                ctx.assign(name, value);
            }
            NodeKind::Include { args } => {
                let Some(file) = &node.file else {
                    return Ok(());
                };
                let path = self.include_path(file, ctx)?;
                let tpls = self.load(&path).await?;
                let mut scope = BTreeMap::new();
                for (key, arg) in args {
                    scope.insert(key.clone(), self.eval(arg, ctx)?);
                }
                self.enter(ctx, &path)?;
                ctx.push(scope);
                let result = self.render_nodes(&tpls, ctx, out).await;
                ctx.pop();
                ctx.depth -= 1;
                result?;
            }
            NodeKind::Layout => {
                let Some(file) = &node.file else {
                    return Ok(());
                };
                let path = self.include_path(file, ctx)?;
                let layout = self.load(&path).await?;

                let saved = ctx.block_mode;
                ctx.block_mode = BlockMode::Store;
                let mut body = String::new();
                if let Some(tpls) = &node.tpls {
                    self.render_nodes(tpls, ctx, &mut body).await?;
                }
                // content outside any block fills the anonymous block
                ctx.blocks.entry(String::new()).or_insert(body);

                ctx.block_mode = BlockMode::Output;
                self.enter(ctx, &path)?;
                let result = self.render_nodes(&layout, ctx, out).await;
                ctx.depth -= 1;
                ctx.block_mode = saved;
                result?;
            }
            NodeKind::Block { name } => {
                let child = ctx.blocks.get(name).cloned();
                let html = match child {
                    Some(child) => child,
                    None => {
                        // nested blocks render inline into this one
                        let saved = ctx.block_mode;
                        ctx.block_mode = BlockMode::Output;
                        let mut buf = String::new();
                        let result = match &node.tpls {
                            Some(tpls) => self.render_nodes(tpls, ctx, &mut buf).await,
                            None => Ok(()),
                        };
                        ctx.block_mode = saved;
                        result?;
                        buf
                    }
                };
                match ctx.block_mode {
                    BlockMode::Store => {
                        ctx.blocks.insert(name.clone(), html);
                    }
                    BlockMode::Output => out.push_str(&html),
                }
            }
            NodeKind::If => {
                for branch in node.tpls.iter().flatten() {
                    let NodeKind::Branch { test, negate } = &branch.kind else {
                        continue;
                    };
                    let taken = match test {
                        None => true,
                        Some(test) => self.eval(test, ctx)?.is_truthy() != *negate,
                    };
                    if taken {
                        if let Some(tpls) = &branch.tpls {
                            self.render_nodes(tpls, ctx, out).await?;
                        }
                        break;
                    }
                }
            }
            NodeKind::Branch { .. } => {
                if let Some(tpls) = &node.tpls {
                    self.render_nodes(tpls, ctx, out).await?;
                }
            }
            NodeKind::For(spec) => {
                let items = self.for_items(spec, ctx)?;
                let length = items.len();
                for (index, item) in items.into_iter().enumerate() {
                    let mut scope = BTreeMap::new();
                    scope.insert(spec.variable.clone(), item);
                    scope.insert("forloop".to_string(), forloop(index, length));
                    ctx.push(scope);
                    let result = match &node.tpls {
                        Some(tpls) => self.render_nodes(tpls, ctx, out).await,
                        None => Ok(()),
                    };
                    ctx.pop();
                    result?;
                }
            }
        }
        Ok(())
    }

    fn enter(&self, ctx: &mut Context<'_>, path: &Path) -> Result<(), RenderError> {
        if ctx.depth >= self.options.max_include_depth {
            return Err(RenderError::IncludeDepth(
                self.options.max_include_depth,
                path.to_path_buf(),
            ));
        }
        ctx.depth += 1;
        Ok(())
    }

    /// Quoted references are literal; bare ones name a variable holding
    /// the partial name.
    fn include_path(&self, file: &FileRef, ctx: &Context<'_>) -> Result<PathBuf, RenderError> {
        let raw = file.input.trim();
        let (root, extname) = (&self.options.root, &self.options.extname);
        if raw.starts_with(['\'', '"']) {
            return Ok(resolve::resolve(raw, root, extname));
        }
        let name_expr =
            expr::parse_path(raw).map_err(|_| RenderError::InvalidInclude(format!("'{}'", raw)))?;
        match self.eval(&name_expr, ctx)? {
            Value::Str(name) => Ok(resolve::join(root, &name, extname)),
            other => Err(RenderError::InvalidInclude(other.type_name().to_string())),
        }
    }

    async fn load(&self, path: &Path) -> Result<Arc<Vec<Node>>, RenderError> {
        if let Some(ast) = self.cache.get(path) {
            return Ok(ast);
        }
        let content = self
            .options
            .source
            .read(path)
            .await
            .map_err(|source| RenderError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        self.cache
            .insert(path, &content)
            .map_err(|source| RenderError::Partial {
                path: path.to_path_buf(),
                source,
            })
    }

    fn for_items(&self, spec: &ForSpec, ctx: &Context<'_>) -> Result<Vec<Value>, RenderError> {
        let mut items = match self.eval(&spec.collection, ctx)? {
            Value::List(items) => items,
            Value::Map(m) => m
                .into_iter()
                .map(|(k, v)| Value::List(vec![Value::Str(k), v]))
                .collect(),
            Value::Str(s) if !s.is_empty() => vec![Value::Str(s)],
            _ => Vec::new(),
        };
        if let Some(offset) = &spec.offset {
            let offset = self.eval_index("offset", offset, ctx)?;
            items = items.into_iter().skip(offset).collect();
        }
        if let Some(limit) = &spec.limit {
            let limit = self.eval_index("limit", limit, ctx)?;
            items.truncate(limit);
        }
        if spec.reversed {
            items.reverse();
        }
        Ok(items)
    }

    fn eval_index(&self, what: &str, e: &Expr, ctx: &Context<'_>) -> Result<usize, RenderError> {
        match self.eval(e, ctx)? {
            Value::Int(n) => Ok(usize::try_from(n).unwrap_or(0)),
            other => Err(RenderError::Type(format!(
                "for {}: expected an integer, got {}",
                what,
                other.type_name()
            ))),
        }
    }

    fn eval_output(&self, output: &Output, ctx: &Context<'_>) -> Result<Value, RenderError> {
        let mut value = self.eval(&output.expr, ctx)?;
        for filter in &output.filters {
            let args = filter
                .args
                .iter()
                .map(|arg| self.eval(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            value = filters::apply(&filter.name, value, &args, self.options.strict_filters)?;
        }
        Ok(value)
    }

    fn eval(&self, e: &Expr, ctx: &Context<'_>) -> Result<Value, RenderError> {
        match e {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Path { root, segments } => match self.lookup(root, segments, ctx)? {
                Some(v) => Ok(v),
                None if self.options.strict_variables => {
                    Err(RenderError::UndefinedVariable(e.to_string()))
                }
                None => Ok(Value::Nil),
            },
            Expr::Range(start, end) => {
                let (start, end) = match (self.eval(start, ctx)?, self.eval(end, ctx)?) {
                    (Value::Int(a), Value::Int(b)) => (a, b),
                    (a, b) => {
                        return Err(RenderError::Type(format!(
                            "range bounds must be integers, got {} and {}",
                            a.type_name(),
                            b.type_name()
                        )));
                    }
                };
                if end.saturating_sub(start) > MAX_RANGE_LEN {
                    return Err(RenderError::Type(format!(
                        "range ({}..{}) is too large",
                        start, end
                    )));
                }
                Ok(Value::List((start..=end).map(Value::Int).collect()))
            }
            Expr::Compare { op, left, right } => {
                let (left, right) = (self.eval(left, ctx)?, self.eval(right, ctx)?);
                Ok(Value::Bool(compare(*op, &left, &right)))
            }
            Expr::And(a, b) => Ok(Value::Bool(
                self.eval(a, ctx)?.is_truthy() && self.eval(b, ctx)?.is_truthy(),
            )),
            Expr::Or(a, b) => Ok(Value::Bool(
                self.eval(a, ctx)?.is_truthy() || self.eval(b, ctx)?.is_truthy(),
            )),
        }
    }

    fn lookup(
        &self,
        root: &str,
        segments: &[Segment],
        ctx: &Context<'_>,
    ) -> Result<Option<Value>, RenderError> {
        let Some(start) = ctx.get_from_scope(root) else {
            return Ok(None);
        };
        let mut current = Cow::Borrowed(start);
        for segment in segments {
            let key = match segment {
                Segment::Key(k) => Value::Str(k.clone()),
                Segment::Index(e) => self.eval(e, ctx)?,
            };
            current = match current {
                Cow::Borrowed(v) => match step(v, &key) {
                    Some(next) => next,
                    None => return Ok(None),
                },
                Cow::Owned(v) => match step(&v, &key) {
                    Some(next) => Cow::Owned(next.into_owned()),
                    None => return Ok(None),
                },
            };
        }
        Ok(Some(current.into_owned()))
    }
}

fn step<'v>(value: &'v Value, key: &Value) -> Option<Cow<'v, Value>> {
    if let Some(v) = value.get(key) {
        return Some(Cow::Borrowed(v));
    }
    match key {
        Value::Str(name) => value.property(name).map(Cow::Owned),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Incomparable operands compare false rather than failing.
fn compare(op: CmpOp, left: &Value, right: &Value) -> bool {
    use std::cmp::Ordering;

    let ordering = || match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };
    match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt => ordering() == Some(Ordering::Less),
        CmpOp::Gt => ordering() == Some(Ordering::Greater),
        CmpOp::Le => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Ge => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::Contains => match left {
            Value::Str(s) => s.contains(&right.to_string()),
            Value::List(items) => items.iter().any(|item| values_equal(item, right)),
            Value::Map(m) => m.contains_key(&right.to_string()),
            _ => false,
        },
    }
}

fn forloop(index: usize, length: usize) -> Value {
    let mut map = BTreeMap::new();
    map.insert("index".to_string(), Value::Int(index as i64 + 1));
    map.insert("index0".to_string(), Value::Int(index as i64));
    map.insert("rindex".to_string(), Value::Int((length - index) as i64));
    map.insert("rindex0".to_string(), Value::Int((length - index - 1) as i64));
    map.insert("first".to_string(), Value::Bool(index == 0));
    map.insert("last".to_string(), Value::Bool(index + 1 == length));
    map.insert("length".to_string(), Value::Int(length as i64));
    Value::Map(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare() {
        assert!(compare(CmpOp::Eq, &Value::Int(1), &Value::Float(1.0)));
        assert!(compare(CmpOp::Ne, &Value::from("a"), &Value::Int(1)));
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Int(2)));
        assert!(compare(CmpOp::Ge, &Value::from("b"), &Value::from("a")));
        assert!(!compare(CmpOp::Lt, &Value::from("1"), &Value::Int(2)));
        assert!(compare(
            CmpOp::Contains,
            &Value::List(vec![Value::Int(1), Value::Int(2)]),
            &Value::Int(2)
        ));
        assert!(compare(CmpOp::Contains, &Value::from("liquid"), &Value::from("qui")));
        assert!(!compare(CmpOp::Contains, &Value::Nil, &Value::from("x")));
    }

    #[test]
    fn test_forloop() {
        let Value::Map(m) = forloop(0, 2) else {
            panic!("Expected Map");
        };
        assert_eq!(m["index"], Value::Int(1));
        assert_eq!(m["first"], Value::Bool(true));
        assert_eq!(m["last"], Value::Bool(false));
        assert_eq!(m["rindex0"], Value::Int(1));
    }
}
