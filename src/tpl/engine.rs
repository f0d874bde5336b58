use crate::error::{CompileError, RenderError};
use crate::models::options::LoaderOptions;
use crate::tpl::Node;
use crate::tpl::parser::parse_template;
use crate::tpl::render::Renderer;
use crate::tpl::render_context::Context;
use crate::value::Value;

/// Compiles template source into a node tree.
pub fn compile(source: &str) -> Result<Vec<Node>, CompileError> {
    parse_template(source)
}

/// Renders a compiled template against `data`, reading includes and
/// layouts through `options.source`.
pub async fn render_template(
    tpls: &[Node],
    data: &Value,
    options: &LoaderOptions,
) -> Result<String, RenderError> {
    let renderer = Renderer::new(options);
    let mut ctx = Context::new(data);
    let mut out = String::new();
    renderer.render_nodes(tpls, &mut ctx, &mut out).await?;
    Ok(out)
}
