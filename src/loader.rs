//! Boundary between the host build system and the template pipeline.

use crate::error::{CompileError, LoaderError, RenderError};
use crate::host::BuildHost;
use crate::models::options::LoaderOptions;
use crate::tpl::Node;
use crate::tpl::engine;
use crate::value::Value;
use crate::walker;
use std::time::Instant;
use tracing::debug;

/// A template compiled for one build, ready to render.
#[derive(Debug)]
pub struct CompiledTemplate<'o> {
    tpls: Vec<Node>,
    options: &'o LoaderOptions,
}

impl<'o> CompiledTemplate<'o> {
    /// Renders against the configured data context.
    pub async fn render(&self) -> Result<String, RenderError> {
        self.render_with(&self.options.data).await
    }

    pub async fn render_with(&self, data: &Value) -> Result<String, RenderError> {
        let start = Instant::now();
        let result = engine::render_template(&self.tpls, data, self.options).await;
        let elapsed_ms = start.elapsed().as_millis();
        let bytes = result.as_ref().ok().map(String::len);
        let err = result.as_ref().err().map(|e| e.to_string());
        debug!("render: elapsed_ms={}, bytes={:?}, error={:?}", elapsed_ms, bytes, err);
        result
    }
}

/// Synchronous phase: marks the output cacheable, compiles, and in dev
/// mode registers every dependency with the host before any rendering.
pub fn compile_and_track<'o>(
    source: &str,
    options: &'o LoaderOptions,
    host: &dyn BuildHost,
) -> Result<CompiledTemplate<'o>, CompileError> {
    host.cacheable();

    let start = Instant::now();
    let tpls = engine::compile(source)?;
    let registered = walker::track_dependencies(&tpls, options, host);
    debug!(
        "compile: elapsed_ms={}, nodes={}, dev={}, dependencies={}",
        start.elapsed().as_millis(),
        tpls.len(),
        options.dev,
        registered
    );

    Ok(CompiledTemplate { tpls, options })
}

/// Runs the whole pipeline: compile, track dependencies, render.
pub async fn load(
    source: &str,
    options: &LoaderOptions,
    host: &dyn BuildHost,
) -> Result<String, LoaderError> {
    let compiled = compile_and_track(source, options, host)?;
    Ok(compiled.render().await?)
}

/// Callback form of [`load`]. A compile error is returned directly and
/// `done` is not called; otherwise `done` receives the render result.
/// Taking `done` by value means it runs at most once, and every path
/// past compilation reaches it.
pub async fn load_with_callback<F>(
    source: &str,
    options: &LoaderOptions,
    host: &dyn BuildHost,
    done: F,
) -> Result<(), CompileError>
where
    F: FnOnce(Result<String, RenderError>),
{
    let compiled = compile_and_track(source, options, host)?;
    done(compiled.render().await);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DependencyRegistry;
    use crate::source::MemorySource;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn options(dev: bool) -> LoaderOptions {
        LoaderOptions::new()
            .root("/r/")
            .extname(".tpl")
            .dev(dev)
            .source(Arc::new(MemorySource::from_assets(&[(
                "/r/partial.tpl",
                "P",
            )])))
    }

    #[tokio::test]
    async fn test_load_registers_then_renders() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let out = load("A{% include 'partial' %}", &options(true), &host)
            .await
            .unwrap();
        assert_eq!(out, "AP");
        assert_eq!(
            registry.dependencies("page"),
            vec![PathBuf::from("/r/partial.tpl")]
        );
        assert!(registry.is_cacheable("page"));
    }

    #[tokio::test]
    async fn test_no_registration_outside_dev_mode() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let out = load("A{% include 'partial' %}", &options(false), &host)
            .await
            .unwrap();
        assert_eq!(out, "AP");
        assert!(registry.dependencies("page").is_empty());
    }

    #[tokio::test]
    async fn test_compile_error_registers_nothing() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let err = load("{% include 'partial' %}{% if %}", &options(true), &host)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Compile(_)));
        assert!(registry.dependencies("page").is_empty());
    }

    #[tokio::test]
    async fn test_dependencies_survive_render_failure() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let err = load("{% include 'missing' %}", &options(true), &host)
            .await
            .unwrap_err();
        assert!(matches!(err, LoaderError::Render(RenderError::Read { .. })));
        assert_eq!(
            registry.dependencies("page"),
            vec![PathBuf::from("/r/missing.tpl")]
        );
    }

    #[tokio::test]
    async fn test_callback_fires_once_with_output() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let mut calls = Vec::new();
        load_with_callback("x{{ 1 | plus: 1 }}", &options(true), &host, |r| {
            calls.push(r)
        })
        .await
        .unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].as_ref().unwrap(), "x2");
    }

    #[tokio::test]
    async fn test_callback_fires_once_with_error() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let strict = options(true).strict_variables(true);
        let mut calls = Vec::new();
        load_with_callback("{% include 'partial' %}{{ nope }}", &strict, &host, |r| {
            calls.push(r)
        })
        .await
        .unwrap();
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], Err(RenderError::UndefinedVariable(_))));
        assert_eq!(registry.dependencies("page").len(), 1);
    }

    #[test]
    fn test_deeply_nested_page_compiles_and_drops() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let depth = 100_000;
        let source = format!(
            "{}{{% include 'partial' %}}{}",
            "{% block b %}".repeat(depth),
            "{% endblock %}".repeat(depth)
        );
        let options = options(true);
        let compiled = compile_and_track(&source, &options, &host).unwrap();
        drop(compiled);
        assert_eq!(
            registry.dependencies("page"),
            vec![PathBuf::from("/r/partial.tpl")]
        );
    }

    #[tokio::test]
    async fn test_callback_not_called_on_compile_error() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let mut calls = 0;
        let result = load_with_callback("{{", &options(true), &host, |_| calls += 1).await;
        assert!(result.is_err());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_render_with_other_data() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let opts = options(false);
        let compiled = compile_and_track("{{ who }}", &opts, &host).unwrap();
        let data = crate::value::to_value(&serde_json::json!({"who": "you"})).unwrap();
        assert_eq!(compiled.render_with(&data).await.unwrap(), "you");
        assert_eq!(compiled.render().await.unwrap(), "");
    }
}
