use crate::error::CompileError;
use crate::tpl::Node;
use crate::tpl::parser::parse_template;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Parsed partials of one render invocation, so a partial included in a
/// loop is read and compiled once. Not shared between builds.
#[derive(Default)]
pub(crate) struct PartialCache {
    templates: DashMap<PathBuf, Arc<Vec<Node>>>,
}

impl PartialCache {
    pub(crate) fn get(&self, path: &Path) -> Option<Arc<Vec<Node>>> {
        self.templates.get(path).map(|v| v.value().clone())
    }

    pub(crate) fn insert(
        &self,
        path: &Path,
        content: &str,
    ) -> Result<Arc<Vec<Node>>, CompileError> {
        let ast = Arc::new(parse_template(content)?);
        self.templates.insert(path.to_path_buf(), ast.clone());
        Ok(ast)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.templates.len()
    }
}
