use crate::source::{FsSource, TemplateSource};
use crate::value::{Value, to_value};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::sync::Arc;

pub const DEFAULT_EXTNAME: &str = ".liquid";
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 64;

/// Per-build engine configuration. Immutable once a build starts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderOptions {
    /// Prefix prepended verbatim to every include name.
    pub root: String,
    /// Extension appended verbatim to every include name.
    pub extname: String,
    /// Enables dependency discovery for watch builds.
    pub dev: bool,
    #[serde(deserialize_with = "deserialize_data")]
    pub data: Value,
    pub strict_variables: bool,
    pub strict_filters: bool,
    pub max_include_depth: usize,
    #[serde(skip, default = "default_source")]
    pub source: Arc<dyn TemplateSource>,
}

fn default_source() -> Arc<dyn TemplateSource> {
    Arc::new(FsSource)
}

fn deserialize_data<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    let json = serde_json::Value::deserialize(deserializer)?;
    to_value(&json).map_err(serde::de::Error::custom)
}

impl Default for LoaderOptions {
    fn default() -> Self {
        LoaderOptions {
            root: String::new(),
            extname: DEFAULT_EXTNAME.to_string(),
            dev: false,
            data: Value::empty_map(),
            strict_variables: false,
            strict_filters: false,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            source: default_source(),
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON object such as
    /// `{"root": "src/pages/partials/", "dev": true, "data": {...}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json).context("invalid loader options")?;
        options.check_data()?;
        Ok(options)
    }

    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn extname(mut self, extname: impl Into<String>) -> Self {
        self.extname = extname.into();
        self
    }

    pub fn dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    /// Sets the data context from any serializable value.
    pub fn data<T: serde::Serialize>(mut self, data: &T) -> Result<Self> {
        self.data = to_value(data).context("data context is not representable")?;
        self.check_data()?;
        Ok(self)
    }

    /// Reads the data context from a JSON file.
    pub fn data_file(mut self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read data file: {}", path.display()))?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in data file: {}", path.display()))?;
        self.data = to_value(&json).context("data context is not representable")?;
        self.check_data()?;
        Ok(self)
    }

    pub fn strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    pub fn strict_filters(mut self, strict: bool) -> Self {
        self.strict_filters = strict;
        self
    }

    pub fn max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn source(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.source = source;
        self
    }

    fn check_data(&self) -> Result<()> {
        match &self.data {
            Value::Map(_) | Value::Nil => Ok(()),
            other => anyhow::bail!(
                "data context must be an object, got {}",
                other.type_name()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = LoaderOptions::new();
        assert_eq!(options.root, "");
        assert_eq!(options.extname, ".liquid");
        assert!(!options.dev);
        assert_eq!(options.data, Value::empty_map());
        assert_eq!(options.max_include_depth, DEFAULT_MAX_INCLUDE_DEPTH);
    }

    #[test]
    fn test_from_json() {
        let options = LoaderOptions::from_json(
            r#"{"root": "/r/", "dev": true, "strictVariables": true, "data": {"title": "Hi"}}"#,
        )
        .unwrap();
        assert_eq!(options.root, "/r/");
        assert_eq!(options.extname, ".liquid");
        assert!(options.dev);
        assert!(options.strict_variables);
        assert_eq!(
            options.data.get(&Value::from("title")),
            Some(&Value::from("Hi"))
        );
    }

    #[test]
    fn test_data_must_be_object() {
        assert!(LoaderOptions::new().data(&vec![1, 2]).is_err());
        assert!(LoaderOptions::new().data(&serde_json::json!({"a": 1})).is_ok());
        assert!(LoaderOptions::from_json(r#"{"data": [1, 2]}"#).is_err());
        assert!(LoaderOptions::from_json(r#"{"data": "text"}"#).is_err());
    }
}
