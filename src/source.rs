use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Where include and layout files are read from during render.
#[async_trait]
pub trait TemplateSource: Send + Sync + fmt::Debug {
    async fn read(&self, path: &Path) -> io::Result<String>;
}

/// Reads templates from the filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSource;

#[async_trait]
impl TemplateSource for FsSource {
    async fn read(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }
}

/// In-memory templates keyed by their resolved path.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: DashMap<PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a source from `(path, contents)` pairs, e.g. the output of
    /// `embed_templates!`.
    pub fn from_assets(assets: &[(&str, &str)]) -> Self {
        let source = Self::new();
        for (path, content) in assets {
            source.insert(*path, *content);
        }
        source
    }

    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl TemplateSource for MemorySource {
    async fn read(&self, path: &Path) -> io::Result<String> {
        self.files
            .get(path)
            .map(|v| v.value().clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no template at {}", path.display()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_source() {
        let source = MemorySource::from_assets(&[("partials/a.liquid", "A")]);
        assert_eq!(source.len(), 1);
        let content = source.read(Path::new("partials/a.liquid")).await.unwrap();
        assert_eq!(content, "A");

        let err = source.read(Path::new("missing.liquid")).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_fs_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.liquid");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(FsSource.read(&path).await.unwrap(), "hello");
        assert!(FsSource.read(&dir.path().join("nope")).await.is_err());
    }
}
