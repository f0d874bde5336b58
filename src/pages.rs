//! Builds every page of a directory concurrently against one shared
//! dependency registry.

use crate::host::DependencyRegistry;
use crate::loader;
use crate::models::options::LoaderOptions;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub struct PageOutput {
    /// Resource name the page's dependencies are registered under.
    pub name: String,
    pub path: PathBuf,
    pub result: Result<String>,
}

pub struct BuildReport {
    pub pages: Vec<PageOutput>,
    pub registry: Arc<DependencyRegistry>,
}

impl BuildReport {
    pub fn failures(&self) -> impl Iterator<Item = &PageOutput> {
        self.pages.iter().filter(|p| p.result.is_err())
    }

    /// Writes each successfully built page to `<out_dir>/<stem>.html`.
    pub async fn write_pages(&self, out_dir: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("failed to create {}", out_dir.display()))?;
        let mut written = 0;
        for page in &self.pages {
            let Ok(html) = &page.result else {
                continue;
            };
            let stem = page
                .path
                .file_stem()
                .with_context(|| format!("page has no file name: {}", page.path.display()))?;
            let target = out_dir.join(stem).with_extension("html");
            tokio::fs::write(&target, html)
                .await
                .with_context(|| format!("failed to write {}", target.display()))?;
            debug!("wrote {}", target.display());
            written += 1;
        }
        Ok(written)
    }
}

/// Files directly inside `dir` ending in `extname`, sorted.
pub fn discover_pages(dir: &Path, extname: &str) -> Result<Vec<PathBuf>> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(extname));
        if entry.file_type().is_file() && matches {
            pages.push(path.to_path_buf());
        }
    }
    pages.sort();
    Ok(pages)
}

/// Compiles and renders every page under `dir`. A failing page is
/// reported in its [`PageOutput`] and does not stop the others.
pub async fn build_pages(dir: &Path, options: Arc<LoaderOptions>) -> Result<BuildReport> {
    let registry = DependencyRegistry::new();
    let paths = discover_pages(dir, &options.extname)?;
    info!("building {} pages from {}", paths.len(), dir.display());

    let mut tasks = JoinSet::new();
    for path in paths {
        let options = options.clone();
        let host = registry.resource(path.display().to_string());
        tasks.spawn(async move {
            let result = match tokio::fs::read_to_string(&path).await {
                Ok(source) => loader::load(&source, &options, &host)
                    .await
                    .map_err(anyhow::Error::from),
                Err(e) => Err(anyhow::Error::from(e)
                    .context(format!("failed to read page {}", path.display()))),
            };
            PageOutput {
                name: host.name().to_string(),
                path,
                result,
            }
        });
    }

    let mut pages = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let page = joined.context("page build task panicked")?;
        if let Err(e) = &page.result {
            warn!("{}: {:#}", page.name, e);
        }
        pages.push(page);
    }
    pages.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(BuildReport { pages, registry })
}
