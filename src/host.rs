use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The host build system as seen from one loader invocation.
///
/// Implementations must accept registrations from concurrently running
/// builds.
pub trait BuildHost: Send + Sync {
    /// Records that the current output depends on the file at `path`.
    fn add_dependency(&self, path: &Path);

    /// Marks the current output as cacheable. No-op by default.
    fn cacheable(&self) {}
}

/// Concurrent dependency store shared by every build of a run, keyed by
/// the resource being built.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    deps: DashMap<String, Vec<PathBuf>>,
    cacheable: DashMap<String, bool>,
}

impl DependencyRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Host handle for one build of a resource. Whatever an earlier build
    /// of the same resource recorded is discarded.
    pub fn resource(self: &Arc<Self>, name: impl Into<String>) -> ResourceHost {
        let name = name.into();
        self.deps.insert(name.clone(), Vec::new());
        self.cacheable.remove(&name);
        ResourceHost {
            registry: Arc::clone(self),
            name,
            cacheable: AtomicBool::new(false),
        }
    }

    /// Dependencies of `resource` in the order they were reported.
    pub fn dependencies(&self, resource: &str) -> Vec<PathBuf> {
        self.deps
            .get(resource)
            .map(|v| v.value().clone())
            .unwrap_or_default()
    }

    pub fn is_cacheable(&self, resource: &str) -> bool {
        self.cacheable.get(resource).is_some_and(|v| *v.value())
    }

    /// Resources that depend on `path`; what a watcher rebuilds when it changes.
    pub fn dependents(&self, path: &Path) -> Vec<String> {
        let mut out: Vec<String> = self
            .deps
            .iter()
            .filter(|entry| entry.value().iter().any(|p| p == path))
            .map(|entry| entry.key().clone())
            .collect();
        out.sort();
        out
    }

    pub fn resources(&self) -> Vec<String> {
        let mut out: Vec<String> = self.deps.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }
}

/// [`BuildHost`] bound to a single resource of a [`DependencyRegistry`].
#[derive(Debug)]
pub struct ResourceHost {
    registry: Arc<DependencyRegistry>,
    name: String,
    cacheable: AtomicBool,
}

impl ResourceHost {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl BuildHost for ResourceHost {
    fn add_dependency(&self, path: &Path) {
        self.registry
            .deps
            .entry(self.name.clone())
            .or_default()
            .push(path.to_path_buf());
    }

    fn cacheable(&self) {
        if !self.cacheable.swap(true, Ordering::Relaxed) {
            self.registry.cacheable.insert(self.name.clone(), true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_keeps_order_and_duplicates() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("index.liquid");
        host.add_dependency(Path::new("/p/b.liquid"));
        host.add_dependency(Path::new("/p/a.liquid"));
        host.add_dependency(Path::new("/p/b.liquid"));

        assert_eq!(
            registry.dependencies("index.liquid"),
            vec![
                PathBuf::from("/p/b.liquid"),
                PathBuf::from("/p/a.liquid"),
                PathBuf::from("/p/b.liquid"),
            ]
        );
        assert!(registry.dependencies("other").is_empty());
    }

    #[test]
    fn test_dependents() {
        let registry = DependencyRegistry::new();
        registry
            .resource("b.liquid")
            .add_dependency(Path::new("header.liquid"));
        registry
            .resource("a.liquid")
            .add_dependency(Path::new("header.liquid"));
        registry.resource("c.liquid");

        assert_eq!(
            registry.dependents(Path::new("header.liquid")),
            vec!["a.liquid".to_string(), "b.liquid".to_string()]
        );
        assert_eq!(registry.resources().len(), 3);
    }

    #[test]
    fn test_cacheable() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        assert!(!registry.is_cacheable("page"));
        host.cacheable();
        assert!(registry.is_cacheable("page"));
    }

    #[test]
    fn test_rebuild_replaces_dependencies() {
        let registry = DependencyRegistry::new();
        let first = registry.resource("page");
        first.add_dependency(Path::new("old.liquid"));
        first.cacheable();

        let second = registry.resource("page");
        assert!(registry.dependencies("page").is_empty());
        assert!(!registry.is_cacheable("page"));
        second.add_dependency(Path::new("new.liquid"));
        assert_eq!(
            registry.dependencies("page"),
            vec![PathBuf::from("new.liquid")]
        );
        assert!(registry.dependents(Path::new("old.liquid")).is_empty());
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = DependencyRegistry::new();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let host = registry.resource(format!("page{}", i));
                std::thread::spawn(move || {
                    for j in 0..50 {
                        host.add_dependency(Path::new(&format!("dep{}", j)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        for i in 0..8 {
            assert_eq!(registry.dependencies(&format!("page{}", i)).len(), 50);
        }
    }
}
