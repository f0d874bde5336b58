//! Dev-mode dependency discovery over a compiled node tree.

use crate::host::BuildHost;
use crate::models::options::LoaderOptions;
use crate::resolve::resolve;
use crate::tpl::Node;
use std::path::PathBuf;
use tracing::trace;

/// Reports the resolved path of every node carrying a `file`, depth-first
/// and pre-order: a node before its `tpls`, children before the next
/// sibling. Duplicates are reported as often as they occur.
///
/// Uses an explicit stack, so nesting depth is bounded only by memory.
pub fn walk_dependencies(
    tpls: &[Node],
    options: &LoaderOptions,
    mut report: impl FnMut(PathBuf),
) {
    let mut stack = vec![tpls.iter()];
    while let Some(siblings) = stack.last_mut() {
        let Some(node) = siblings.next() else {
            stack.pop();
            continue;
        };
        if let Some(file) = &node.file {
            report(resolve(&file.input, &options.root, &options.extname));
        }
        if let Some(children) = &node.tpls {
            stack.push(children.iter());
        }
    }
}

/// Collects what [`walk_dependencies`] reports.
pub fn dependencies(tpls: &[Node], options: &LoaderOptions) -> Vec<PathBuf> {
    let mut out = Vec::new();
    walk_dependencies(tpls, options, |path| out.push(path));
    out
}

/// Registers every dependency with the host as it is found. Does nothing
/// outside dev mode. Returns the number of registrations.
pub fn track_dependencies(
    tpls: &[Node],
    options: &LoaderOptions,
    host: &dyn BuildHost,
) -> usize {
    if !options.dev {
        return 0;
    }
    let mut count = 0;
    walk_dependencies(tpls, options, |path| {
        trace!("dependency: {}", path.display());
        host.add_dependency(&path);
        count += 1;
    });
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::DependencyRegistry;
    use crate::tpl::{Node, NodeKind};

    fn options() -> LoaderOptions {
        LoaderOptions::new().root("/r/").extname(".tpl").dev(true)
    }

    fn container(children: Vec<Node>) -> Node {
        Node::container(NodeKind::Block { name: String::new() }, 1, children)
    }

    #[test]
    fn test_container_children_in_order() {
        let tpls = vec![container(vec![
            Node::include("\"x\"", 1),
            Node::include("\"y\"", 1),
        ])];
        assert_eq!(
            dependencies(&tpls, &options()),
            vec![PathBuf::from("/r/x.tpl"), PathBuf::from("/r/y.tpl")]
        );
    }

    #[test]
    fn test_parent_before_children_before_sibling() {
        let parent = Node::container(
            NodeKind::Layout,
            1,
            vec![Node::include("'child'", 1), container(vec![Node::include("'deep'", 1)])],
        )
        .with_file("'parent'");
        let tpls = vec![parent, Node::text("t", 1), Node::include("'sibling'", 1)];

        assert_eq!(
            dependencies(&tpls, &options()),
            vec![
                PathBuf::from("/r/parent.tpl"),
                PathBuf::from("/r/child.tpl"),
                PathBuf::from("/r/deep.tpl"),
                PathBuf::from("/r/sibling.tpl"),
            ]
        );
    }

    #[test]
    fn test_duplicates_are_kept() {
        let tpls = vec![Node::include("'a'", 1), Node::include("'a'", 2)];
        assert_eq!(dependencies(&tpls, &options()).len(), 2);
    }

    #[test]
    fn test_inert_nodes_yield_nothing() {
        let tpls = vec![Node::text("plain", 1), container(vec![])];
        assert!(dependencies(&tpls, &options()).is_empty());
        assert!(dependencies(&[], &options()).is_empty());
    }

    #[test]
    fn test_deep_nesting() {
        let mut node = Node::include("'leaf'", 1);
        for _ in 0..100_000 {
            node = container(vec![node]);
        }
        let tpls = vec![node];
        assert_eq!(
            dependencies(&tpls, &options()),
            vec![PathBuf::from("/r/leaf.tpl")]
        );
        drop(tpls);
    }

    #[test]
    fn test_track_skipped_outside_dev_mode() {
        let registry = DependencyRegistry::new();
        let host = registry.resource("page");
        let tpls = vec![Node::include("'a'", 1), container(vec![Node::include("'b'", 1)])];

        let count = track_dependencies(&tpls, &options().dev(false), &host);
        assert_eq!(count, 0);
        assert!(registry.dependencies("page").is_empty());

        let count = track_dependencies(&tpls, &options(), &host);
        assert_eq!(count, 2);
        assert_eq!(
            registry.dependencies("page"),
            vec![PathBuf::from("/r/a.tpl"), PathBuf::from("/r/b.tpl")]
        );
    }
}
