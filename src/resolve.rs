//! Include reference to dependency path resolution.
//!
//! Resolution is syntactic: `root + name + extname`, with no filesystem
//! access. A path to a missing file is still a valid result.

use std::path::PathBuf;

/// Removes one leading and one trailing `'` or `"`, each independently.
///
/// Interior quotes are kept and quotes are not balanced, so `'a"` becomes `a`.
pub fn strip_quotes(raw: &str) -> &str {
    let s = raw.strip_prefix(['\'', '"']).unwrap_or(raw);
    s.strip_suffix(['\'', '"']).unwrap_or(s)
}

/// Joins an already unquoted name with the configured root and extension.
pub fn join(root: &str, name: &str, extname: &str) -> PathBuf {
    let mut path = String::with_capacity(root.len() + name.len() + extname.len());
    path.push_str(root);
    path.push_str(name);
    path.push_str(extname);
    PathBuf::from(path)
}

/// Resolves a raw, possibly quoted, include reference.
pub fn resolve(raw: &str, root: &str, extname: &str) -> PathBuf {
    join(root, strip_quotes(raw), extname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("'partial'"), "partial");
        assert_eq!(strip_quotes("\"partial\""), "partial");
        assert_eq!(strip_quotes("partial"), "partial");
        assert_eq!(strip_quotes("'it's'"), "it's");
        assert_eq!(strip_quotes("''x''"), "'x'");
        assert_eq!(strip_quotes("'mixed\""), "mixed");
        assert_eq!(strip_quotes("'open"), "open");
        assert_eq!(strip_quotes("'"), "");
        assert_eq!(strip_quotes(""), "");
    }

    #[test]
    fn test_resolve_concatenates() {
        assert_eq!(
            resolve("'partial'", "/r/", ".tpl"),
            PathBuf::from("/r/partial.tpl")
        );
        // no separator is inserted between root and name
        assert_eq!(
            resolve("\"nav\"", "partials", ".liquid"),
            PathBuf::from("partialsnav.liquid")
        );
        assert_eq!(resolve("x", "", ""), PathBuf::from("x"));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let a = resolve("'sub/part'", "/root/", ".liquid");
        let b = resolve("'sub/part'", "/root/", ".liquid");
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/root/sub/part.liquid"));
    }
}
