use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// Whether `block` tags write their content out or store it for a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Output,
    Store,
}

pub struct Context<'a> {
    root: &'a Value,
    /// Targets of `assign`; visible everywhere after the assignment.
    globals: BTreeMap<String, Value>,
    /// Loop variables and include arguments, innermost last.
    scopes: Vec<BTreeMap<String, Value>>,
    pub blocks: HashMap<String, String>,
    pub block_mode: BlockMode,
    pub depth: usize,
}

impl<'a> Context<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self {
            root,
            globals: BTreeMap::new(),
            scopes: Vec::new(),
            blocks: HashMap::new(),
            block_mode: BlockMode::Output,
            depth: 0,
        }
    }

    pub fn push(&mut self, scope: BTreeMap<String, Value>) {
        self.scopes.push(scope);
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    pub fn assign(&mut self, key: &str, value: Value) {
        self.globals.insert(key.to_string(), value);
    }

    /// Innermost scope first, then assigned globals, then the data context.
    pub fn get_from_scope(&self, key: &str) -> Option<&Value> {
        if let Some(v) = self.scopes.iter().rev().find_map(|s| s.get(key)) {
            return Some(v);
        }
        if let Some(v) = self.globals.get(key) {
            return Some(v);
        }
        match self.root {
            Value::Map(m) => m.get(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Value {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        Value::Map(map)
    }

    #[test]
    fn test_lookup_simple() {
        let root = root();
        let ctx = Context::new(&root);
        assert_eq!(ctx.get_from_scope("a"), Some(&Value::Int(1)));
        assert_eq!(ctx.get_from_scope("b"), None);
    }

    #[test]
    fn test_scopes_shadow() {
        let root = root();
        let mut ctx = Context::new(&root);
        ctx.assign("a", Value::Int(2));
        assert_eq!(ctx.get_from_scope("a"), Some(&Value::Int(2)));

        ctx.push(BTreeMap::from([("a".to_string(), Value::Int(3))]));
        assert_eq!(ctx.get_from_scope("a"), Some(&Value::Int(3)));

        ctx.pop();
        assert_eq!(ctx.get_from_scope("a"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_non_map_root() {
        let root = Value::Nil;
        let ctx = Context::new(&root);
        assert_eq!(ctx.get_from_scope("a"), None);
    }
}
