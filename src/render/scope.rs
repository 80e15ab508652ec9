//! Lexical scope stack for a single component render
//!
//! Each `$foreach` pushes a frame holding the item (and optional
//! index) binding. Lookups walk innermost-out; names that miss every
//! frame fall through to the component's locals at the call site.

use indexmap::IndexMap;

use crate::render::FxValue;

#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<IndexMap<String, FxValue>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(IndexMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    /// Bind a name in the innermost frame. A frame must be open.
    pub fn assign(&mut self, key: impl Into<String>, value: FxValue) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(key.into(), value);
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&FxValue> {
        self.frames.iter().rev().find_map(|frame| frame.get(key))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_frame_shadows_outer() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.assign("n", FxValue::from(1));
        scopes.push();
        scopes.assign("n", FxValue::from(2));
        assert_eq!(scopes.lookup("n"), Some(&FxValue::from(2)));
        scopes.pop();
        assert_eq!(scopes.lookup("n"), Some(&FxValue::from(1)));
    }

    #[test]
    fn test_lookup_miss() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        assert!(scopes.lookup("missing").is_none());
    }
}
