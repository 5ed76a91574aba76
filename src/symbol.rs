// MiniTalk Symbol Table - selector and identifier interning.
//
// Symbols are interned exactly once; equal spellings always map to the
// same `SymbolId`, so every later comparison in lookup and dispatch is
// a u32 compare.

use crate::fastmap;

/// Interned symbol handle. Two symbols are the same name iff their ids
/// are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// Append-only intern table. Symbols are never removed.
pub struct SymbolTable {
    names: Vec<String>,
    ids: fastmap::HashMap<String, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            names: Vec::new(),
            ids: fastmap::HashMap::default(),
        }
    }

    /// Intern a name, returning the existing id when already present.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = SymbolId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Look up a name without interning it.
    pub fn find(&self, name: &str) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> &str {
        &self.names[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut table = SymbolTable::new();
        let a = table.intern("at:put:");
        let b = table.intern("at:put:");
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_names_distinct_ids() {
        let mut table = SymbolTable::new();
        let a = table.intern("value");
        let b = table.intern("value:");
        assert_ne!(a, b);
        assert_eq!(table.name(a), "value");
        assert_eq!(table.name(b), "value:");
    }

    #[test]
    fn test_find_does_not_intern() {
        let mut table = SymbolTable::new();
        assert_eq!(table.find("new"), None);
        let id = table.intern("new");
        assert_eq!(table.find("new"), Some(id));
    }
}
