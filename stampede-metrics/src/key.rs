use std::collections::HashMap;
use std::sync::Arc;

use ahash::RandomState;
use parking_lot::RwLock;

/// Interned identifier for a metric name, tag key or tag value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Debug, Default)]
struct Table {
    ids: HashMap<Arc<str>, KeyId, RandomState>,
    strings: Vec<Arc<str>>,
}

/// Append-only string table shared by every series in a registry.
#[derive(Debug, Default)]
pub struct Interner {
    table: RwLock<Table>,
}

impl Interner {
    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.get(s) {
            return id;
        }

        let mut table = self.table.write();
        // Another writer may have won the race between the read and write lock.
        if let Some(&id) = table.ids.get(s) {
            return id;
        }

        let id = KeyId(table.strings.len() as u32);
        let s: Arc<str> = Arc::from(s);
        table.strings.push(s.clone());
        table.ids.insert(s, id);
        id
    }

    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.table.read().ids.get(s).copied()
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.table.read().strings.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable_and_resolvable() {
        let interner = Interner::default();
        let a = interner.get_or_intern("scenario");
        let b = interner.get_or_intern("status");
        assert_ne!(a, b);
        assert_eq!(interner.get_or_intern("scenario"), a);
        assert_eq!(interner.resolve(b).as_deref(), Some("status"));
        assert_eq!(interner.get("missing"), None);
        assert_eq!(interner.len(), 2);
    }
}
