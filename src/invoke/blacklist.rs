use parking_lot::RwLock;
use std::collections::HashSet;

/// Resource types whose components have timed out. Entries stay until an
/// explicit [`Blacklist::clear`].
#[derive(Debug, Default)]
pub struct Blacklist {
    types: RwLock<HashSet<String>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the type was not already blacklisted.
    pub fn insert(&self, resource_type: &str) -> bool {
        self.types.write().insert(resource_type.to_string())
    }

    pub fn contains(&self, resource_type: &str) -> bool {
        self.types.read().contains(resource_type)
    }

    pub fn clear(&self) {
        self.types.write().clear();
    }

    /// Blacklisted types in sorted order.
    pub fn types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.types.read().iter().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_contains_clear() {
        let blacklist = Blacklist::new();
        assert!(blacklist.insert("JBoss Server"));
        assert!(!blacklist.insert("JBoss Server"));
        assert!(blacklist.insert("Apache"));

        assert!(blacklist.contains("Apache"));
        assert!(!blacklist.contains("Postgres"));
        assert_eq!(blacklist.types(), vec!["Apache", "JBoss Server"]);

        blacklist.clear();
        assert!(blacklist.is_empty());
    }
}
