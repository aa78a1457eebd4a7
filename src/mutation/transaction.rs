//! Free-form metadata scoped to one mutation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Key/value context carried from a mutation body to the commit hooks.
///
/// Lives for exactly one session and is never stored in a change record.
#[derive(Default)]
pub struct Transaction {
    entries: HashMap<String, Box<dyn Any + Send>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning true if it replaced an existing entry.
    pub fn insert<V: Any + Send>(&mut self, key: impl Into<String>, value: V) -> bool {
        self.entries.insert(key.into(), Box::new(value)).is_some()
    }

    /// Typed lookup. `None` if missing or stored with another type.
    pub fn get<V: Any>(&self, key: &str) -> Option<&V> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<V>())
    }

    pub fn get_mut<V: Any>(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(key).and_then(|v| v.downcast_mut::<V>())
    }

    pub fn remove<V: Any>(&mut self, key: &str) -> Option<V> {
        let value = self.entries.remove(key)?;
        match value.downcast::<V>() {
            Ok(v) => Some(*v),
            Err(value) => {
                self.entries.insert(key.to_string(), value);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("Transaction").field("keys", &keys).finish()
    }
}
