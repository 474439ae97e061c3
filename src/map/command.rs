//! Write commands queued for the background worker.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// A mutation waiting for its turn in the task stream
pub(crate) enum Command<K, V> {
    /// Insert or overwrite one entry
    Set(K, V),
    /// Delete one entry if present
    Remove(K),
    /// Delete every entry
    Clear,
    /// Substitute the whole store
    Replace(HashMap<K, V>),
}

impl<K, V> Command<K, V>
where
    K: Eq + Hash,
{
    /// Apply the command to the store.
    pub(crate) fn apply(self, store: &mut HashMap<K, V>) {
        match self {
            Command::Set(key, value) => {
                store.insert(key, value);
            }
            Command::Remove(key) => {
                store.remove(&key);
            }
            Command::Clear => store.clear(),
            Command::Replace(map) => *store = map,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Set(..) => "set",
            Command::Remove(..) => "remove",
            Command::Clear => "clear",
            Command::Replace(..) => "replace_all",
        }
    }
}

// Keys and values are not required to be `Debug`.
impl<K, V> fmt::Debug for Command<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Set(..) => f.write_str("Set(..)"),
            Command::Remove(..) => f.write_str("Remove(..)"),
            Command::Clear => f.write_str("Clear"),
            Command::Replace(map) => write!(f, "Replace({} entries)", map.len()),
        }
    }
}
