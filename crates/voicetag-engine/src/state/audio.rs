use std::collections::HashMap;

use voicetag_core::{AudioLocator, TaskKey};

/// Resolved audio per key. Write-once; only explicit invalidation removes
/// an entry.
#[derive(Debug, Default)]
pub struct AudioMemory {
    entries: HashMap<TaskKey, AudioLocator>,
}

impl AudioMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&AudioLocator> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store the locator for `key` unless one is already stored.
    ///
    /// Returns `false` when an existing entry was kept.
    pub(crate) fn resolve(&mut self, key: TaskKey, locator: AudioLocator) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, locator);
        true
    }

    /// Drop the entry for `key`, returning the released locator.
    pub(crate) fn invalidate(&mut self, key: &TaskKey) -> Option<AudioLocator> {
        self.entries.remove(key)
    }
}
