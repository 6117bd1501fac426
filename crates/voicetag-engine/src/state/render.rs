use std::collections::HashMap;

use voicetag_core::{BubbleStatus, TaskKey};

use crate::dom::Element;

/// Markup last emitted for a key and the state it was rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBubble {
    pub status: BubbleStatus,
    pub markup: Element,
}

/// Memoized bubble markup keyed by fingerprint.
#[derive(Debug, Default)]
pub struct RenderCache {
    entries: HashMap<TaskKey, RenderedBubble>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TaskKey) -> Option<&RenderedBubble> {
        self.entries.get(key)
    }

    /// Cached markup for `key`, only if it was rendered for `status`.
    pub fn lookup(&self, key: &TaskKey, status: BubbleStatus) -> Option<&Element> {
        self.entries
            .get(key)
            .filter(|entry| entry.status == status)
            .map(|entry| &entry.markup)
    }

    pub fn insert(&mut self, key: TaskKey, status: BubbleStatus, markup: Element) {
        self.entries.insert(key, RenderedBubble { status, markup });
    }

    pub fn remove(&mut self, key: &TaskKey) -> Option<RenderedBubble> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicetag_core::task_key;

    #[test]
    fn test_lookup_requires_matching_state() {
        let mut cache = RenderCache::new();
        let key = task_key("Alice", "hi");
        cache.insert(key.clone(), BubbleStatus::Queued, Element::new("span"));

        assert!(cache.lookup(&key, BubbleStatus::Queued).is_some());
        assert!(cache.lookup(&key, BubbleStatus::Ready).is_none());
    }

    #[test]
    fn test_insert_replaces_state() {
        let mut cache = RenderCache::new();
        let key = task_key("Alice", "hi");
        cache.insert(key.clone(), BubbleStatus::Queued, Element::new("span"));
        cache.insert(key.clone(), BubbleStatus::Ready, Element::new("span"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key).unwrap().status, BubbleStatus::Ready);
    }
}
