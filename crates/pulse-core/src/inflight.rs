//! In-flight guard.
//!
//! The set of keys whose handler is currently running. Membership is checked
//! and taken in one step under the scheduler's state lock, before any
//! asynchronous work starts, so two triggers for the same key can never both
//! win.

use std::collections::HashSet;

use crate::keys::RefreshKey;

#[derive(Debug, Default)]
pub struct InFlightSet {
    keys: HashSet<RefreshKey>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as running. Returns `false` if it already was.
    pub fn try_acquire(&mut self, key: &RefreshKey) -> bool {
        self.keys.insert(key.clone())
    }

    /// Returns `false` if `key` was not running.
    pub fn release(&mut self, key: &RefreshKey) -> bool {
        self.keys.remove(key)
    }

    pub fn contains(&self, key: &RefreshKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let mut set = InFlightSet::new();
        let key = RefreshKey::from("positions");

        assert!(set.try_acquire(&key));
        assert!(!set.try_acquire(&key));
        assert!(set.contains(&key));

        assert!(set.release(&key));
        assert!(!set.release(&key));
        assert!(set.try_acquire(&key));
    }

    #[test]
    fn test_keys_are_independent() {
        let mut set = InFlightSet::new();
        assert!(set.try_acquire(&"a".into()));
        assert!(set.try_acquire(&"b".into()));
        assert_eq!(set.len(), 2);
        set.release(&"a".into());
        assert!(!set.contains(&"a".into()));
        assert!(set.contains(&"b".into()));
    }
}
