//! Registry of externally mapped ports.

use std::collections::BTreeMap;

use crate::native::PortMappingHandle;

/// Port number to the mapping handles the engine returned for it.
///
/// A port is present at most once and never with an empty handle set.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PortMappingRegistry {
    mappings: BTreeMap<u16, Vec<PortMappingHandle>>,
}

impl PortMappingRegistry {
    /// Empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            mappings: BTreeMap::new(),
        }
    }

    /// Map `port` using `map` unless it is already registered.
    ///
    /// Returns `true` when a new entry was stored. A mapper that yields no
    /// handles leaves the registry untouched.
    pub fn add<F>(&mut self, port: u16, map: F) -> bool
    where
        F: FnOnce() -> Vec<PortMappingHandle>,
    {
        if self.mappings.contains_key(&port) {
            return false;
        }
        let handles = map();
        if handles.is_empty() {
            return false;
        }
        self.mappings.insert(port, handles);
        true
    }

    /// Unmap every handle of `port` and forget it. Absent ports are ignored.
    pub fn remove<F>(&mut self, port: u16, mut unmap: F) -> bool
    where
        F: FnMut(PortMappingHandle),
    {
        let Some(handles) = self.mappings.remove(&port) else {
            return false;
        };
        for handle in handles {
            unmap(handle);
        }
        true
    }

    /// Forget every entry without unmapping.
    pub fn clear(&mut self) {
        self.mappings.clear();
    }

    /// Whether `port` is mapped.
    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        self.mappings.contains_key(&port)
    }

    /// Handles stored for `port`.
    #[must_use]
    pub fn handles(&self, port: u16) -> Option<&[PortMappingHandle]> {
        self.mappings.get(&port).map(Vec::as_slice)
    }

    /// Mapped ports in ascending order.
    #[must_use]
    pub fn ports(&self) -> Vec<u16> {
        self.mappings.keys().copied().collect()
    }

    /// Number of mapped ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    /// Whether nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent_per_port() {
        let mut registry = PortMappingRegistry::new();
        let mut calls = 0;
        assert!(registry.add(6881, || {
            calls += 1;
            vec![PortMappingHandle(1), PortMappingHandle(2)]
        }));
        assert!(!registry.add(6881, || {
            calls += 1;
            vec![PortMappingHandle(3)]
        }));
        assert_eq!(calls, 1);
        assert_eq!(
            registry.handles(6881),
            Some(&[PortMappingHandle(1), PortMappingHandle(2)][..])
        );
    }

    #[test]
    fn empty_handle_sets_are_never_stored() {
        let mut registry = PortMappingRegistry::new();
        assert!(!registry.add(6881, Vec::new));
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_unmaps_every_handle_then_erases() {
        let mut registry = PortMappingRegistry::new();
        registry.add(6881, || vec![PortMappingHandle(1), PortMappingHandle(2)]);
        registry.add(6882, || vec![PortMappingHandle(3)]);

        let mut unmapped = Vec::new();
        assert!(registry.remove(6881, |handle| unmapped.push(handle)));
        assert!(!registry.remove(9999, |handle| unmapped.push(handle)));

        assert_eq!(unmapped, vec![PortMappingHandle(1), PortMappingHandle(2)]);
        assert_eq!(registry.ports(), vec![6882]);
    }

    #[test]
    fn clear_forgets_without_unmapping() {
        let mut registry = PortMappingRegistry::new();
        registry.add(6881, || vec![PortMappingHandle(1)]);
        registry.clear();
        assert!(!registry.contains(6881));
        assert_eq!(registry.len(), 0);
    }
}
