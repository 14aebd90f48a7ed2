//! Method registry

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use oscar_core::{Address, Message, Pattern};
use std::sync::Arc;

use crate::error::RegistrationError;

/// Something that handles messages delivered to a registered address
pub trait Method: Send + Sync + 'static {
    fn handle(&self, msg: &Message);
}

impl<F> Method for F
where
    F: Fn(&Message) + Send + Sync + 'static,
{
    fn handle(&self, msg: &Message) {
        self(msg)
    }
}

/// A registry entry
#[derive(Clone)]
pub struct RegisteredMethod {
    pub address: Address,
    pub handler: Arc<dyn Method>,
}

impl std::fmt::Debug for RegisteredMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredMethod")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Literal address → handler map
///
/// Lookups iterate the shards under read locks and clone the matching
/// handlers out, so no lock is held while a handler runs.
pub struct MethodRegistry {
    methods: DashMap<String, RegisteredMethod>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
        }
    }

    /// Add a method. Fails on an invalid address or an existing entry.
    pub fn register(
        &self,
        address: &str,
        handler: Arc<dyn Method>,
    ) -> Result<(), RegistrationError> {
        let address = Address::parse(address)?;

        match self.methods.entry(address.as_str().to_string()) {
            Entry::Occupied(entry) => {
                Err(RegistrationError::AlreadyRegistered(entry.key().clone()))
            }
            Entry::Vacant(entry) => {
                entry.insert(RegisteredMethod { address, handler });
                Ok(())
            }
        }
    }

    /// Remove a method
    pub fn unregister(&self, address: &str) -> Option<RegisteredMethod> {
        self.methods.remove(address).map(|(_, method)| method)
    }

    /// Snapshot of every method the pattern selects
    pub fn find_methods(&self, pattern: &Pattern) -> Vec<RegisteredMethod> {
        self.methods
            .iter()
            .filter(|entry| pattern.matches_address(&entry.value().address))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.methods.contains_key(address)
    }

    /// Registered addresses, sorted
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<_> = self.methods.iter().map(|e| e.key().clone()).collect();
        addresses.sort();
        addresses
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oscar_core::AddressError;

    fn noop() -> Arc<dyn Method> {
        Arc::new(|_: &Message| {})
    }

    #[test]
    fn test_register_and_find() {
        let registry = MethodRegistry::new();
        registry.register("/mixer/1/gain", noop()).unwrap();
        registry.register("/mixer/2/gain", noop()).unwrap();
        registry.register("/mixer/1/pan", noop()).unwrap();

        let pattern = Pattern::compile("/mixer/*/gain").unwrap();
        let mut found: Vec<_> = registry
            .find_methods(&pattern)
            .into_iter()
            .map(|m| m.address.into_string())
            .collect();
        found.sort();

        assert_eq!(found, vec!["/mixer/1/gain", "/mixer/2/gain"]);
    }

    #[test]
    fn test_duplicate_leaves_registry_unchanged() {
        let registry = MethodRegistry::new();
        registry.register("/a", noop()).unwrap();

        assert_eq!(
            registry.register("/a", noop()),
            Err(RegistrationError::AlreadyRegistered("/a".to_string()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invalid_address() {
        let registry = MethodRegistry::new();
        assert_eq!(
            registry.register("/address*/test", noop()),
            Err(RegistrationError::InvalidAddress(
                AddressError::ReservedCharacter {
                    address: "/address*/test".to_string(),
                    character: '*'
                }
            ))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister() {
        let registry = MethodRegistry::new();
        registry.register("/a", noop()).unwrap();
        assert!(registry.unregister("/a").is_some());
        assert!(registry.unregister("/a").is_none());
        assert!(!registry.contains("/a"));
    }
}
