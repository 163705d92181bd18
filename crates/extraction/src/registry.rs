//! Library key → backend factory registry.
//!
//! Backends are instantiated lazily: the factory runs on the first
//! [`ServiceRegistry::resolve`] for its key and the instance is cached until
//! the key is registered again. Iteration follows first-registration order;
//! re-registering a key replaces its factory in place.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info};

use crate::service::{ServiceFactory, StreamingService};
use crate::{ExtractionError, LibraryKey};

struct RegistryEntry {
    key: LibraryKey,
    factory: ServiceFactory,
    instance: OnceLock<Arc<dyn StreamingService>>,
}

impl RegistryEntry {
    fn new(key: LibraryKey, factory: ServiceFactory) -> Self {
        Self {
            key,
            factory,
            instance: OnceLock::new(),
        }
    }

    fn instance(&self) -> Arc<dyn StreamingService> {
        let service = self.instance.get_or_init(|| {
            debug!(library = %self.key, "Instantiating backend");
            (self.factory)()
        });
        Arc::clone(service)
    }
}

/// Maps library keys to backend factories.
pub struct ServiceRegistry {
    entries: Vec<RegistryEntry>,
}

impl ServiceRegistry {
    /// Creates a registry pre-populated with the built-in backend.
    pub fn new(builtin_key: LibraryKey, builtin: ServiceFactory) -> Self {
        let mut registry = Self::empty();
        registry.register(builtin_key, builtin);
        registry
    }

    /// Creates a registry with no backends at all.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts or replaces the factory for `key`.
    ///
    /// Replacing drops any cached instance, so the next resolve runs the new
    /// factory.
    pub fn register(&mut self, key: LibraryKey, factory: ServiceFactory) {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                info!(library = %key, "Replacing backend factory");
                *entry = RegistryEntry::new(key, factory);
            }
            None => {
                info!(library = %key, "Registering backend factory");
                self.entries.push(RegistryEntry::new(key, factory));
            }
        }
    }

    /// Returns the backend for `key`, instantiating it on first use.
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn StreamingService>, ExtractionError> {
        self.entries
            .iter()
            .find(|entry| entry.key.as_str() == key)
            .map(RegistryEntry::instance)
            .ok_or_else(|| ExtractionError::UnknownLibrary {
                key: key.to_string(),
            })
    }

    /// Returns `true` if `key` has a registered factory.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key.as_str() == key)
    }

    /// Registered keys in registry order.
    pub fn keys(&self) -> impl Iterator<Item = &LibraryKey> {
        self.entries.iter().map(|entry| &entry.key)
    }

    /// Every backend in registry order, instantiating as needed.
    pub fn resolve_all(&self) -> Vec<(LibraryKey, Arc<dyn StreamingService>)> {
        self.entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.instance()))
            .collect()
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
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::service::{factory, failed_stream, PartialResultStream};
    use crate::{ExtractionRequest, ListResponse};

    struct Idle;

    #[async_trait]
    impl StreamingService for Idle {
        async fn list(&self) -> Result<ListResponse, ExtractionError> {
            Ok(ListResponse::default())
        }

        fn process(&self, _request: ExtractionRequest) -> PartialResultStream {
            failed_stream(ExtractionError::backend("idle", "idle"))
        }
    }

    fn counting_factory(counter: Arc<AtomicUsize>) -> ServiceFactory {
        factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(Idle) as Arc<dyn StreamingService>
        })
    }

    fn key(name: &str) -> LibraryKey {
        LibraryKey::new(name).unwrap()
    }

    #[test]
    fn resolve_unknown_key_fails() {
        let registry = ServiceRegistry::empty();
        assert_eq!(
            registry.resolve("missing").err(),
            Some(ExtractionError::UnknownLibrary {
                key: "missing".into()
            })
        );
    }

    #[test]
    fn factory_runs_once_and_instance_is_cached() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = ServiceRegistry::new(key("builtin"), counting_factory(counter.clone()));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        let first = registry.resolve("builtin").unwrap();
        let second = registry.resolve("builtin").unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn re_registering_replaces_factory_and_keeps_position() {
        let old = Arc::new(AtomicUsize::new(0));
        let new = Arc::new(AtomicUsize::new(0));
        let mut registry = ServiceRegistry::empty();
        registry.register(key("a"), counting_factory(old.clone()));
        registry.register(key("b"), counting_factory(Arc::new(AtomicUsize::new(0))));
        registry.resolve("a").unwrap();

        registry.register(key("a"), counting_factory(new.clone()));
        registry.resolve("a").unwrap();

        assert_eq!(old.load(Ordering::SeqCst), 1);
        assert_eq!(new.load(Ordering::SeqCst), 1);
        let keys: Vec<&str> = registry.keys().map(LibraryKey::as_str).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(registry.len(), 2);
    }
}
