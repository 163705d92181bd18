//! Module fetching.
//!
//! A library is imported by resolving its [`FetchLocation`] to a
//! [`LibraryModule`]. [`ModuleFetcher`] is the seam; [`ModuleCatalog`] is the
//! in-process implementation that maps known locations to module
//! constructors.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use extraction::{FetchLocation, LibraryKey, LibraryModule};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No module is published at '{location}'")]
    NotFound { location: FetchLocation },

    #[error("Module at '{location}' failed to load: {reason}")]
    Load {
        location: FetchLocation,
        reason: String,
    },
}

/// Resolves a fetch location to a library module.
///
/// `key` is the library key the module will be registered under; modules use
/// it to qualify the combined keys they list.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    async fn fetch(
        &self,
        key: &LibraryKey,
        location: &FetchLocation,
    ) -> Result<LibraryModule, FetchError>;
}

/// Builds a module for the library key it is imported under.
pub type ModuleLoader = Arc<dyn Fn(&LibraryKey) -> LibraryModule + Send + Sync>;

/// Location-addressed table of module loaders.
#[derive(Clone, Default)]
pub struct ModuleCatalog {
    loaders: HashMap<FetchLocation, ModuleLoader>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `loader` at `location`, replacing any previous entry.
    pub fn publish<F>(&mut self, location: FetchLocation, loader: F)
    where
        F: Fn(&LibraryKey) -> LibraryModule + Send + Sync + 'static,
    {
        self.loaders.insert(location, Arc::new(loader));
    }

    /// Builder form of [`publish`](Self::publish).
    pub fn with<F>(mut self, location: FetchLocation, loader: F) -> Self
    where
        F: Fn(&LibraryKey) -> LibraryModule + Send + Sync + 'static,
    {
        self.publish(location, loader);
        self
    }

    pub fn locations(&self) -> impl Iterator<Item = &FetchLocation> {
        self.loaders.keys()
    }
}

impl std::fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCatalog")
            .field("locations", &self.loaders.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ModuleFetcher for ModuleCatalog {
    async fn fetch(
        &self,
        key: &LibraryKey,
        location: &FetchLocation,
    ) -> Result<LibraryModule, FetchError> {
        let loader = self
            .loaders
            .get(location)
            .ok_or_else(|| FetchError::NotFound {
                location: location.clone(),
            })?;
        let module = loader(key);
        debug!(library = %key, location = %location, shape = module.shape(), "Fetched module");
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use example_plugins::{energy_module, ExamplePlugins};

    fn location(value: &str) -> FetchLocation {
        FetchLocation::new(value).unwrap()
    }

    #[tokio::test]
    async fn published_location_yields_its_module() {
        let catalog = ModuleCatalog::new()
            .with(location("builtin://energy"), |key| energy_module(key.clone()))
            .with(location("builtin://examples"), |_| {
                LibraryModule::Native(Arc::new(ExamplePlugins))
            });

        let key = LibraryKey::new("energy").unwrap();
        let energy = catalog.fetch(&key, &location("builtin://energy")).await.unwrap();
        assert_eq!(energy.shape(), "streaming");

        let native = catalog
            .fetch(&key, &location("builtin://examples"))
            .await
            .unwrap();
        assert_eq!(native.shape(), "native");
    }

    #[tokio::test]
    async fn unpublished_location_is_not_found() {
        let catalog = ModuleCatalog::new();
        let err = catalog
            .fetch(
                &LibraryKey::new("pyin").unwrap(),
                &location("assets/extractors/PYin.umd.js"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }
}
