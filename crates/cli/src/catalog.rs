//! Modules this binary can import.

use std::sync::Arc;

use example_plugins::{energy_module, ExamplePlugins};
use extraction::{FetchLocation, LibraryModule};
use worker::{ModuleCatalog, DEFAULT_ENERGY_LOCATION};

/// Location of the example plugin set, for importing it under another key.
pub const EXAMPLE_PLUGINS_LOCATION: &str = "builtin://vamp-example-plugins";

pub fn default_catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    if let Some(location) = FetchLocation::new(DEFAULT_ENERGY_LOCATION) {
        catalog.publish(location, |key| energy_module(key.clone()));
    }
    if let Some(location) = FetchLocation::new(EXAMPLE_PLUGINS_LOCATION) {
        catalog.publish(location, |_| LibraryModule::Native(Arc::new(ExamplePlugins)));
    }
    catalog
}
