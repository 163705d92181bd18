//! Built-in analysis libraries.
//!
//! Two libraries ship with the worker:
//!
//! - **`vamp-example-plugins`**: a native block-plugin library
//!   ([`ZeroCrossing`], [`AmplitudeFollower`]). It is pre-registered in every
//!   registry built by [`builtin_registry`], so a worker can serve requests
//!   without importing anything.
//! - **`energy`**: a library implementing the streaming contract directly
//!   ([`EnergyLibrary`]). It is not pre-registered; hosts import it through
//!   the module catalog.
//!
//! ## Architectural Layer
//!
//! **Backends.** These are opaque to the router: it reaches them only through
//! [`extraction::StreamingService`].

pub mod amplitude_follower;
pub mod energy;
pub mod zero_crossing;

use std::sync::Arc;

use extraction::{
    LibraryKey, LibraryModule, NativeLibrary, NativePlugin, OutputDescriptor, OutputId,
    ServiceRegistry,
};

pub use amplitude_follower::AmplitudeFollower;
pub use energy::{energy_module, EnergyLibrary, ENERGY_LIBRARY};
pub use zero_crossing::ZeroCrossing;

/// Well-known key of the pre-registered native library.
pub const BUILTIN_LIBRARY: &str = "vamp-example-plugins";

/// The native example plugin set.
pub struct ExamplePlugins;

impl NativeLibrary for ExamplePlugins {
    fn plugins(&self) -> Vec<Arc<dyn NativePlugin>> {
        vec![
            Arc::new(ZeroCrossing) as Arc<dyn NativePlugin>,
            Arc::new(AmplitudeFollower),
        ]
    }
}

/// The example plugin set as a native library module.
pub fn builtin_module() -> LibraryModule {
    LibraryModule::Native(Arc::new(ExamplePlugins))
}

/// The built-in library key.
pub fn builtin_key() -> Option<LibraryKey> {
    LibraryKey::new(BUILTIN_LIBRARY)
}

/// A registry pre-populated with the example plugins under
/// [`BUILTIN_LIBRARY`].
pub fn builtin_registry() -> ServiceRegistry {
    match builtin_key() {
        Some(key) => ServiceRegistry::new(key.clone(), builtin_module().into_factory(key)),
        None => ServiceRegistry::empty(),
    }
}

/// Average of all channels at frame `index`.
pub(crate) fn mixdown(channels: &[&[f32]], index: usize) -> f32 {
    if channels.is_empty() {
        return 0.0;
    }
    let sum: f32 = channels.iter().map(|channel| channel[index]).sum();
    sum / channels.len() as f32
}

/// Builds an output descriptor, skipping it if `id` is empty.
pub(crate) fn output(id: &str, name: &str, unit: Option<&str>) -> Option<OutputDescriptor> {
    Some(OutputDescriptor {
        identifier: OutputId::new(id)?,
        name: name.to_string(),
        unit: unit.map(str::to_string),
    })
}
