//! Shapes a fetched library module can take.
//!
//! A module is classified exactly once, when it is fetched. From then on the
//! registry only holds a [`ServiceFactory`], so dispatch never has to inspect
//! what kind of module produced a backend.

use std::sync::Arc;

use crate::native::{NativeLibrary, NativeLibraryService};
use crate::service::{factory, ServiceFactory, StreamingService};
use crate::LibraryKey;

/// A library module ready to be registered.
#[derive(Clone)]
pub enum LibraryModule {
    /// A compiled block-plugin library; wrapped in [`NativeLibraryService`].
    Native(Arc<dyn NativeLibrary>),
    /// A module that already implements [`StreamingService`]. The factory is
    /// the module's own constructor.
    Streaming(ServiceFactory),
}

impl LibraryModule {
    /// Short label for logs.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Streaming(_) => "streaming",
        }
    }

    /// Builds the registry factory for this module served under `key`.
    pub fn into_factory(self, key: LibraryKey) -> ServiceFactory {
        match self {
            Self::Native(native) => factory(move || {
                Arc::new(NativeLibraryService::new(key.clone(), Arc::clone(&native)))
                    as Arc<dyn StreamingService>
            }),
            Self::Streaming(make) => make,
        }
    }
}

impl std::fmt::Debug for LibraryModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LibraryModule").field(&self.shape()).finish()
    }
}
