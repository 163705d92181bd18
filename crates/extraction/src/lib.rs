//! Feature extraction domain.
//!
//! This crate contains the request and result types, the backend port, and
//! the three pieces of logic that sit between a host and its analysis
//! libraries: the service registry, the request router and the milestone
//! throttle. Infrastructure crates implement [`StreamingService`] or drive
//! the [`Router`]; they never add routing or throttling rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No transport or file I/O lives
//! here.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`LibraryKey`, `CombinedKey`, `RequestId`, ...) |
//! | [`types`] | Requests, descriptors, progress and partial results |
//! | [`errors`] | [`ExtractionError`] |
//! | [`service`] | The [`StreamingService`] port and factory type |
//! | [`native`] | Native block-plugin port and its streaming adapter |
//! | [`module`] | [`LibraryModule`], the shape of a fetched library |
//! | [`registry`] | [`ServiceRegistry`] |
//! | [`router`] | [`Router`] |
//! | [`throttle`] | [`MilestoneGate`] and [`throttle()`] |

pub mod errors;
pub mod identifiers;
pub mod module;
pub mod native;
pub mod registry;
pub mod router;
pub mod service;
pub mod throttle;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use errors::ExtractionError;
pub use identifiers::{CombinedKey, FetchLocation, LibraryKey, OutputId, RequestId, KEY_SEPARATOR};
pub use module::LibraryModule;
pub use native::{
    NativeLibrary, NativeLibraryService, NativePlugin, PluginError, PluginRun, DEFAULT_BLOCK_SIZE,
};
pub use registry::ServiceRegistry;
pub use router::Router;
pub use service::{factory, failed_stream, PartialResultStream, ServiceFactory, StreamingService};
pub use throttle::{throttle, MilestoneGate};
pub use types::{
    concat_features, AudioFormat, ExtractionRequest, ExtractorDescriptor, Feature, ListResponse,
    OutputDescriptor, PartialResult, Progress, Reducer, Timestamp,
};
