//! Worker boundary for feature extraction.
//!
//! Hosts a [`extraction::Router`] behind a message protocol: the host sends
//! JSON-serialised [`InboundMessage`]s and receives [`OutboundMessage`]s, and
//! long-running extractions arrive as a throttled sequence of progress
//! messages ending in `complete` or `error`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Framing, module fetching, the execution context and
//! request correlation live here. Routing and throttling rules stay in
//! [`extraction`].
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`protocol`] | Wire message types and JSON encoding |
//! | [`fetch`] | [`ModuleFetcher`] port and the in-process [`ModuleCatalog`] |
//! | [`config`] | [`WorkerConfig`] |
//! | [`worker`] | [`FeatureExtractionWorker`], the inbox loop |
//! | [`isolated`] | [`spawn_isolated`]: a worker on its own thread and runtime |
//! | [`client`] | [`WorkerClient`]: host-side request correlation |

pub mod client;
pub mod config;
pub mod fetch;
pub mod isolated;
pub mod protocol;
pub mod worker;

pub use client::{ClientError, RequestEvent, RequestEvents, WorkerClient};
pub use config::{WorkerConfig, DEFAULT_ENERGY_LOCATION};
pub use fetch::{FetchError, ModuleCatalog, ModuleFetcher, ModuleLoader};
pub use isolated::{spawn_isolated, WorkerHandle};
pub use protocol::{InboundMessage, OutboundMessage, ProtocolError};
pub use worker::FeatureExtractionWorker;
