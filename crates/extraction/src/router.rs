//! Routes requests to the backend that owns their combined key.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::registry::ServiceRegistry;
use crate::service::{failed_stream, PartialResultStream, ServiceFactory, StreamingService};
use crate::{ExtractionError, ExtractionRequest, LibraryKey, ListResponse};

/// Dispatches `list` and `process` calls across every registered backend.
///
/// The router owns the registry outright. Its calls return `'static` futures
/// and streams, so a caller can hand them to spawned tasks while keeping
/// `&mut` access for later registrations.
pub struct Router {
    registry: ServiceRegistry,
}

impl Router {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    /// Registers (or replaces) a backend factory.
    pub fn register(&mut self, key: LibraryKey, factory: ServiceFactory) {
        self.registry.register(key, factory);
    }

    /// Lists every backend's extractors.
    ///
    /// Backends are queried concurrently but their lists are concatenated in
    /// registry order. The first failing backend fails the whole call.
    pub fn list(&self) -> BoxFuture<'static, Result<ListResponse, ExtractionError>> {
        let backends = self.registry.resolve_all();
        async move {
            let lists = try_join_all(
                backends
                    .iter()
                    .map(|(key, backend)| list_one(key.to_string(), Arc::clone(backend))),
            )
            .await?;
            Ok(lists
                .into_iter()
                .fold(ListResponse::default(), ListResponse::concat))
        }
        .boxed()
    }

    /// Lists the extractors of a single backend.
    pub fn list_library(
        &self,
        key: &str,
    ) -> BoxFuture<'static, Result<ListResponse, ExtractionError>> {
        match self.registry.resolve(key) {
            Ok(backend) => list_one(key.to_string(), backend).boxed(),
            Err(e) => futures::future::ready(Err(e)).boxed(),
        }
    }

    /// Forwards `request` to the backend named by its key prefix.
    ///
    /// An unregistered prefix yields a stream that fails immediately; no
    /// backend is touched. The backend's stream is returned unchanged.
    pub fn process(&self, request: ExtractionRequest) -> PartialResultStream {
        match self.registry.resolve(request.combined_key.library_prefix()) {
            Ok(backend) => {
                debug!(
                    key = %request.combined_key,
                    output = %request.output_id,
                    "Routing process request"
                );
                backend.process(request)
            }
            Err(e) => {
                warn!(key = %request.combined_key, "No library registered for request key");
                failed_stream(e)
            }
        }
    }
}

async fn list_one(
    key: String,
    backend: Arc<dyn StreamingService>,
) -> Result<ListResponse, ExtractionError> {
    backend.list().await.inspect_err(|e| {
        warn!(library = %key, error = %e, "Backend list failed");
    })
}
