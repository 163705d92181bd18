//! The streaming service port every backend implements.
//!
//! The router, the throttle and the worker see backends only through
//! [`StreamingService`]. Whether a backend was linked in, adapted from a
//! native block plugin or imported at runtime is invisible past this trait.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::{ExtractionError, ExtractionRequest, ListResponse, PartialResult};

/// A boxed, `'static` stream of backend results for one request.
pub type PartialResultStream = BoxStream<'static, Result<PartialResult, ExtractionError>>;

/// An analysis library able to enumerate its extractors and run one of them.
#[async_trait]
pub trait StreamingService: Send + Sync {
    /// Lists every extractor this backend offers.
    async fn list(&self) -> Result<ListResponse, ExtractionError>;

    /// Runs one extraction.
    ///
    /// The returned stream owns everything it needs; it must not borrow
    /// `self`. Results are ordered by non-decreasing processed block count.
    fn process(&self, request: ExtractionRequest) -> PartialResultStream;
}

/// Produces a backend instance on demand.
pub type ServiceFactory = Arc<dyn Fn() -> Arc<dyn StreamingService> + Send + Sync>;

/// Wraps a closure as a [`ServiceFactory`].
pub fn factory<F>(make: F) -> ServiceFactory
where
    F: Fn() -> Arc<dyn StreamingService> + Send + Sync + 'static,
{
    Arc::new(make)
}

/// A stream that fails with `error` before yielding any result.
pub fn failed_stream(error: ExtractionError) -> PartialResultStream {
    stream::once(async move { Err(error) }).boxed()
}
