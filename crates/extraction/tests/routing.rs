//! Routing and list-aggregation behaviour of the router.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use extraction::{
    factory, AudioFormat, CombinedKey, ExtractionError, ExtractionRequest, ExtractorDescriptor,
    LibraryKey, ListResponse, OutputId, PartialResult, PartialResultStream, Progress, Router,
    ServiceRegistry, StreamingService,
};
use futures::stream::{self, StreamExt};

/// Backend that lists fixed extractors after a delay and counts process calls.
struct FixedBackend {
    library: &'static str,
    extractors: Vec<&'static str>,
    list_delay: Duration,
    processed: Arc<AtomicUsize>,
}

#[async_trait]
impl StreamingService for FixedBackend {
    async fn list(&self) -> Result<ListResponse, ExtractionError> {
        tokio::time::sleep(self.list_delay).await;
        let library = LibraryKey::new(self.library).unwrap();
        Ok(ListResponse {
            available: self
                .extractors
                .iter()
                .map(|id| ExtractorDescriptor {
                    key: CombinedKey::from_parts(&library, id),
                    name: id.to_string(),
                    description: String::new(),
                    outputs: Vec::new(),
                })
                .collect(),
        })
    }

    fn process(&self, _request: ExtractionRequest) -> PartialResultStream {
        self.processed.fetch_add(1, Ordering::SeqCst);
        stream::iter(vec![Ok(PartialResult::new(Vec::new(), Progress::new(1, 1)))]).boxed()
    }
}

struct FailingList;

#[async_trait]
impl StreamingService for FailingList {
    async fn list(&self) -> Result<ListResponse, ExtractionError> {
        Err(ExtractionError::backend("broken", "cannot enumerate"))
    }

    fn process(&self, _request: ExtractionRequest) -> PartialResultStream {
        stream::empty().boxed()
    }
}

fn register_fixed(
    router: &mut Router,
    library: &'static str,
    extractors: Vec<&'static str>,
    list_delay: Duration,
) -> Arc<AtomicUsize> {
    let processed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&processed);
    router.register(
        LibraryKey::new(library).unwrap(),
        factory(move || {
            Arc::new(FixedBackend {
                library,
                extractors: extractors.clone(),
                list_delay,
                processed: Arc::clone(&counter),
            }) as Arc<dyn StreamingService>
        }),
    );
    processed
}

fn request(key: &str) -> ExtractionRequest {
    ExtractionRequest {
        combined_key: CombinedKey::new(key).unwrap(),
        output_id: OutputId::new("out").unwrap(),
        audio_channels: vec![vec![0.0; 4]],
        audio_format: AudioFormat {
            sample_rate: 44100.0,
            channel_count: 1,
            frame_length: 4,
        },
    }
}

#[tokio::test]
async fn process_reaches_only_the_owning_backend() {
    let mut router = Router::new(ServiceRegistry::empty());
    let a = register_fixed(&mut router, "a", vec!["x"], Duration::ZERO);
    let b = register_fixed(&mut router, "b", vec!["y"], Duration::ZERO);
    let c = register_fixed(&mut router, "c", vec!["z"], Duration::ZERO);

    let results: Vec<_> = router.process(request("b:y")).collect().await;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
    assert_eq!(a.load(Ordering::SeqCst), 0);
    assert_eq!(b.load(Ordering::SeqCst), 1);
    assert_eq!(c.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unregistered_prefix_fails_without_touching_any_backend() {
    let mut router = Router::new(ServiceRegistry::empty());
    let a = register_fixed(&mut router, "a", vec!["x"], Duration::ZERO);

    let results: Vec<_> = router.process(request("A:x")).collect().await;

    assert_eq!(
        results,
        vec![Err(ExtractionError::UnknownLibrary { key: "A".into() })]
    );
    assert_eq!(a.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn list_concatenates_in_registration_order_regardless_of_latency() {
    let mut router = Router::new(ServiceRegistry::empty());
    register_fixed(&mut router, "a", vec!["a1", "a2"], Duration::from_millis(30));
    register_fixed(&mut router, "b", vec!["b1"], Duration::ZERO);
    register_fixed(&mut router, "c", vec!["c1"], Duration::from_millis(10));

    let listed = router.list().await.unwrap();
    let keys: Vec<&str> = listed.available.iter().map(|d| d.key.as_str()).collect();

    assert_eq!(keys, vec!["a:a1", "a:a2", "b:b1", "c:c1"]);
}

#[tokio::test]
async fn one_failing_backend_fails_the_whole_list() {
    let mut router = Router::new(ServiceRegistry::empty());
    register_fixed(&mut router, "a", vec!["a1"], Duration::ZERO);
    router.register(
        LibraryKey::new("broken").unwrap(),
        factory(|| Arc::new(FailingList) as Arc<dyn StreamingService>),
    );

    let err = router.list().await.unwrap_err();
    assert!(matches!(err, ExtractionError::BackendError { .. }));
}

#[tokio::test]
async fn re_registration_leaves_no_duplicate_list_entries() {
    let mut router = Router::new(ServiceRegistry::empty());
    register_fixed(&mut router, "lib", vec!["old"], Duration::ZERO);
    register_fixed(&mut router, "lib", vec!["new1", "new2"], Duration::ZERO);

    let listed = router.list().await.unwrap();
    let keys: Vec<&str> = listed.available.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(keys, vec!["lib:new1", "lib:new2"]);

    let single = router.list_library("lib").await.unwrap();
    assert_eq!(single.available.len(), 2);
}

#[tokio::test]
async fn list_library_of_unknown_key_fails() {
    let router = Router::new(ServiceRegistry::empty());
    assert_eq!(
        router.list_library("ghost").await.unwrap_err(),
        ExtractionError::UnknownLibrary {
            key: "ghost".into()
        }
    );
}

#[tokio::test]
async fn list_library_lists_one_backend_and_reports_its_failure() {
    let mut router = Router::new(ServiceRegistry::empty());
    register_fixed(&mut router, "a", vec!["a1"], Duration::ZERO);
    register_fixed(&mut router, "b", vec!["b1", "b2"], Duration::ZERO);
    router.register(
        LibraryKey::new("broken").unwrap(),
        factory(|| Arc::new(FailingList) as Arc<dyn StreamingService>),
    );

    let only_b = router.list_library("b").await.unwrap();
    let keys: Vec<&str> = only_b.available.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(keys, vec!["b:b1", "b:b2"]);

    assert!(matches!(
        router.list_library("broken").await.unwrap_err(),
        ExtractionError::BackendError { .. }
    ));
}
