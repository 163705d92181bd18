//! The feature extraction worker.
//!
//! The worker owns the [`Router`] and the table of fetch locations. Control
//! messages (`import`, `addRemoteLibraries`) are applied by the inbox loop
//! one at a time, so registration never races with itself. Every `list` and
//! `process` request runs in its own task and reports back through the
//! outbox, tagged with the caller's request id.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use extraction::{
    concat_features, throttle, ExtractionError, ExtractionRequest, FetchLocation, LibraryKey,
    Reducer, RequestId, Router, Timestamp,
};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::config::WorkerConfig;
use crate::fetch::ModuleFetcher;
use crate::protocol::{self, InboundMessage, OutboundMessage};

/// Requests that have started but not yet sent their terminal message.
type InFlight = Arc<Mutex<HashMap<RequestId, Timestamp>>>;

/// Serialising sender for outbound messages.
#[derive(Clone)]
struct Outbox {
    sender: mpsc::Sender<String>,
}

impl Outbox {
    /// Sends `message`; returns `false` once the host has stopped listening.
    async fn send(&self, message: &OutboundMessage) -> bool {
        let raw = match protocol::encode(message) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Failed to encode outbound message");
                return true;
            }
        };
        if self.sender.send(raw).await.is_err() {
            debug!("Outbox closed; dropping message");
            return false;
        }
        true
    }
}

pub struct FeatureExtractionWorker {
    router: Router,
    remote_libraries: BTreeMap<LibraryKey, FetchLocation>,
    fetcher: Arc<dyn ModuleFetcher>,
    report_import_failures: bool,
    reducer: Reducer,
    in_flight: InFlight,
}

impl FeatureExtractionWorker {
    pub fn new(router: Router, fetcher: Arc<dyn ModuleFetcher>, config: &WorkerConfig) -> Self {
        Self {
            router,
            remote_libraries: config.remote_libraries.clone(),
            fetcher,
            report_import_failures: config.report_import_failures,
            reducer: concat_features,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replaces the reducer used to fold partial results between milestones.
    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Processes inbound messages until the inbox closes, then waits for the
    /// requests still in flight to finish.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<String>, outbox: mpsc::Sender<String>) {
        let outbox = Outbox { sender: outbox };
        let mut tasks = JoinSet::new();
        info!(libraries = self.router.registry().len(), "Worker started");

        loop {
            tokio::select! {
                raw = inbox.recv() => match raw {
                    Some(raw) => self.dispatch(&raw, &outbox, &mut tasks).await,
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Request task failed");
                    }
                }
            }
        }

        debug!(pending = tasks.len(), "Inbox closed; draining requests");
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Request task failed");
            }
        }
        info!("Worker stopped");
    }

    async fn dispatch(&mut self, raw: &str, outbox: &Outbox, tasks: &mut JoinSet<()>) {
        let message = match protocol::decode_inbound(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed inbound message");
                return;
            }
        };

        match message {
            InboundMessage::Import { params } => self.import(params, outbox).await,
            InboundMessage::AddRemoteLibraries { params } => self.add_remote_libraries(params),
            InboundMessage::List { id } => self.list(id, outbox, tasks).await,
            InboundMessage::Process { id, params } => {
                self.process(id, params, outbox, tasks).await
            }
        }
    }

    /// Fetches and registers the library known as `key`, then answers with
    /// that library's extractors.
    #[instrument(skip(self, key, outbox), fields(library = %key))]
    async fn import(&mut self, key: LibraryKey, outbox: &Outbox) {
        let Some(location) = self.remote_libraries.get(&key).cloned() else {
            error!(library = %key, "Import requested for a library with no fetch location");
            self.import_failed(key, "no fetch location registered".to_string(), outbox)
                .await;
            return;
        };

        let module = match self.fetcher.fetch(&key, &location).await {
            Ok(module) => module,
            Err(e) => {
                error!(library = %key, location = %location, error = %e, "Library import failed");
                self.import_failed(key, e.to_string(), outbox).await;
                return;
            }
        };

        info!(library = %key, location = %location, shape = module.shape(), "Registering library");
        self.router
            .register(key.clone(), module.into_factory(key.clone()));

        match self.router.list_library(key.as_str()).await {
            Ok(result) => {
                outbox.send(&OutboundMessage::Import { key, result }).await;
            }
            Err(e) => {
                error!(library = %key, error = %e, "Imported library failed to list");
                self.import_failed(key, e.to_string(), outbox).await;
            }
        }
    }

    async fn import_failed(&self, key: LibraryKey, reason: String, outbox: &Outbox) {
        if !self.report_import_failures {
            return;
        }
        let error = ExtractionError::ImportFailed {
            key: key.to_string(),
            reason,
        };
        outbox
            .send(&OutboundMessage::ImportFailed { key, error })
            .await;
    }

    fn add_remote_libraries(&mut self, mapping: BTreeMap<LibraryKey, FetchLocation>) {
        for (key, location) in mapping {
            debug!(library = %key, location = %location, "Recorded remote library");
            self.remote_libraries.insert(key, location);
        }
    }

    /// Marks `id` as in flight. Answers with a rejection and returns `false`
    /// if it already is; the request already running under `id` is untouched.
    async fn begin(&self, id: &RequestId, outbox: &Outbox) -> bool {
        let mut in_flight = self.in_flight.lock().await;
        if in_flight.contains_key(id) {
            drop(in_flight);
            warn!(request_id = %id, "Rejecting request with an id already in flight");
            outbox
                .send(&OutboundMessage::Rejected {
                    id: id.clone(),
                    error: ExtractionError::InvalidRequest {
                        message: format!("request id '{id}' is already in flight"),
                    },
                })
                .await;
            return false;
        }
        in_flight.insert(id.clone(), Timestamp::now());
        true
    }

    async fn list(&self, id: RequestId, outbox: &Outbox, tasks: &mut JoinSet<()>) {
        if !self.begin(&id, outbox).await {
            return;
        }
        let listing = self.router.list();
        let outbox = outbox.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let span = info_span!("list", request_id = %id);

        let task = async move {
            let message = match listing.await {
                Ok(result) => OutboundMessage::List {
                    id: id.clone(),
                    result,
                },
                Err(error) => OutboundMessage::Error {
                    id: id.clone(),
                    error,
                },
            };
            finish(&in_flight, &id).await;
            outbox.send(&message).await;
        };
        tasks.spawn(task.instrument(span));
    }

    async fn process(
        &self,
        id: RequestId,
        request: ExtractionRequest,
        outbox: &Outbox,
        tasks: &mut JoinSet<()>,
    ) {
        if !self.begin(&id, outbox).await {
            return;
        }
        debug!(
            request_id = %id,
            key = %request.combined_key,
            output = %request.output_id,
            "Starting extraction"
        );
        let mut results = throttle(self.router.process(request), self.reducer);
        let outbox = outbox.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let span = info_span!("process", request_id = %id);

        let task = async move {
            let terminal = loop {
                match results.next().await {
                    Some(Ok(result)) => {
                        let message = OutboundMessage::Process {
                            id: id.clone(),
                            result,
                        };
                        if !outbox.send(&message).await {
                            break None;
                        }
                    }
                    Some(Err(error)) => {
                        warn!(request_id = %id, error = %error, "Extraction failed");
                        break Some(OutboundMessage::Error {
                            id: id.clone(),
                            error,
                        });
                    }
                    None => break Some(OutboundMessage::Complete { id: id.clone() }),
                }
            };

            finish(&in_flight, &id).await;
            if let Some(message) = terminal {
                outbox.send(&message).await;
            }
        };
        tasks.spawn(task.instrument(span));
    }
}

/// Clears `id` from the in-flight table before its terminal message goes
/// out, so the host may reuse the id as soon as it sees that message.
async fn finish(in_flight: &InFlight, id: &RequestId) {
    if let Some(started) = in_flight.lock().await.remove(id) {
        info!(
            request_id = %id,
            elapsed_ms = started.elapsed_millis(),
            "Request finished"
        );
    }
}
