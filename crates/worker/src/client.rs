//! Host-side client for an isolated worker.
//!
//! [`WorkerClient`] serialises requests into the worker's inbox and runs a
//! reader task that routes every outbound message to whoever is waiting for
//! it. Request-scoped messages are matched by their correlation id; import
//! answers are matched by library key, oldest waiter first.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use extraction::{
    ExtractionError, ExtractionRequest, FetchLocation, LibraryKey, ListResponse, PartialResult,
    RequestId,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::protocol::{self, InboundMessage, OutboundMessage, ProtocolError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("The worker is no longer running")]
    Closed,

    #[error("Request id '{0}' is already waiting for a response")]
    DuplicateId(RequestId),

    #[error("Unexpected response for request '{0}'")]
    UnexpectedResponse(RequestId),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// One message addressed to a single request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    Progress(PartialResult),
    Listed(ListResponse),
    Complete,
    Failed(ExtractionError),
}

/// The messages of one in-flight request, in the order the worker sent them.
pub struct RequestEvents {
    id: RequestId,
    receiver: mpsc::UnboundedReceiver<RequestEvent>,
}

impl RequestEvents {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Next event, or `None` after the terminal event (or if the worker went
    /// away first).
    pub async fn next(&mut self) -> Option<RequestEvent> {
        self.receiver.recv().await
    }

    /// Waits for the request to finish and returns every progress message.
    pub async fn collect_results(mut self) -> Result<Vec<PartialResult>, ClientError> {
        let mut results = Vec::new();
        while let Some(event) = self.next().await {
            match event {
                RequestEvent::Progress(result) => results.push(result),
                RequestEvent::Complete => return Ok(results),
                RequestEvent::Failed(error) => return Err(error.into()),
                RequestEvent::Listed(_) => return Err(ClientError::UnexpectedResponse(self.id)),
            }
        }
        Err(ClientError::Closed)
    }
}

type ImportWaiter = oneshot::Sender<Result<ListResponse, ExtractionError>>;

#[derive(Default)]
struct ClientState {
    pending: HashMap<RequestId, mpsc::UnboundedSender<RequestEvent>>,
    imports: HashMap<LibraryKey, VecDeque<ImportWaiter>>,
}

impl ClientState {
    fn deliver(&mut self, id: RequestId, event: RequestEvent, terminal: bool) {
        let delivered = match self.pending.get(&id) {
            Some(sender) => sender.send(event).is_ok(),
            None => {
                debug!(request_id = %id, "Dropping message for unknown request");
                return;
            }
        };
        if terminal || !delivered {
            self.pending.remove(&id);
        }
    }

    fn resolve_import(
        &mut self,
        key: &LibraryKey,
        outcome: Result<ListResponse, ExtractionError>,
    ) {
        let Some(waiters) = self.imports.get_mut(key) else {
            debug!(library = %key, "Dropping import answer with no waiter");
            return;
        };
        if let Some(waiter) = waiters.pop_front() {
            let _ = waiter.send(outcome);
        }
        if waiters.is_empty() {
            self.imports.remove(key);
        }
    }
}

/// Correlating client for a worker's message channels.
///
/// Dropping the client closes the worker's inbox.
pub struct WorkerClient {
    inbox: mpsc::Sender<String>,
    state: Arc<Mutex<ClientState>>,
    reader: JoinHandle<()>,
}

impl WorkerClient {
    /// Attaches to a worker's channel ends. Must be called inside a tokio
    /// runtime; the reader task runs on it.
    pub fn new(inbox: mpsc::Sender<String>, outbox: mpsc::Receiver<String>) -> Self {
        let state = Arc::new(Mutex::new(ClientState::default()));
        let reader = tokio::spawn(read_loop(outbox, Arc::clone(&state)));
        Self {
            inbox,
            state,
            reader,
        }
    }

    /// Starts an extraction and returns its event stream.
    pub async fn process(
        &self,
        id: RequestId,
        request: ExtractionRequest,
    ) -> Result<RequestEvents, ClientError> {
        let receiver = self.open(&id).await?;
        let message = InboundMessage::Process {
            id: id.clone(),
            params: request,
        };
        if let Err(e) = self.send(&message).await {
            self.state.lock().await.pending.remove(&id);
            return Err(e);
        }
        Ok(RequestEvents { id, receiver })
    }

    /// Lists every extractor registered in the worker.
    pub async fn list(&self, id: RequestId) -> Result<ListResponse, ClientError> {
        let receiver = self.open(&id).await?;
        if let Err(e) = self.send(&InboundMessage::List { id: id.clone() }).await {
            self.state.lock().await.pending.remove(&id);
            return Err(e);
        }
        let mut events = RequestEvents { id, receiver };
        match events.next().await {
            Some(RequestEvent::Listed(result)) => Ok(result),
            Some(RequestEvent::Failed(error)) => Err(error.into()),
            Some(_) => Err(ClientError::UnexpectedResponse(events.id)),
            None => Err(ClientError::Closed),
        }
    }

    /// Imports `key` and returns the extractors it added.
    ///
    /// A worker that does not report import failures never answers a failed
    /// import, and this call then waits until the worker stops. Imports of
    /// other libraries are not held up by it. Hosts that import through the
    /// client should enable `report_import_failures`.
    pub async fn import(&self, key: LibraryKey) -> Result<ListResponse, ClientError> {
        let (waiter, answer) = oneshot::channel();
        self.state
            .lock()
            .await
            .imports
            .entry(key.clone())
            .or_default()
            .push_back(waiter);
        self.send(&InboundMessage::Import { params: key }).await?;
        answer
            .await
            .map_err(|_| ClientError::Closed)?
            .map_err(ClientError::from)
    }

    pub async fn add_remote_libraries(
        &self,
        libraries: BTreeMap<LibraryKey, FetchLocation>,
    ) -> Result<(), ClientError> {
        self.send(&InboundMessage::AddRemoteLibraries { params: libraries })
            .await
    }

    async fn open(
        &self,
        id: &RequestId,
    ) -> Result<mpsc::UnboundedReceiver<RequestEvent>, ClientError> {
        let mut state = self.state.lock().await;
        if state.pending.contains_key(id) {
            return Err(ClientError::DuplicateId(id.clone()));
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        state.pending.insert(id.clone(), sender);
        Ok(receiver)
    }

    async fn send(&self, message: &InboundMessage) -> Result<(), ClientError> {
        let raw = protocol::encode(message)?;
        self.inbox.send(raw).await.map_err(|_| ClientError::Closed)
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(mut outbox: mpsc::Receiver<String>, state: Arc<Mutex<ClientState>>) {
    while let Some(raw) = outbox.recv().await {
        let message = match protocol::decode_outbound(&raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed worker message");
                continue;
            }
        };

        let terminal = message.is_terminal();
        let mut state = state.lock().await;
        match message {
            OutboundMessage::Import { key, result } => state.resolve_import(&key, Ok(result)),
            OutboundMessage::ImportFailed { key, error } => {
                state.resolve_import(&key, Err(error))
            }
            OutboundMessage::Process { id, result } => {
                state.deliver(id, RequestEvent::Progress(result), terminal)
            }
            OutboundMessage::List { id, result } => {
                state.deliver(id, RequestEvent::Listed(result), terminal)
            }
            OutboundMessage::Complete { id } => state.deliver(id, RequestEvent::Complete, terminal),
            OutboundMessage::Error { id, error } => {
                state.deliver(id, RequestEvent::Failed(error), terminal)
            }
            // The client never sends an id that is still open, so a rejection
            // belongs to a request sent by someone else on the same inbox.
            OutboundMessage::Rejected { id, error } => {
                warn!(request_id = %id, error = %error, "Worker rejected a request");
            }
        }
    }

    debug!("Worker outbox closed; releasing waiters");
    let mut state = state.lock().await;
    state.pending.clear();
    state.imports.clear();
}
