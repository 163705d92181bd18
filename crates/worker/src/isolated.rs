//! Running a worker in its own execution context.
//!
//! The worker gets a dedicated OS thread driving a current-thread tokio
//! runtime. The host reaches it only through two channels of serialised
//! JSON messages, so nothing but strings crosses the boundary.

use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::worker::FeatureExtractionWorker;

const THREAD_NAME: &str = "feature-extraction-worker";

/// The host's end of an isolated worker.
pub struct WorkerHandle {
    /// Messages to the worker. Dropping this stops the worker once its
    /// in-flight requests have finished.
    pub inbox: mpsc::Sender<String>,
    /// Messages from the worker.
    pub outbox: mpsc::Receiver<String>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Splits the handle into its channel ends and the thread handle.
    pub fn into_parts(self) -> (mpsc::Sender<String>, mpsc::Receiver<String>, JoinHandle<()>) {
        (self.inbox, self.outbox, self.thread)
    }
}

/// Starts `worker` on its own thread.
///
/// `capacity` bounds both message channels.
pub fn spawn_isolated(
    worker: FeatureExtractionWorker,
    capacity: usize,
) -> std::io::Result<WorkerHandle> {
    let capacity = capacity.max(1);
    let (inbox_tx, inbox_rx) = mpsc::channel(capacity);
    let (outbox_tx, outbox_rx) = mpsc::channel(capacity);

    let thread = std::thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!(error = %e, "Failed to start worker runtime");
                    return;
                }
            };
            runtime.block_on(worker.run(inbox_rx, outbox_tx));
            info!("Worker thread exiting");
        })?;

    Ok(WorkerHandle {
        inbox: inbox_tx,
        outbox: outbox_rx,
        thread,
    })
}
