//! Milestone throttle for backend result streams.
//!
//! Backends may report progress after every compute block, which can mean
//! thousands of messages per request. The throttle folds those results into a
//! running aggregate and lets the aggregate through only when progress moves
//! up by exactly one percentage point, or reaches 100%. That bounds a request
//! to roughly a hundred outbound messages.
//!
//! After every emission the next fold starts from empty features, so each
//! emitted aggregate carries only what arrived since the previous one.

use futures::StreamExt;
use tracing::{debug, trace};

use crate::service::PartialResultStream;
use crate::{PartialResult, Reducer};

/// Per-request throttle state.
///
/// One gate belongs to exactly one request stream; gates are never shared.
pub struct MilestoneGate {
    reducer: Reducer,
    aggregate: Option<PartialResult>,
    last_emitted_percent: u64,
    clear_on_next_fold: bool,
    /// A result was folded since the last emission.
    pending: bool,
    /// A result with a zero total block count was folded since the last
    /// emission.
    degenerate: bool,
}

impl MilestoneGate {
    pub fn new(reducer: Reducer) -> Self {
        Self {
            reducer,
            aggregate: None,
            last_emitted_percent: 0,
            clear_on_next_fold: false,
            pending: false,
            degenerate: false,
        }
    }

    /// Folds `next` into the aggregate and returns a snapshot of the aggregate
    /// if this result reaches a milestone.
    pub fn accept(&mut self, next: PartialResult) -> Option<PartialResult> {
        let progress = next.progress;
        match self.aggregate.as_mut() {
            Some(aggregate) => {
                if self.clear_on_next_fold {
                    aggregate.features.clear();
                }
                (self.reducer)(aggregate, next);
            }
            None => self.aggregate = Some(next),
        }
        self.pending = true;

        let should_emit = match progress.percent() {
            Ok(percent) => {
                let emit = percent.checked_sub(self.last_emitted_percent) == Some(1)
                    || percent == 100;
                if emit {
                    self.last_emitted_percent = percent;
                }
                trace!(percent, emit, "Milestone check");
                emit
            }
            Err(e) => {
                trace!(error = %e, "Progress has no percentage");
                self.degenerate = true;
                false
            }
        };

        self.clear_on_next_fold = should_emit;
        if should_emit {
            self.pending = false;
            self.degenerate = false;
            self.aggregate.clone()
        } else {
            None
        }
    }

    /// Called once the upstream stream has completed normally.
    ///
    /// Returns the held aggregate only if degenerate progress was folded since
    /// the last emission; such results can never pass the percentage gate.
    pub fn finish(&mut self) -> Option<PartialResult> {
        if !(self.pending && self.degenerate) {
            return None;
        }
        self.pending = false;
        self.degenerate = false;
        debug!("Flushing aggregate held back by degenerate progress");
        self.aggregate.clone()
    }

    pub fn last_emitted_percent(&self) -> u64 {
        self.last_emitted_percent
    }
}

/// Wraps `upstream` in a fresh [`MilestoneGate`].
///
/// Errors pass through immediately and end the stream; the held aggregate is
/// discarded.
pub fn throttle(mut upstream: PartialResultStream, reducer: Reducer) -> PartialResultStream {
    Box::pin(async_stream::stream! {
        let mut gate = MilestoneGate::new(reducer);
        while let Some(item) = upstream.next().await {
            match item {
                Ok(partial) => {
                    if let Some(milestone) = gate.accept(partial) {
                        yield Ok(milestone);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Upstream failed; dropping held aggregate");
                    yield Err(e);
                    return;
                }
            }
        }
        if let Some(last) = gate.finish() {
            yield Ok(last);
        }
    })
}
