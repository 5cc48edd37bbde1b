use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::warn;

/// Progress callback: `(current, total, message)`, `current` counting from 1.
/// It may borrow from the caller for the length of the run.
pub type ProgressCallback<'a> = dyn Fn(u64, u64, &str) + Send + Sync + 'a;

/// Token for cooperative cancellation of a batch.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The running batch stops before its next item.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns Err once cancellation was requested.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            return Err(CancelledError);
        }
        Ok(())
    }
}

/// Error indicating the operation was cancelled.
#[derive(Debug, Clone)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation cancelled")
    }
}

impl std::error::Error for CancelledError {}

/// What a batch produced.
#[derive(Debug)]
pub struct BatchTally<O> {
    /// Outcomes of the items that succeeded, in item order.
    pub outcomes: Vec<O>,
    /// One `label: error` line per failed item.
    pub failures: Vec<String>,
    pub cancelled: bool,
}

impl<O> Default for BatchTally<O> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
            failures: Vec::new(),
            cancelled: false,
        }
    }
}

/// Run `work` over `items` one at a time.
///
/// Before each item the progress callback receives `"<verb> <label>"`.
/// A failing item is logged and recorded; the batch carries on with the
/// next one. Only cancellation stops the loop early.
pub fn run_batch<T, O>(
    items: &[T],
    verb: &str,
    label: impl Fn(&T) -> String,
    mut work: impl FnMut(&T) -> anyhow::Result<O>,
    progress: &ProgressCallback<'_>,
    cancel: Option<&CancellationToken>,
) -> BatchTally<O> {
    let total = items.len() as u64;
    let mut tally = BatchTally::default();

    for (idx, item) in items.iter().enumerate() {
        if let Some(token) = cancel {
            if token.check().is_err() {
                tally.cancelled = true;
                break;
            }
        }

        let name = label(item);
        progress(idx as u64 + 1, total, &format!("{} {}", verb, name));

        match work(item) {
            Ok(outcome) => tally.outcomes.push(outcome),
            Err(e) => {
                warn!("{}: {:#}", name, e);
                tally.failures.push(format!("{}: {:#}", name, e));
            }
        }
    }

    tally
}

/// Run a job on its own named thread so the caller's thread stays free.
pub fn spawn_background<R, F>(name: &str, job: F) -> std::io::Result<JoinHandle<R>>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    std::thread::Builder::new().name(name.to_string()).spawn(job)
}
