// src/pipeline/sink.rs

//! Fan-in of worker failures.
//!
//! Workers never propagate errors upstream. They report them here and move
//! on; a single drain task writes them to the log.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// A failure reported by one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerError {
    pub worker_id: String,
    pub message: String,
    pub cause: Option<String>,
}

impl WorkerError {
    pub fn new(worker_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.worker_id, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}

/// Cloneable reporting handle.
#[derive(Clone)]
pub struct ErrorSink {
    tx: mpsc::Sender<WorkerError>,
    reported: Arc<AtomicUsize>,
}

/// The drain task behind an [`ErrorSink`].
pub struct SinkDrain {
    task: JoinHandle<()>,
    reported: Arc<AtomicUsize>,
}

impl ErrorSink {
    pub fn new(buffer: usize) -> (Self, SinkDrain) {
        let (tx, mut rx) = mpsc::channel::<WorkerError>(buffer.max(1));
        let reported = Arc::new(AtomicUsize::new(0));
        let task = tokio::spawn(async move {
            while let Some(error) = rx.recv().await {
                log::error!("{}", error);
            }
        });
        (
            Self {
                tx,
                reported: Arc::clone(&reported),
            },
            SinkDrain { task, reported },
        )
    }

    /// Report without blocking; logs directly when the buffer is full.
    pub fn send(&self, error: WorkerError) {
        self.reported.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.tx.try_send(error) {
            let error = match e {
                mpsc::error::TrySendError::Full(error) | mpsc::error::TrySendError::Closed(error) => {
                    error
                }
            };
            log::error!("{} (sink overflow)", error);
        }
    }

    pub fn reported(&self) -> usize {
        self.reported.load(Ordering::Relaxed)
    }
}

impl SinkDrain {
    /// Drop the last handle and wait for the drain. Returns the number of
    /// errors reported over the sink's lifetime.
    pub async fn close(self, sink: ErrorSink, grace: Duration) -> usize {
        drop(sink);
        if tokio::time::timeout(grace, self.task).await.is_err() {
            log::warn!("Error sink still has open handles after {:?}", grace);
        }
        self.reported.load(Ordering::Relaxed)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run a worker body, turning errors and panics into sink reports.
///
/// Cancellation is not reported.
pub async fn supervise<F>(worker_id: String, sink: ErrorSink, work: F)
where
    F: Future<Output = Result<()>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(())) => log::debug!("Worker {} finished", worker_id),
        Ok(Err(e)) if e.is_cancelled() => log::debug!("Worker {} cancelled", worker_id),
        Ok(Err(e)) => sink.send(WorkerError::new(worker_id, "worker failed").with_cause(e)),
        Err(panic) => sink.send(
            WorkerError::new(worker_id, "worker panicked").with_cause(panic_message(panic.as_ref())),
        ),
    }
}
