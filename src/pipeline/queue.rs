// src/pipeline/queue.rs

//! Bounded stage queues with producer registration.
//!
//! Every [`Producer`] clone is a registration. The queue closes exactly
//! once, when the last registration is dropped; consumers then drain the
//! remaining items and see `None`.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

struct Registration<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T> Drop for Registration<T> {
    fn drop(&mut self) {
        log::debug!("Queue '{}' closed", self.name);
    }
}

/// Sending side of a stage queue.
pub struct Producer<T> {
    inner: Arc<Registration<T>>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Producer<T> {
    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    /// Live registrations, including this one.
    pub fn registrations(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Wait for capacity, giving up when `cancel` fires.
    pub async fn send(&self, item: T, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            sent = self.inner.tx.send(item) => {
                sent.map_err(|_| AppError::Queue(self.inner.name.to_string()))
            }
        }
    }

    /// Enqueue without waiting. `Ok(false)` means the queue was full and the
    /// item was dropped.
    pub fn try_send(&self, item: T) -> Result<bool> {
        match self.inner.tx.try_send(item) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(AppError::Queue(self.inner.name.to_string()))
            }
        }
    }
}

/// Receiving side, shareable across a worker pool.
pub struct Consumer<T> {
    name: &'static str,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for Consumer<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> Consumer<T> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Next item, or `None` once the queue is closed and drained or
    /// `cancel` fires.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<T> {
        let mut rx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            guard = self.rx.lock() => guard,
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = rx.recv() => item,
        }
    }
}

/// Create a bounded queue.
pub fn channel<T>(name: &'static str, capacity: usize) -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        Producer {
            inner: Arc::new(Registration { name, tx }),
        },
        Consumer {
            name,
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}
