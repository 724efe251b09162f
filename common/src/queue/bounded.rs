// Bounded multi-producer multi-consumer queue

use crate::errors::QueueError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

/// Snapshot of a queue's fill level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub depth: usize,
    pub capacity: usize,
}

/// Fixed-capacity FIFO shared between producers and consumers.
///
/// `push` waits while the queue is full, which is how producers feel backpressure.
/// Consumers share a single receiver, so every item is handed to exactly one of them.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    tx: mpsc::Sender<T>,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for BoundedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T: Send> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one)
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            name,
            capacity,
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Append an item, waiting for free space
    pub async fn push(&self, item: T) -> Result<(), QueueError> {
        self.tx.send(item).await.map_err(|_| QueueError::Closed)?;
        trace!(queue = self.name, depth = self.len(), "Item enqueued");
        Ok(())
    }

    /// Remove the oldest item, waiting until one is available
    pub async fn pop(&self) -> Result<T, QueueError> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(QueueError::Closed)
    }

    /// Number of items currently waiting
    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.len(),
            capacity: self.capacity,
        }
    }
}
