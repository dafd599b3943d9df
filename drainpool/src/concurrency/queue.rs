//! Fixed-capacity FIFO queue with multiple producers and multiple consumers.
//!
//! The queue never holds more than its capacity. Producers either fail fast with
//! [`QueueSender::try_push`] or wait for room with [`QueueSender::push`]. Once closed, every
//! push fails immediately while consumers keep popping the remaining items, then receive
//! [`None`].

use std::fmt;
use std::num::NonZeroUsize;

/// Reason a non-blocking push did not enqueue its item. The item is handed back.
#[derive(PartialEq, Eq)]
pub enum PushError<T> {
    /// The queue holds `capacity` items.
    Full(T),
    /// The queue was closed.
    Closed(T),
}

impl<T> PushError<T> {
    /// Returns the item that could not be enqueued.
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(item) | PushError::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushError::Full(_) => f.write_str("Full(..)"),
            PushError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// The queue was closed while a blocking push was waiting. The item is handed back.
#[derive(PartialEq, Eq)]
pub struct QueueClosed<T>(pub T);

impl<T> fmt::Debug for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueClosed(..)")
    }
}

/// Creates a queue holding at most `capacity` items.
pub fn bounded_queue<T>(capacity: NonZeroUsize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = async_channel::bounded(capacity.get());

    (
        QueueSender {
            tx,
            capacity: capacity.get(),
        },
        QueueReceiver { rx },
    )
}

/// Producer side of a bounded queue.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: async_channel::Sender<T>,
    capacity: usize,
}

impl<T> QueueSender<T> {
    /// Enqueues `item` without waiting.
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        self.tx.try_send(item).map_err(|err| match err {
            async_channel::TrySendError::Full(item) => PushError::Full(item),
            async_channel::TrySendError::Closed(item) => PushError::Closed(item),
        })
    }

    /// Enqueues `item`, waiting for room if the queue is full.
    ///
    /// Cancel safe: dropping the returned future before it resolves drops the item without
    /// enqueueing it.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed<T>> {
        self.tx
            .send(item)
            .await
            .map_err(|async_channel::SendError(item)| QueueClosed(item))
    }

    /// Closes the queue. Returns `true` if this call closed it.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            capacity: self.capacity,
        }
    }
}

/// Consumer side of a bounded queue.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: async_channel::Receiver<T>,
}

impl<T> QueueReceiver<T> {
    /// Waits for the next item.
    ///
    /// Returns [`None`] once the queue is closed and empty. Cancel safe: an item is only
    /// removed from the queue when this future resolves with it.
    pub async fn pop(&self) -> Option<T> {
        self.rx.recv().await.ok()
    }

    /// Removes the next item if one is immediately available.
    pub fn try_pop(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}
