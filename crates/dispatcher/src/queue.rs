//! RequestQueue - bounded FIFO buffer between producers and the engine

use tokio::sync::{mpsc, watch, Mutex};

/// Error returned by [`RequestQueue::push`] once shutdown has begun
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueClosed;

enum QueueTx<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

impl<T> Clone for QueueTx<T> {
    fn clone(&self) -> Self {
        match self {
            QueueTx::Bounded(tx) => QueueTx::Bounded(tx.clone()),
            QueueTx::Unbounded(tx) => QueueTx::Unbounded(tx.clone()),
        }
    }
}

/// Consuming side of the queue, owned by the dispatch engine
pub(crate) enum QueueReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> QueueReceiver<T> {
    /// Receive the next buffered request
    ///
    /// Suspends while the queue is empty and open. After [`RequestQueue::close`]
    /// the already-buffered items keep coming; `None` marks the drain as
    /// finished.
    pub async fn recv(&mut self) -> Option<T> {
        match self {
            QueueReceiver::Bounded(rx) => rx.recv().await,
            QueueReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Producer side plus the cooperative shutdown signal
///
/// Capacity is fixed at construction: a positive bound applies backpressure
/// to producers, `None` accepts without limit.
pub(crate) struct RequestQueue<T> {
    tx: Mutex<Option<QueueTx<T>>>,
    closed: watch::Sender<bool>,
}

impl<T: Send + 'static> RequestQueue<T> {
    /// Create the queue and hand back its consuming side
    pub fn new(capacity: Option<usize>) -> (Self, QueueReceiver<T>) {
        let (tx, rx) = match capacity {
            Some(cap) => {
                let (tx, rx) = mpsc::channel(cap);
                (QueueTx::Bounded(tx), QueueReceiver::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (QueueTx::Unbounded(tx), QueueReceiver::Unbounded(rx))
            }
        };
        let (closed, _) = watch::channel(false);
        (
            Self {
                tx: Mutex::new(Some(tx)),
                closed,
            },
            rx,
        )
    }

    /// Append a request in FIFO order
    ///
    /// Suspends while the queue is at capacity. Fails with [`QueueClosed`]
    /// once shutdown has begun, including for producers already suspended on
    /// a full queue at that moment.
    pub async fn push(&self, item: T) -> Result<(), QueueClosed> {
        let tx = match self.tx.lock().await.as_ref() {
            Some(tx) => tx.clone(),
            None => return Err(QueueClosed),
        };
        match tx {
            QueueTx::Unbounded(tx) => tx.send(item).map_err(|_| QueueClosed),
            QueueTx::Bounded(tx) => {
                let mut closed = self.closed.subscribe();
                tokio::select! {
                    biased;
                    res = closed.wait_for(|c| *c) => {
                        // wait_for only errors when the sender is gone, which
                        // also means the queue is tearing down
                        let _ = res;
                        Err(QueueClosed)
                    }
                    res = tx.send(item) => res.map_err(|_| QueueClosed),
                }
            }
        }
    }

    /// Signal shutdown: reject new pushes, let the receiver drain the rest
    ///
    /// Idempotent.
    pub async fn close(&self) {
        self.tx.lock().await.take();
        let _ = self.closed.send(true);
    }

    /// Whether shutdown has been signaled
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}
