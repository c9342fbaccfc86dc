//! Dispatcher - write-behind handle over a single sink
//!
//! Producers enqueue opaque write requests and never touch sink I/O; the
//! engine workers drain the queue in the background. Shutdown is
//! cooperative: close rejects new requests, delivers what is buffered, and
//! bounds the wait with an optional timeout.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{ContractError, DispatcherConfig, TraceRecord, TraceSink};

use crate::engine;
use crate::error::DispatcherError;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::queue::RequestQueue;

/// One deferred write operation, parameterized by the sink handle
pub type WriteRequest<S> =
    Box<dyn FnOnce(Arc<S>) -> BoxFuture<'static, Result<(), ContractError>> + Send>;

/// Dispatcher lifecycle state
///
/// Transitions only forward: Running -> ShuttingDown -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    ShuttingDown,
    Closed,
}

/// Result of a close call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Queue drained and workers finished within the allowed wait
    Completed,
    /// The wait elapsed first; the drain keeps running in the background
    TimedOut,
}

const STATE_RUNNING: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_CLOSED: u8 = 2;

struct Inner<S: TraceSink + Send + Sync + 'static> {
    sink: Arc<S>,
    sink_name: String,
    owns_sink: bool,
    /// Present when external code may write to the shared sink concurrently
    sink_guard: Option<Arc<Mutex<()>>>,
    state: AtomicU8,
    queue: RequestQueue<WriteRequest<S>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    metrics: Arc<DispatchMetrics>,
    close_timeout: Option<Duration>,
    drained: watch::Sender<bool>,
    outcome: watch::Sender<Option<CloseOutcome>>,
}

/// The write-behind dispatcher handle
///
/// Cheap to clone; all clones share one queue, engine and sink.
pub struct Dispatcher<S: TraceSink + Send + Sync + 'static> {
    inner: Arc<Inner<S>>,
}

impl<S: TraceSink + Send + Sync + 'static> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: TraceSink + Send + Sync + 'static> Dispatcher<S> {
    /// Validate the configuration and start the engine
    ///
    /// The sink's name and concurrency capability are read once here; the
    /// capability selects the engine mode for the dispatcher's lifetime.
    #[instrument(name = "dispatcher_spawn", skip(sink, config))]
    pub fn spawn(sink: S, config: DispatcherConfig) -> Result<Self, DispatcherError> {
        config.validate()?;

        let sink = Arc::new(sink);
        let sink_name = sink.name().to_string();
        let concurrency_safe = sink.is_concurrency_safe();

        let (queue, rx) = RequestQueue::new(config.capacity);
        let metrics = Arc::new(DispatchMetrics::new());

        // external code may hold its own reference to a sink we do not own;
        // a non-concurrency-safe sink then needs a lock scoped to the handle
        let sink_guard =
            (!config.owns_sink && !concurrency_safe).then(|| Arc::new(Mutex::new(())));

        let workers = if concurrency_safe {
            let count = config.parallelism.unwrap_or_else(available_workers);
            engine::spawn_parallel(
                Arc::clone(&sink),
                sink_name.clone(),
                rx,
                count,
                Arc::clone(&metrics),
            )
        } else {
            engine::spawn_serial(
                Arc::clone(&sink),
                sink_name.clone(),
                rx,
                sink_guard.clone(),
                Arc::clone(&metrics),
            )
        };

        info!(
            sink = %sink_name,
            parallel = concurrency_safe,
            workers = workers.len(),
            capacity = ?config.capacity,
            "Dispatcher started"
        );

        let (drained, _) = watch::channel(false);
        let (outcome, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(Inner {
                sink,
                sink_name,
                owns_sink: config.owns_sink,
                sink_guard,
                state: AtomicU8::new(STATE_RUNNING),
                queue,
                workers: Mutex::new(workers),
                metrics,
                close_timeout: config.close_timeout(),
                drained,
                outcome,
            }),
        })
    }

    /// Sink name as reported in logs and failure records
    pub fn name(&self) -> &str {
        &self.inner.sink_name
    }

    /// Current lifecycle state
    pub fn state(&self) -> DispatcherState {
        match self.inner.state.load(Ordering::Acquire) {
            STATE_RUNNING => DispatcherState::Running,
            STATE_SHUTTING_DOWN => DispatcherState::ShuttingDown,
            _ => DispatcherState::Closed,
        }
    }

    /// Snapshot of the dispatch counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Enqueue an opaque write request
    ///
    /// Suspends while the queue is at capacity; fails with
    /// [`DispatcherError::QueueClosed`] once close has begun. The request's
    /// own outcome is fire-and-forget: failures go to the failure reporter,
    /// never back to this caller.
    pub async fn enqueue<F>(&self, write: F) -> Result<(), DispatcherError>
    where
        F: FnOnce(Arc<S>) -> BoxFuture<'static, Result<(), ContractError>> + Send + 'static,
    {
        self.enqueue_request(Box::new(write)).await
    }

    /// Enqueue a write of one trace record
    pub async fn enqueue_record(&self, record: TraceRecord) -> Result<(), DispatcherError> {
        self.enqueue(move |sink: Arc<S>| async move { sink.write(&record).await }.boxed())
            .await
    }

    /// Enqueue a flush of the sink's buffers
    pub async fn enqueue_flush(&self) -> Result<(), DispatcherError> {
        self.enqueue(|sink: Arc<S>| async move { sink.flush().await }.boxed())
            .await
    }

    async fn enqueue_request(&self, request: WriteRequest<S>) -> Result<(), DispatcherError> {
        if self.state() != DispatcherState::Running {
            self.inner.metrics.inc_rejected();
            return Err(DispatcherError::queue_closed(&self.inner.sink_name));
        }
        match self.inner.queue.push(request).await {
            Ok(()) => {
                self.inner.metrics.inc_enqueued();
                Ok(())
            }
            Err(_) => {
                self.inner.metrics.inc_rejected();
                Err(DispatcherError::queue_closed(&self.inner.sink_name))
            }
        }
    }

    /// Run a closure against the sink under the same lock the serial worker
    /// uses
    ///
    /// This is the cooperation point for external writers sharing a sink
    /// the dispatcher does not own: while the closure runs, the worker will
    /// not invoke requests against the sink. When no guard is needed the
    /// closure runs directly.
    pub async fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        match &self.inner.sink_guard {
            Some(lock) => {
                let _held = lock.lock().await;
                f(&self.inner.sink)
            }
            None => f(&self.inner.sink),
        }
    }

    /// Close with the configured timeout (indefinite by default)
    pub async fn close(&self) -> CloseOutcome {
        self.close_inner(None).await
    }

    /// Close, waiting at most `timeout` for the drain
    pub async fn close_with_timeout(&self, timeout: Duration) -> CloseOutcome {
        self.close_inner(Some(timeout)).await
    }

    #[instrument(name = "dispatcher_close", skip(self, timeout_override), fields(sink = %self.inner.sink_name))]
    async fn close_inner(&self, timeout_override: Option<Duration>) -> CloseOutcome {
        let won = self
            .inner
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !won {
            // a close is (or was) already in flight; report its outcome
            return self.wait_outcome().await;
        }

        debug!(sink = %self.inner.sink_name, "Dispatcher shutting down");
        self.inner.queue.close().await;

        let handles = std::mem::take(&mut *self.inner.workers.lock().await);
        let monitor = Arc::clone(&self.inner);
        tokio::spawn(async move {
            monitor.finish_drain(handles).await;
        });

        let timeout = timeout_override.or(self.inner.close_timeout);
        let outcome = match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.wait_drained()).await {
                    Ok(()) => CloseOutcome::Completed,
                    Err(_) => {
                        warn!(
                            sink = %self.inner.sink_name,
                            timeout_ms = limit.as_millis() as u64,
                            "Close timed out, drain continues in background"
                        );
                        CloseOutcome::TimedOut
                    }
                }
            }
            None => {
                self.wait_drained().await;
                CloseOutcome::Completed
            }
        };

        let _ = self.inner.outcome.send(Some(outcome));
        outcome
    }

    async fn wait_drained(&self) {
        let mut rx = self.inner.drained.subscribe();
        let _ = rx.wait_for(|drained| *drained).await;
    }

    async fn wait_outcome(&self) -> CloseOutcome {
        let mut rx = self.inner.outcome.subscribe();
        let result = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => (*outcome).unwrap_or(CloseOutcome::Completed),
            // the sender lives in Inner, so this only happens at teardown
            Err(_) => CloseOutcome::Completed,
        };
        result
    }
}

impl<S: TraceSink + Send + Sync + 'static> Inner<S> {
    /// Join the workers, release the sink if owned, flip to Closed
    ///
    /// Runs to completion even when the close caller gave up waiting, so a
    /// timed-out close still ends at Closed with the sink released at most
    /// once.
    async fn finish_drain(self: Arc<Self>, handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            if let Err(e) = handle.await {
                error!(sink = %self.sink_name, error = ?e, "Worker task panicked");
            }
        }

        if self.owns_sink {
            if let Err(e) = self.sink.flush().await {
                error!(sink = %self.sink_name, error = %e, "Flush failed on shutdown");
            }
            if let Err(e) = self.sink.close().await {
                error!(sink = %self.sink_name, error = %e, "Close failed on shutdown");
            }
        }

        self.state.store(STATE_CLOSED, Ordering::Release);
        let _ = self.drained.send(true);
        debug!(sink = %self.sink_name, "Dispatcher drain complete");
    }
}

fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
