//! Dispatch engine - worker loops that drain the queue into the sink

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use contracts::TraceSink;

use crate::dispatcher::WriteRequest;
use crate::failure::FailureReporter;
use crate::metrics::DispatchMetrics;
use crate::queue::QueueReceiver;

/// Start the single serial worker
///
/// Preserves enqueue order end-to-end. `guard` is present when the
/// dispatcher does not own a sink that is not concurrency-safe: external
/// code may be writing to the same sink, so each invocation takes the lock
/// scoped to the sink handle.
pub(crate) fn spawn_serial<S: TraceSink + Send + Sync + 'static>(
    sink: Arc<S>,
    sink_name: String,
    rx: QueueReceiver<WriteRequest<S>>,
    guard: Option<Arc<Mutex<()>>>,
    metrics: Arc<DispatchMetrics>,
) -> Vec<JoinHandle<()>> {
    vec![tokio::spawn(async move {
        serial_worker(sink, sink_name, rx, guard, metrics).await;
    })]
}

/// Start the parallel worker pool
///
/// Each buffered request is delivered to exactly one worker; no ordering is
/// guaranteed across requests. Only valid for concurrency-safe sinks, so no
/// external locking is applied.
pub(crate) fn spawn_parallel<S: TraceSink + Send + Sync + 'static>(
    sink: Arc<S>,
    sink_name: String,
    rx: QueueReceiver<WriteRequest<S>>,
    workers: usize,
    metrics: Arc<DispatchMetrics>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers)
        .map(|worker| {
            let sink = Arc::clone(&sink);
            let sink_name = sink_name.clone();
            let rx = Arc::clone(&rx);
            let metrics = Arc::clone(&metrics);
            tokio::spawn(async move {
                parallel_worker(sink, sink_name, rx, worker, metrics).await;
            })
        })
        .collect()
}

#[instrument(name = "dispatch_worker_loop", skip(sink, rx, guard, metrics), fields(sink = %sink_name))]
async fn serial_worker<S: TraceSink + Send + Sync + 'static>(
    sink: Arc<S>,
    sink_name: String,
    mut rx: QueueReceiver<WriteRequest<S>>,
    guard: Option<Arc<Mutex<()>>>,
    metrics: Arc<DispatchMetrics>,
) {
    debug!(sink = %sink_name, "Dispatch worker started");

    while let Some(request) = rx.recv().await {
        match &guard {
            Some(lock) => {
                let _held = lock.lock().await;
                invoke(&sink, &sink_name, request, &metrics).await;
            }
            None => invoke(&sink, &sink_name, request, &metrics).await,
        }
    }

    debug!(sink = %sink_name, "Dispatch worker stopped");
}

#[instrument(
    name = "dispatch_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %sink_name)
)]
async fn parallel_worker<S: TraceSink + Send + Sync + 'static>(
    sink: Arc<S>,
    sink_name: String,
    rx: Arc<Mutex<QueueReceiver<WriteRequest<S>>>>,
    worker: usize,
    metrics: Arc<DispatchMetrics>,
) {
    debug!(sink = %sink_name, worker, "Dispatch worker started");

    loop {
        // hold the receiver lock only while waiting for the next item, so
        // the other workers can pull while this one is writing
        let request = rx.lock().await.recv().await;
        let Some(request) = request else { break };
        invoke(&sink, &sink_name, request, &metrics).await;
    }

    debug!(sink = %sink_name, worker, "Dispatch worker stopped");
}

/// Invoke one request against the sink with failure isolation
///
/// Errors and panics are forwarded to the failure reporter and never stop
/// the worker loop.
async fn invoke<S: TraceSink + Send + Sync + 'static>(
    sink: &Arc<S>,
    sink_name: &str,
    request: WriteRequest<S>,
    metrics: &DispatchMetrics,
) {
    match AssertUnwindSafe(request(Arc::clone(sink))).catch_unwind().await {
        Ok(Ok(())) => metrics.inc_delivered(),
        Ok(Err(e)) => {
            metrics.inc_failed();
            FailureReporter::global().report(sink_name, &e);
        }
        Err(payload) => {
            metrics.inc_failed();
            FailureReporter::global().report(sink_name, &panic_text(payload));
        }
    }
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "write request panicked".to_string()
    }
}
