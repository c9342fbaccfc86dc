//! 分发指标收集模块
//!
//! 基于 MetricsSnapshot 与单次分发事件收集运行指标。

use metrics::{counter, gauge};

/// 记录一次写请求分发结果
///
/// worker 每完成一次请求调用后由宿主上报。
pub fn record_request_dispatched(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "trace_relay_requests_dispatched_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录被拒绝的入队尝试 (关闭后到达)
pub fn record_request_rejected(sink_name: &str) {
    counter!(
        "trace_relay_requests_rejected_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// 记录队列积压深度
pub fn record_queue_pending(sink_name: &str, pending: u64) {
    gauge!(
        "trace_relay_queue_pending",
        "sink" => sink_name.to_string()
    )
    .set(pending as f64);
}

/// 记录一次 close 结果
pub fn record_close_outcome(sink_name: &str, timed_out: bool) {
    let outcome = if timed_out { "timed_out" } else { "completed" };
    counter!(
        "trace_relay_close_total",
        "sink" => sink_name.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 从指标快照批量上报
///
/// # Example
///
/// ```ignore
/// use observability::metrics::record_dispatch_snapshot;
///
/// let snapshot = dispatcher.metrics();
/// record_dispatch_snapshot(dispatcher.name(), snapshot.enqueued, snapshot.delivered, snapshot.failed, snapshot.pending);
/// ```
pub fn record_dispatch_snapshot(
    sink_name: &str,
    enqueued: u64,
    delivered: u64,
    failed: u64,
    pending: u64,
) {
    let sink = sink_name.to_string();
    gauge!("trace_relay_requests_enqueued", "sink" => sink.clone()).set(enqueued as f64);
    gauge!("trace_relay_requests_delivered", "sink" => sink.clone()).set(delivered as f64);
    gauge!("trace_relay_requests_failed", "sink" => sink.clone()).set(failed as f64);
    gauge!("trace_relay_queue_pending", "sink" => sink).set(pending as f64);
}
