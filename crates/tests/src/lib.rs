//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 分发语义验证（顺序 / 背压 / 扇出 / 故障隔离）
//! - 关闭协调验证（幂等 / 限时 / 后台收尾）
//! - 配置到运行的端到端链路

#[cfg(test)]
mod support {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use contracts::{ContractError, TraceRecord, TraceSink};
    use tokio::sync::Semaphore;

    /// Sink whose writes park on a semaphore until the test releases them
    pub struct GatedSink {
        pub name: String,
        pub concurrency_safe: bool,
        pub gate: Arc<Semaphore>,
        pub writes: AtomicU64,
        pub closes: AtomicU64,
    }

    impl GatedSink {
        pub fn new(name: &str, concurrency_safe: bool) -> Self {
            Self {
                name: name.to_string(),
                concurrency_safe,
                gate: Arc::new(Semaphore::new(0)),
                writes: AtomicU64::new(0),
                closes: AtomicU64::new(0),
            }
        }

        /// Let `n` parked or future writes proceed
        pub fn release(&self, n: usize) {
            self.gate.add_permits(n);
        }
    }

    impl TraceSink for GatedSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_concurrency_safe(&self) -> bool {
            self.concurrency_safe
        }

        async fn write(&self, _record: &TraceRecord) -> Result<(), ContractError> {
            match self.gate.acquire().await {
                Ok(permit) => permit.forget(),
                Err(_) => return Err(ContractError::sink_write(&self.name, "gate closed")),
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn flush(&self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ContractError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sink recording message payloads in arrival order
    pub struct RecordingSink {
        pub name: String,
        pub concurrency_safe: bool,
        pub messages: Mutex<Vec<String>>,
        pub fail_on: Option<String>,
    }

    impl RecordingSink {
        pub fn new(name: &str, concurrency_safe: bool) -> Self {
            Self {
                name: name.to_string(),
                concurrency_safe,
                messages: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        pub fn failing_on(name: &str, message: &str) -> Self {
            Self {
                fail_on: Some(message.to_string()),
                ..Self::new(name, false)
            }
        }
    }

    impl TraceSink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_concurrency_safe(&self) -> bool {
            self.concurrency_safe
        }

        async fn write(&self, record: &TraceRecord) -> Result<(), ContractError> {
            if self.fail_on.as_deref() == Some(record.message.as_str()) {
                return Err(ContractError::sink_write(&self.name, "injected failure"));
            }
            self.messages.lock().unwrap().push(record.message.clone());
            Ok(())
        }

        async fn flush(&self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ContractError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod dispatch_tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use contracts::{DispatcherConfig, Severity, TraceRecord};
    use dispatcher::{CloseOutcome, Dispatcher, DispatcherError, DispatcherState};

    use crate::support::{GatedSink, RecordingSink};

    fn record(message: impl Into<String>) -> TraceRecord {
        TraceRecord::new(Severity::Info, "tests", message)
    }

    /// Serial mode delivers in exact enqueue order
    #[tokio::test]
    async fn test_serial_fifo_order() {
        let dispatcher = Dispatcher::spawn(
            RecordingSink::new("ordered", false),
            DispatcherConfig::default(),
        )
        .unwrap();

        for i in 0..1000 {
            dispatcher
                .enqueue_record(record(format!("{i:04}")))
                .await
                .unwrap();
        }
        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);

        dispatcher
            .with_sink(|sink| {
                let messages = sink.messages.lock().unwrap();
                assert_eq!(messages.len(), 1000);
                let expected: Vec<String> = (0..1000).map(|i| format!("{i:04}")).collect();
                assert_eq!(*messages, expected);
            })
            .await;
    }

    /// A bounded queue suspends producers at capacity and releases them as
    /// the worker consumes
    #[tokio::test]
    async fn test_bounded_capacity_applies_backpressure() {
        let config = DispatcherConfig {
            capacity: Some(1),
            ..Default::default()
        };
        let dispatcher = Dispatcher::spawn(GatedSink::new("slow", false), config).unwrap();

        // first request ends up parked inside the sink write
        dispatcher.enqueue_record(record("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // second fills the single buffer slot
        dispatcher.enqueue_record(record("b")).await.unwrap();

        // third must suspend: the queue holds `capacity` unconsumed items
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), dispatcher.enqueue_record(record("c")))
                .await;
        assert!(blocked.is_err(), "enqueue should not return while full");

        // unblock the sink; the freed slot lets a new enqueue through
        dispatcher.with_sink(|sink| sink.release(10)).await;
        tokio::time::timeout(Duration::from_secs(1), dispatcher.enqueue_record(record("d")))
            .await
            .expect("enqueue should unblock after a worker consumed")
            .unwrap();

        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);
        dispatcher
            .with_sink(|sink| assert_eq!(sink.writes.load(Ordering::SeqCst), 3))
            .await;
    }

    /// Parallel fan-out delivers each request exactly once
    #[tokio::test]
    async fn test_parallel_fanout_exactly_once() {
        let config = DispatcherConfig {
            parallelism: Some(4),
            ..Default::default()
        };
        let sink = GatedSink::new("pool", true);
        sink.release(20_000);
        let dispatcher = Dispatcher::spawn(sink, config).unwrap();

        let mut producers = Vec::new();
        for p in 0..4 {
            let dispatcher = dispatcher.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..2500 {
                    dispatcher
                        .enqueue_record(record(format!("p{p}-{i}")))
                        .await
                        .unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);

        let snapshot = dispatcher.metrics();
        assert_eq!(snapshot.enqueued, 10_000);
        assert_eq!(snapshot.delivered, 10_000);
        assert_eq!(snapshot.pending, 0);
        dispatcher
            .with_sink(|sink| assert_eq!(sink.writes.load(Ordering::SeqCst), 10_000))
            .await;
    }

    /// One failing request never stops delivery of the rest
    #[tokio::test]
    async fn test_failure_isolation() {
        let dispatcher = Dispatcher::spawn(
            RecordingSink::failing_on("flaky", "boom"),
            DispatcherConfig::default(),
        )
        .unwrap();

        for i in 0..10 {
            let message = if i == 4 { "boom".to_string() } else { format!("ok-{i}") };
            dispatcher.enqueue_record(record(message)).await.unwrap();
        }
        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);

        let snapshot = dispatcher.metrics();
        assert_eq!(snapshot.delivered, 9);
        assert_eq!(snapshot.failed, 1);
        dispatcher
            .with_sink(|sink| {
                let messages = sink.messages.lock().unwrap();
                assert_eq!(messages.len(), 9);
                assert!(!messages.iter().any(|m| m == "boom"));
            })
            .await;
    }

    /// Close is idempotent and both calls observe the same outcome
    #[tokio::test]
    async fn test_close_twice_same_outcome() {
        let dispatcher = Dispatcher::spawn(
            RecordingSink::new("twice", false),
            DispatcherConfig::default(),
        )
        .unwrap();
        dispatcher.enqueue_record(record("x")).await.unwrap();

        let first = dispatcher.close().await;
        let second = dispatcher.close().await;
        assert_eq!(first, CloseOutcome::Completed);
        assert_eq!(first, second);
        assert_eq!(dispatcher.state(), DispatcherState::Closed);
        assert_eq!(dispatcher.metrics().pending, 0);
    }

    /// Enqueue after close fails even while buffered items are undelivered
    #[tokio::test]
    async fn test_enqueue_after_close_rejected() {
        let config = DispatcherConfig {
            close_timeout_ms: Some(50),
            ..Default::default()
        };
        let dispatcher = Dispatcher::spawn(GatedSink::new("draining", false), config).unwrap();
        for i in 0..3 {
            dispatcher.enqueue_record(record(format!("{i}"))).await.unwrap();
        }

        // the gate is shut, so the drain cannot finish inside the timeout
        assert_eq!(dispatcher.close().await, CloseOutcome::TimedOut);
        let err = dispatcher.enqueue_record(record("late")).await.unwrap_err();
        assert!(matches!(err, DispatcherError::QueueClosed { .. }));

        dispatcher.with_sink(|sink| sink.release(10)).await;
    }

    /// A timed-out close keeps draining in the background until Closed
    #[tokio::test]
    async fn test_timed_out_close_finishes_in_background() {
        let dispatcher = Dispatcher::spawn(
            GatedSink::new("slow_drain", false),
            DispatcherConfig::default(),
        )
        .unwrap();
        for i in 0..5 {
            dispatcher.enqueue_record(record(format!("{i}"))).await.unwrap();
        }

        let outcome = dispatcher.close_with_timeout(Duration::from_millis(50)).await;
        assert_eq!(outcome, CloseOutcome::TimedOut);
        assert_ne!(dispatcher.state(), DispatcherState::Closed);

        // repeated close reports the already-published outcome
        assert_eq!(dispatcher.close().await, CloseOutcome::TimedOut);

        dispatcher.with_sink(|sink| sink.release(100)).await;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while dispatcher.state() != DispatcherState::Closed {
            assert!(
                tokio::time::Instant::now() < deadline,
                "drain never reached Closed"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        dispatcher
            .with_sink(|sink| {
                assert_eq!(sink.writes.load(Ordering::SeqCst), 5);
                // sink released exactly once despite the timed-out close
                assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
            })
            .await;
    }

    /// Opaque closure requests and queued flushes ride the same queue
    #[tokio::test]
    async fn test_enqueue_closure_and_flush() {
        use contracts::TraceSink;
        use futures::FutureExt;
        use std::sync::Arc;

        let dispatcher = Dispatcher::spawn(
            RecordingSink::new("closures", false),
            DispatcherConfig::default(),
        )
        .unwrap();

        dispatcher
            .enqueue(|sink: Arc<RecordingSink>| {
                async move {
                    let record = TraceRecord::new(Severity::Debug, "tests", "from closure");
                    sink.write(&record).await
                }
                .boxed()
            })
            .await
            .unwrap();
        dispatcher.enqueue_flush().await.unwrap();
        dispatcher.enqueue_record(record("after flush")).await.unwrap();

        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);

        dispatcher
            .with_sink(|sink| {
                let messages = sink.messages.lock().unwrap();
                assert_eq!(*messages, vec!["from closure", "after flush"]);
            })
            .await;
        assert_eq!(dispatcher.metrics().delivered, 3);
    }

    /// with_sink waits for the in-flight invocation on a shared unowned sink
    #[tokio::test]
    async fn test_with_sink_excludes_serial_worker() {
        let config = DispatcherConfig {
            owns_sink: false,
            ..Default::default()
        };
        let sink = GatedSink::new("guarded", false);
        // release the gate without going through the guarded sink access
        let gate = sink.gate.clone();
        let dispatcher = Dispatcher::spawn(sink, config).unwrap();

        // park the worker inside a write while it holds the sink guard
        dispatcher.enqueue_record(record("parked")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let external = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.with_sink(|_sink| ()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            !external.is_finished(),
            "external access should wait for the guarded write"
        );

        gate.add_permits(10);
        tokio::time::timeout(Duration::from_secs(1), external)
            .await
            .expect("external access should proceed once the write finished")
            .unwrap();

        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);
    }

    /// An unowned sink is never released by close
    #[tokio::test]
    async fn test_unowned_sink_kept_open() {
        let config = DispatcherConfig {
            owns_sink: false,
            ..Default::default()
        };
        let sink = GatedSink::new("shared", false);
        sink.release(100);
        let dispatcher = Dispatcher::spawn(sink, config).unwrap();
        dispatcher.enqueue_record(record("x")).await.unwrap();
        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);

        dispatcher
            .with_sink(|sink| assert_eq!(sink.closes.load(Ordering::SeqCst), 0))
            .await;
    }
}

#[cfg(test)]
mod e2e_tests {
    use contracts::{Severity, TraceRecord};
    use config_loader::{ConfigFormat, ConfigLoader};
    use dispatcher::{build_sink, CloseOutcome, Dispatcher};

    /// Blueprint -> factory -> dispatcher -> file, read back what was written
    #[tokio::test]
    async fn test_e2e_config_to_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.jsonl");

        let content = format!(
            r#"
[dispatcher]
capacity = 100
close_timeout_ms = 5000

[[sinks]]
name = "audit"
kind = "file"
[sinks.params]
path = "{}"
"#,
            path.display()
        );

        let blueprint = ConfigLoader::load_from_str(&content, ConfigFormat::Toml).unwrap();
        assert_eq!(blueprint.sinks.len(), 1);

        let sink = build_sink(&blueprint.sinks[0]).await.unwrap();
        let dispatcher = Dispatcher::spawn(sink, blueprint.dispatcher.clone()).unwrap();

        for i in 0..20 {
            let record = TraceRecord::new(Severity::Info, "e2e", format!("event {i}"));
            dispatcher.enqueue_record(record).await.unwrap();
        }
        assert_eq!(dispatcher.close().await, CloseOutcome::Completed);

        let snapshot = dispatcher.metrics();
        observability::record_dispatch_snapshot(
            dispatcher.name(),
            snapshot.enqueued,
            snapshot.delivered,
            snapshot.failed,
            snapshot.pending,
        );
        assert_eq!(snapshot.delivered, 20);

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 20);
        let first: TraceRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.message, "event 0");
        let last: TraceRecord = serde_json::from_str(lines[19]).unwrap();
        assert_eq!(last.message, "event 19");
    }
}
