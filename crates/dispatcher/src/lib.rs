//! # Dispatcher
//!
//! 写后置（write-behind）分发模块。
//!
//! 负责：
//! - 缓冲调用方提交的写请求，调用方永不阻塞在 sink I/O 上
//! - 按 sink 的并发能力选择串行或并行引擎
//! - 协作式关闭：排空队列、限时等待、幂等
//! - 单请求故障隔离，失败上报 FailureReporter

pub mod dispatcher;
pub mod error;
pub mod failure;
pub mod metrics;
pub mod sinks;

mod engine;
mod queue;

pub use contracts::{DispatcherConfig, SinkConfig, SinkKind, TraceSink};
pub use dispatcher::{CloseOutcome, Dispatcher, DispatcherState, WriteRequest};
pub use error::DispatcherError;
pub use failure::FailureReporter;
pub use metrics::{DispatchMetrics, MetricsSnapshot};
pub use sinks::{build_sink, AnySink, ConsoleSink, ConsoleStream, FileSink, LogSink, NetworkSink};
