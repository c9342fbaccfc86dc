//! Concrete sink implementations and the config-driven factory

mod console;
mod file;
mod log;
mod network;

pub use console::{ConsoleSink, ConsoleStream};
pub use file::{FileSink, FileSinkConfig};
pub use log::LogSink;
pub use network::{NetworkFormat, NetworkSink, NetworkSinkConfig};

use contracts::{ContractError, SinkConfig, SinkKind, TraceRecord, TraceSink};

use crate::error::DispatcherError;

/// A sink built from configuration
///
/// Delegates every capability to the wrapped sink, so the dispatcher picks
/// its engine mode from the concrete sink's own declaration.
pub enum AnySink {
    Console(ConsoleSink),
    Log(LogSink),
    File(FileSink),
    Network(NetworkSink),
}

impl TraceSink for AnySink {
    fn name(&self) -> &str {
        match self {
            AnySink::Console(sink) => sink.name(),
            AnySink::Log(sink) => sink.name(),
            AnySink::File(sink) => sink.name(),
            AnySink::Network(sink) => sink.name(),
        }
    }

    fn is_concurrency_safe(&self) -> bool {
        match self {
            AnySink::Console(sink) => sink.is_concurrency_safe(),
            AnySink::Log(sink) => sink.is_concurrency_safe(),
            AnySink::File(sink) => sink.is_concurrency_safe(),
            AnySink::Network(sink) => sink.is_concurrency_safe(),
        }
    }

    async fn write(&self, record: &TraceRecord) -> Result<(), ContractError> {
        match self {
            AnySink::Console(sink) => sink.write(record).await,
            AnySink::Log(sink) => sink.write(record).await,
            AnySink::File(sink) => sink.write(record).await,
            AnySink::Network(sink) => sink.write(record).await,
        }
    }

    async fn flush(&self) -> Result<(), ContractError> {
        match self {
            AnySink::Console(sink) => sink.flush().await,
            AnySink::Log(sink) => sink.flush().await,
            AnySink::File(sink) => sink.flush().await,
            AnySink::Network(sink) => sink.flush().await,
        }
    }

    async fn close(&self) -> Result<(), ContractError> {
        match self {
            AnySink::Console(sink) => sink.close().await,
            AnySink::Log(sink) => sink.close().await,
            AnySink::File(sink) => sink.close().await,
            AnySink::Network(sink) => sink.close().await,
        }
    }
}

/// Build a sink from configuration
pub async fn build_sink(config: &SinkConfig) -> Result<AnySink, DispatcherError> {
    config.validate()?;
    match config.kind {
        SinkKind::Console => Ok(AnySink::Console(ConsoleSink::from_params(
            &config.name,
            &config.params,
        )?)),
        SinkKind::Log => Ok(AnySink::Log(LogSink::new(&config.name))),
        SinkKind::File => Ok(AnySink::File(FileSink::from_params(
            &config.name,
            &config.params,
        )?)),
        SinkKind::Network => Ok(AnySink::Network(
            NetworkSink::from_params(&config.name, &config.params).await?,
        )),
    }
}
