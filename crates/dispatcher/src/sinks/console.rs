//! ConsoleSink - line-oriented stdout/stderr output

use std::collections::HashMap;
use std::io::Write;

use contracts::{ContractError, TraceRecord, TraceSink};
use tracing::debug;

/// Target stream for a [`ConsoleSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsoleStream {
    #[default]
    Stdout,
    Stderr,
}

/// Sink that writes one line per record to the process console
///
/// Each write takes the stdio lock, so concurrent invocations are safe.
pub struct ConsoleSink {
    name: String,
    stream: ConsoleStream,
}

impl ConsoleSink {
    /// Create a new ConsoleSink on the given stream
    pub fn new(name: impl Into<String>, stream: ConsoleStream) -> Self {
        Self {
            name: name.into(),
            stream,
        }
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let stream = match params.get("stream").map(String::as_str) {
            Some("stderr") => ConsoleStream::Stderr,
            Some("stdout") | None => ConsoleStream::Stdout,
            Some(other) => {
                return Err(ContractError::config_validation(
                    format!("sinks[{name}].params.stream"),
                    format!("unknown stream '{other}'"),
                ))
            }
        };
        Ok(Self::new(name, stream))
    }

    fn write_line(&self, record: &TraceRecord) -> std::io::Result<()> {
        match self.stream {
            ConsoleStream::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{record}")
            }
            ConsoleStream::Stderr => {
                let mut out = std::io::stderr().lock();
                writeln!(out, "{record}")
            }
        }
    }
}

impl TraceSink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_concurrency_safe(&self) -> bool {
        true
    }

    async fn write(&self, record: &TraceRecord) -> Result<(), ContractError> {
        self.write_line(record)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    async fn flush(&self) -> Result<(), ContractError> {
        match self.stream {
            ConsoleStream::Stdout => std::io::stdout().lock().flush()?,
            ConsoleStream::Stderr => std::io::stderr().lock().flush()?,
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "ConsoleSink closed");
        Ok(())
    }
}
