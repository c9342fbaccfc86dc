//! LogSink - forwards records as tracing events

use contracts::{ContractError, Severity, TraceRecord, TraceSink};
use tracing::{debug, error, info, instrument, trace, warn};

/// Sink that re-emits records into the tracing pipeline, mainly for
/// debugging a dispatch setup without any real I/O target
pub struct LogSink {
    name: String,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn emit(&self, record: &TraceRecord) {
        match record.severity {
            Severity::Trace => {
                trace!(sink = %self.name, source = %record.source, "{}", record.message)
            }
            Severity::Debug => {
                debug!(sink = %self.name, source = %record.source, "{}", record.message)
            }
            Severity::Info => {
                info!(sink = %self.name, source = %record.source, "{}", record.message)
            }
            Severity::Warn => {
                warn!(sink = %self.name, source = %record.source, "{}", record.message)
            }
            Severity::Error | Severity::Critical => {
                error!(sink = %self.name, source = %record.source, "{}", record.message)
            }
        }
    }
}

impl TraceSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_concurrency_safe(&self) -> bool {
        true
    }

    #[instrument(name = "log_sink_write", skip(self, record), fields(sink = %self.name))]
    async fn write(&self, record: &TraceRecord) -> Result<(), ContractError> {
        self.emit(record);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ContractError> {
        // Nothing to flush for log sink
        Ok(())
    }

    async fn close(&self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
