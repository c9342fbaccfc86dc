//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Enqueue attempted after shutdown began
    #[error("dispatch queue for sink '{sink_name}' is closed")]
    QueueClosed { sink_name: String },

    /// Contract-level error (config validation, sink creation)
    #[error("contract error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create a queue-closed error
    pub fn queue_closed(sink_name: impl Into<String>) -> Self {
        Self::QueueClosed {
            sink_name: sink_name.into(),
        }
    }
}
