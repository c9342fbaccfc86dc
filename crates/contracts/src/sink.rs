//! TraceSink trait - Dispatcher output interface
//!
//! Defines the minimal capability a sink must expose to the dispatcher.

use crate::{ContractError, TraceRecord};

/// Trace output trait
///
/// All sink implementations must implement this trait. The dispatcher reads
/// `name` and `is_concurrency_safe` once at construction; everything else it
/// learns about the sink arrives through the write requests themselves.
#[trait_variant::make(TraceSink: Send)]
pub trait LocalTraceSink {
    /// Sink name (used for logging/metrics and failure reports)
    fn name(&self) -> &str;

    /// Whether the sink tolerates concurrent write invocations
    ///
    /// `true` selects the parallel dispatch engine; `false` the serial one.
    fn is_concurrency_safe(&self) -> bool;

    /// Persist one trace record
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn write(&self, record: &TraceRecord) -> Result<(), ContractError>;

    /// Flush buffered records (if any)
    async fn flush(&self) -> Result<(), ContractError>;

    /// Close sink and release its resources
    async fn close(&self) -> Result<(), ContractError>;
}
