//! Dispatcher and sink configuration types
//!
//! Validation rules:
//! - capacity, when bounded, must be > 0
//! - parallelism, when set, must be > 0
//! - close_timeout_ms, when set, must be > 0
//! - sink name must be non-empty

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Default bound on buffered write requests
pub const DEFAULT_CAPACITY: usize = 30_000;

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Bound on buffered requests; `None` disables backpressure entirely
    #[serde(default = "default_capacity")]
    pub capacity: Option<usize>,

    /// Whether the dispatcher releases the sink's resources on close
    #[serde(default = "default_owns_sink")]
    pub owns_sink: bool,

    /// Worker count in parallel mode; defaults to the available processor
    /// count. Ignored in serial mode.
    #[serde(default)]
    pub parallelism: Option<usize>,

    /// Max wait for drain on close, in milliseconds; `None` waits
    /// indefinitely
    #[serde(default)]
    pub close_timeout_ms: Option<u64>,
}

fn default_capacity() -> Option<usize> {
    Some(DEFAULT_CAPACITY)
}

fn default_owns_sink() -> bool {
    true
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            owns_sink: default_owns_sink(),
            parallelism: None,
            close_timeout_ms: None,
        }
    }
}

impl DispatcherConfig {
    /// Configured close timeout as a `Duration`
    pub fn close_timeout(&self) -> Option<Duration> {
        self.close_timeout_ms.map(Duration::from_millis)
    }

    /// Validate field ranges
    ///
    /// Returns the first error encountered, or `Ok(())`.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.capacity == Some(0) {
            return Err(ContractError::config_validation(
                "dispatcher.capacity",
                "capacity must be > 0 when bounded",
            ));
        }
        if self.parallelism == Some(0) {
            return Err(ContractError::config_validation(
                "dispatcher.parallelism",
                "parallelism must be > 0 when set",
            ));
        }
        if self.close_timeout_ms == Some(0) {
            return Err(ContractError::config_validation(
                "dispatcher.close_timeout_ms",
                "close_timeout_ms must be > 0 when set",
            ));
        }
        Ok(())
    }
}

/// Sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink name
    pub name: String,

    /// Sink kind
    pub kind: SinkKind,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl SinkConfig {
    /// Validate the sink entry
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.name.is_empty() {
            return Err(ContractError::config_validation(
                "sinks.name",
                "sink name must be non-empty",
            ));
        }
        match self.kind {
            SinkKind::File if !self.params.contains_key("path") => {
                Err(ContractError::config_validation(
                    format!("sinks[{}].params.path", self.name),
                    "file sink requires a 'path' parameter",
                ))
            }
            SinkKind::Network if !self.params.contains_key("addr") => {
                Err(ContractError::config_validation(
                    format!("sinks[{}].params.addr", self.name),
                    "network sink requires an 'addr' parameter",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Sink kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Plain console output (stdout/stderr)
    Console,
    /// Forward records as tracing events
    Log,
    /// JSON-lines file output
    File,
    /// Network output (UDP)
    Network,
}

/// Top-level configuration document: one dispatcher profile shared by a set
/// of named sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayBlueprint {
    /// Dispatcher profile applied to every sink
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Sinks to dispatch to (one dispatcher per sink)
    pub sinks: Vec<SinkConfig>,
}
