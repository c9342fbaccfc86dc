//! FileSink - appends records to a JSON-lines file

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use contracts::{ContractError, TraceRecord, TraceSink};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file path
    pub path: PathBuf,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .ok_or_else(|| "missing 'path' parameter".to_string())?;
        Ok(Self { path })
    }
}

/// Sink that appends one JSON object per record
///
/// The buffered writer is not safe for concurrent use, so this sink runs
/// under the serial dispatch engine.
pub struct FileSink {
    name: String,
    writer: Mutex<BufWriter<File>>,
}

impl FileSink {
    /// Create a new FileSink, creating parent directories as needed
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> std::io::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;

        Ok(Self {
            name: name.into(),
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let config = FileSinkConfig::from_params(params)
            .map_err(|e| ContractError::config_validation(format!("sinks[{name}]"), e))?;
        Self::new(name.clone(), config)
            .map_err(|e| ContractError::sink_write(name, e.to_string()))
    }

    fn encode(&self, record: &TraceRecord) -> Result<String, ContractError> {
        serde_json::to_string(record)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }
}

impl TraceSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_concurrency_safe(&self) -> bool {
        false
    }

    #[instrument(name = "file_sink_write", skip(self, record), fields(sink = %self.name))]
    async fn write(&self, record: &TraceRecord) -> Result<(), ContractError> {
        let line = self.encode(record)?;
        let mut writer = self.writer.lock().await;
        writeln!(writer, "{line}")
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }

    #[instrument(name = "file_sink_flush", skip(self))]
    async fn flush(&self) -> Result<(), ContractError> {
        self.writer.lock().await.flush()?;
        Ok(())
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        let mut writer = self.writer.lock().await;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
