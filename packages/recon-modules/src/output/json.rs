//! Newline-delimited JSON output.
//!
//! One event per line in the event wire shape, to `output_file` when
//! configured and stdout otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use recon_core::{
    ConfigError, Event, EventType, ModuleError, ModuleMeta, ModuleResult, OutputModule,
    ScanConfig, SetupOutcome,
};
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const NAME: &str = "json";

/// `output_modules.json` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonOutputConfig {
    #[serde(default)]
    pub output_file: Option<PathBuf>,
}

type Sink = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

enum SinkState {
    Unopened,
    Open(Sink),
    /// Closed by `finish`; the file is never reopened.
    Finished,
}

/// Writes every event as one JSON line.
pub struct JsonOutput {
    meta: ModuleMeta,
    config: JsonOutputConfig,
    sink: Mutex<SinkState>,
}

impl JsonOutput {
    pub fn new(config: JsonOutputConfig) -> Self {
        Self {
            meta: ModuleMeta::new(NAME)
                .watches(EventType::ANY)
                .description("Output to newline-delimited JSON")
                .option(
                    "output_file",
                    serde_json::json!(""),
                    "Output to file (stdout when empty)",
                ),
            config,
            sink: Mutex::new(SinkState::Unopened),
        }
    }

    pub fn from_scan_config(scan: &ScanConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(scan.output_module_config(NAME)?))
    }

    async fn open(&self) -> ModuleResult<Sink> {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = match &self.config.output_file {
            Some(path) if !path.as_os_str().is_empty() => {
                let file = tokio::fs::File::create(path).await.map_err(|e| {
                    ModuleError::Config(format!("cannot create {}: {}", path.display(), e))
                })?;
                debug!(path = %path.display(), "writing events to file");
                Box::new(file)
            }
            _ => Box::new(tokio::io::stdout()),
        };
        Ok(BufWriter::new(writer))
    }
}

#[async_trait]
impl OutputModule for JsonOutput {
    fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    async fn setup(&self) -> ModuleResult<SetupOutcome> {
        let sink = self.open().await?;
        *self.sink.lock().await = SinkState::Open(sink);
        Ok(SetupOutcome::Ready)
    }

    async fn handle_event(&self, event: Arc<Event>) -> ModuleResult<()> {
        let mut line = serde_json::to_vec(event.as_ref()).map_err(ModuleError::other)?;
        line.push(b'\n');

        let mut state = self.sink.lock().await;
        if matches!(*state, SinkState::Unopened) {
            *state = SinkState::Open(self.open().await?);
        }
        match &mut *state {
            SinkState::Open(sink) => sink.write_all(&line).await.map_err(ModuleError::other)?,
            _ => warn!(event = %event, "output already finished, event dropped"),
        }
        Ok(())
    }

    async fn report(&self) -> ModuleResult<()> {
        if let SinkState::Open(sink) = &mut *self.sink.lock().await {
            sink.flush().await.map_err(ModuleError::other)?;
        }
        Ok(())
    }

    async fn finish(&self) -> ModuleResult<()> {
        let state = std::mem::replace(&mut *self.sink.lock().await, SinkState::Finished);
        if let SinkState::Open(mut sink) = state {
            sink.flush().await.map_err(ModuleError::other)?;
            sink.shutdown().await.map_err(ModuleError::other)?;
        }
        Ok(())
    }
}
