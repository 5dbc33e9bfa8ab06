use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord};

/// Builder configuring where yield-model telemetry goes.
pub struct YieldTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    console: bool,
    min_level: LogLevel,
}

impl YieldTelemetryBuilder {
    /// Creates a new builder for the given module label.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            console: false,
            min_level: LogLevel::Info,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Mirrors records to stdout as human-readable lines.
    #[must_use]
    pub const fn console(mut self, enabled: bool) -> Self {
        self.console = enabled;
        self
    }

    /// Drops records below this level.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Finalizes the builder, opening the log file if one was configured.
    pub fn build(self) -> Result<YieldTelemetry> {
        let logger = self.log_path.map(JsonLogger::new).transpose()?;
        Ok(YieldTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                console: self.console,
                min_level: self.min_level,
            }),
        })
    }
}

/// Cloneable telemetry handle shared by the preparer, trainer, and predictor.
#[derive(Clone)]
pub struct YieldTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for YieldTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YieldTelemetry")
            .field("module", &self.inner.module)
            .field("console", &self.inner.console)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    console: bool,
    min_level: LogLevel,
}

impl YieldTelemetry {
    /// Returns a builder for this telemetry helper.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> YieldTelemetryBuilder {
        YieldTelemetryBuilder::new(module)
    }

    /// Logs a structured record to the configured sinks.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if level < self.inner.min_level {
            return Ok(());
        }
        let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
        if self.inner.console {
            println!("{}", record.console_line());
        }
        if let Some(logger) = &self.inner.logger {
            logger.log(&record)?;
        }
        Ok(())
    }
}

/// Logs through optional telemetry. Sink failures never interrupt the caller.
pub(crate) fn emit(
    telemetry: Option<&YieldTelemetry>,
    level: LogLevel,
    message: &str,
    metadata: Value,
) {
    if let Some(telemetry) = telemetry {
        let _ = telemetry.log(level, message, metadata);
    }
}
