use std::path::Path;

use thiserror::Error;

use crate::executor::RunConfiguration;
use crate::severity::LogRecord;

/// Synchronous delivery path for engine diagnostics. The sink is the only
/// way diagnostics reach the orchestration layer; there is no polling.
pub trait LogSink {
    fn log(&mut self, record: LogRecord);
}

/// Unrecoverable fault raised by the conversion engine itself.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct EngineFault {
    message: String,
}

impl EngineFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The external document conversion engine, invoked as a black box.
///
/// `convert` is called once per primary source file. It blocks until the
/// file is converted, emitting diagnostics through `sink` as they occur.
pub trait ConversionEngine: Send + Sync {
    fn convert(
        &self,
        source: &Path,
        run: &RunConfiguration,
        sink: &mut dyn LogSink,
    ) -> Result<(), EngineFault>;
}
