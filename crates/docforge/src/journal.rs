use parking_lot::Mutex;

use crate::severity::LogRecord;

/// Shared record of every diagnostic seen across the run units of a pass.
///
/// Multiple backend/language units may feed one journal so combined
/// reporting can work from a single stream.
pub trait DiagnosticJournal: Send + Sync {
    fn append(&self, record: LogRecord);
    fn snapshot(&self) -> Vec<LogRecord>;
}

#[derive(Default)]
pub struct InMemoryJournal {
    records: Mutex<Vec<LogRecord>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticJournal for InMemoryJournal {
    fn append(&self, record: LogRecord) {
        self.records.lock().push(record);
    }

    fn snapshot(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }
}
