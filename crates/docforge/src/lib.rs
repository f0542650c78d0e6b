pub mod attributes;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod journal;
pub mod service;
pub mod severity;
pub mod workspace;

pub use attributes::{
    AttributeMap, AttributeProvider, AttributeResolver, AttributeValue, DEFERRED_PLACEHOLDER,
    OVERRIDE_MARKER,
};
pub use engine::{ConversionEngine, EngineFault, LogSink};
pub use error::DocforgeError;
pub use executor::{
    ExecutionReport, LogAccumulator, LogInterceptingExecutor, LogPolicy, RunConfiguration,
    SafeMode, find_highest_failure_level,
};
pub use filter::{DEFAULT_INCLUDES, PatternFilter, UNDERSCORE_EXCLUDE, resolve_secondary};
pub use journal::{DiagnosticJournal, InMemoryJournal};
pub use service::{ConversionService, PassReport, ServiceOptions};
pub use severity::{LogRecord, Severity, SourceLocation};
pub use workspace::{ResourceEntry, ResourceSpec, Workspace, WorkspaceBuilder};
