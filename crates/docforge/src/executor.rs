use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::attributes::AttributeMap;
use crate::engine::{ConversionEngine, LogSink};
use crate::error::DocforgeError;
use crate::journal::DiagnosticJournal;
use crate::severity::{LogRecord, Severity};
use crate::workspace::Workspace;

/// Log-failure policy for one run unit: a severity threshold and a set of
/// treat-as-error message patterns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LogPolicy {
    pub fail_on: Severity,
    pub error_patterns: Vec<String>,
}

impl LogPolicy {
    pub fn fail_on(severity: Severity) -> Self {
        Self {
            fail_on: severity,
            ..Self::default()
        }
    }

    pub fn error_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.error_patterns.push(pattern.into());
        self
    }
}

impl Default for LogPolicy {
    fn default() -> Self {
        Self {
            // By default only a fatal diagnostic fails the pass.
            fail_on: Severity::Fatal,
            error_patterns: Vec::new(),
        }
    }
}

/// Safe mode handed to the conversion engine; restricts which filesystem
/// and macro features a document may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum SafeMode {
    #[default]
    Unsafe,
    Safe,
    Server,
    Secure,
}

/// One backend × language unit of work. Built fresh per invocation and
/// never mutated after being handed to the executor.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct RunConfiguration {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub working_source_dir: PathBuf,
    pub output_dir: PathBuf,
    pub attributes: AttributeMap,
    pub safe_mode: SafeMode,
    pub policy: LogPolicy,
}

/// Successful outcome of one run unit.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionReport {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub max_severity: Option<Severity>,
    pub records: Vec<LogRecord>,
}

/// Accumulates diagnostics during one engine invocation: tracks the
/// maximum severity seen and collects every message matching a
/// treat-as-error pattern. Accumulation never terminates the engine early.
pub struct LogAccumulator {
    patterns: Vec<Regex>,
    max_severity: Option<Severity>,
    matched: Vec<String>,
    records: Vec<LogRecord>,
}

impl LogAccumulator {
    pub fn for_policy(policy: &LogPolicy) -> Result<Self, DocforgeError> {
        let patterns = policy
            .error_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            max_severity: None,
            matched: Vec::new(),
            records: Vec::new(),
        })
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.max_severity
    }

    pub fn matched(&self) -> &[String] {
        &self.matched
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }
}

impl LogSink for LogAccumulator {
    fn log(&mut self, record: LogRecord) {
        self.max_severity = Some(match self.max_severity {
            Some(current) => current.max(record.severity),
            None => record.severity,
        });
        if self
            .patterns
            .iter()
            .any(|pattern| pattern.is_match(&record.message))
        {
            self.matched.push(record.message.clone());
        }
        self.records.push(record);
    }
}

/// Wraps engine invocation with log interception and the two failure
/// gates: pattern match and severity threshold.
pub struct LogInterceptingExecutor<E: ConversionEngine> {
    engine: E,
    journal: Option<Arc<dyn DiagnosticJournal>>,
}

impl<E: ConversionEngine> LogInterceptingExecutor<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            journal: None,
        }
    }

    /// Forwards every intercepted diagnostic to a shared journal after the
    /// engine call completes.
    pub fn with_journal(engine: E, journal: Arc<dyn DiagnosticJournal>) -> Self {
        Self {
            engine,
            journal: Some(journal),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Runs the engine over every primary source of `workspace`, then
    /// evaluates both failure gates. Gate evaluation does not
    /// short-circuit; a single violation carries everything that tripped.
    pub fn execute(
        &self,
        workspace: &Workspace,
        run: &RunConfiguration,
    ) -> Result<ExecutionReport, DocforgeError> {
        let mut accumulator = LogAccumulator::for_policy(&run.policy)?;
        tracing::debug!(
            backend = %run.backend,
            language = run.language.as_deref().unwrap_or("-"),
            sources = workspace.source_tree().len(),
            "starting conversion pass"
        );

        for source in workspace.source_files() {
            self.engine
                .convert(&source, run, &mut accumulator)
                .map_err(|fault| DocforgeError::EngineExecution(fault.to_string()))?;
        }

        if let Some(journal) = &self.journal {
            for record in accumulator.records() {
                journal.append(record.clone());
            }
        }

        let observed = accumulator.max_severity();
        let pattern_gate = !accumulator.matched().is_empty();
        let severity_gate = observed.is_some_and(|severity| severity >= run.policy.fail_on);

        if pattern_gate || severity_gate {
            tracing::warn!(
                backend = %run.backend,
                pattern_gate,
                severity_gate,
                "conversion pass failed log policy"
            );
            return Err(DocforgeError::LogPolicyViolation {
                matched: accumulator.matched().to_vec(),
                observed: observed.unwrap_or(Severity::Debug),
                threshold: run.policy.fail_on,
            });
        }

        Ok(ExecutionReport {
            backend: run.backend.clone(),
            language: run.language.clone(),
            max_severity: observed,
            records: accumulator.records.clone(),
        })
    }
}

/// Effective failure threshold when reporting across several run
/// configurations sharing one log: the minimum of the configured
/// thresholds. The most lenient configured bar determines sensitivity.
pub fn find_highest_failure_level(runs: &[RunConfiguration]) -> Severity {
    runs.iter()
        .map(|run| run.policy.fail_on)
        .min()
        .unwrap_or(Severity::Fatal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use crate::engine::EngineFault;
    use crate::journal::InMemoryJournal;
    use crate::workspace::WorkspaceBuilder;

    /// Engine stub that replays a scripted diagnostic stream per source.
    struct ScriptedEngine {
        records: Vec<LogRecord>,
        fault: Option<String>,
    }

    impl ScriptedEngine {
        fn emitting(records: Vec<LogRecord>) -> Self {
            Self {
                records,
                fault: None,
            }
        }

        fn faulting(message: &str) -> Self {
            Self {
                records: Vec::new(),
                fault: Some(message.to_string()),
            }
        }
    }

    impl ConversionEngine for ScriptedEngine {
        fn convert(
            &self,
            _source: &Path,
            _run: &RunConfiguration,
            sink: &mut dyn LogSink,
        ) -> Result<(), EngineFault> {
            for record in &self.records {
                sink.log(record.clone());
            }
            match &self.fault {
                Some(message) => Err(EngineFault::new(message.clone())),
                None => Ok(()),
            }
        }
    }

    fn single_doc_workspace(dir: &Path) -> crate::workspace::Workspace {
        fs::write(dir.join("doc.adoc"), b"= Title").unwrap();
        WorkspaceBuilder::new(dir).prepare().unwrap()
    }

    fn run_config(policy: LogPolicy) -> RunConfiguration {
        RunConfiguration {
            backend: "html5".into(),
            language: None,
            working_source_dir: PathBuf::from("."),
            output_dir: PathBuf::from("out"),
            attributes: AttributeMap::new(),
            safe_mode: SafeMode::default(),
            policy,
        }
    }

    #[test]
    fn warn_stream_passes_under_default_fatal_threshold() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let executor = LogInterceptingExecutor::new(ScriptedEngine::emitting(vec![
            LogRecord::new(Severity::Warn, "possible invalid reference"),
        ]));

        let report = executor
            .execute(&workspace, &run_config(LogPolicy::default()))
            .unwrap();
        assert_eq!(report.max_severity, Some(Severity::Warn));
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn warn_stream_fails_under_warn_threshold() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let executor = LogInterceptingExecutor::new(ScriptedEngine::emitting(vec![
            LogRecord::new(Severity::Warn, "possible invalid reference"),
        ]));

        let err = executor
            .execute(&workspace, &run_config(LogPolicy::fail_on(Severity::Warn)))
            .unwrap_err();
        match err {
            DocforgeError::LogPolicyViolation {
                matched,
                observed,
                threshold,
            } => {
                assert!(matched.is_empty());
                assert_eq!(observed, Severity::Warn);
                assert_eq!(threshold, Severity::Warn);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pattern_gate_fails_independent_of_severity() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let executor = LogInterceptingExecutor::new(ScriptedEngine::emitting(vec![
            LogRecord::new(Severity::Info, "deprecated attribute used"),
            LogRecord::new(Severity::Info, "all good"),
        ]));

        let policy = LogPolicy::default().error_pattern("deprecated.*");
        let err = executor
            .execute(&workspace, &run_config(policy))
            .unwrap_err();
        match &err {
            DocforgeError::LogPolicyViolation { matched, .. } => {
                assert_eq!(matched, &vec!["deprecated attribute used".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("deprecated attribute used"));
    }

    #[test]
    fn both_gates_are_reported_together() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let executor = LogInterceptingExecutor::new(ScriptedEngine::emitting(vec![
            LogRecord::new(Severity::Error, "deprecated attribute used"),
        ]));

        let policy = LogPolicy::fail_on(Severity::Error).error_pattern("deprecated.*");
        let err = executor
            .execute(&workspace, &run_config(policy))
            .unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("deprecated attribute used"));
        assert!(rendered.contains("ERROR >= failure threshold ERROR"));
    }

    #[test]
    fn accumulation_does_not_stop_at_first_violation() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let executor = LogInterceptingExecutor::new(ScriptedEngine::emitting(vec![
            LogRecord::new(Severity::Warn, "deprecated table syntax"),
            LogRecord::new(Severity::Warn, "deprecated attribute used"),
        ]));

        let policy = LogPolicy::default().error_pattern("deprecated.*");
        let err = executor
            .execute(&workspace, &run_config(policy))
            .unwrap_err();
        match err {
            DocforgeError::LogPolicyViolation { matched, .. } => assert_eq!(matched.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn engine_fault_propagates_without_retry() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let executor = LogInterceptingExecutor::new(ScriptedEngine::faulting("renderer crashed"));

        let err = executor
            .execute(&workspace, &run_config(LogPolicy::default()))
            .unwrap_err();
        match err {
            DocforgeError::EngineExecution(message) => {
                assert!(message.contains("renderer crashed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_error_pattern_is_rejected_before_execution() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let executor = LogInterceptingExecutor::new(ScriptedEngine::emitting(Vec::new()));

        let policy = LogPolicy::default().error_pattern("deprecated(");
        let err = executor
            .execute(&workspace, &run_config(policy))
            .unwrap_err();
        assert!(matches!(err, DocforgeError::Pattern(_)));
    }

    #[test]
    fn intercepted_diagnostics_are_forwarded_to_the_journal() {
        let temp = tempdir().unwrap();
        let workspace = single_doc_workspace(temp.path());
        let journal = Arc::new(InMemoryJournal::new());
        let executor = LogInterceptingExecutor::with_journal(
            ScriptedEngine::emitting(vec![LogRecord::new(Severity::Info, "converted")]),
            journal.clone(),
        );

        executor
            .execute(&workspace, &run_config(LogPolicy::default()))
            .unwrap();
        assert_eq!(journal.snapshot().len(), 1);
    }

    #[test]
    fn combined_failure_level_is_the_minimum_threshold() {
        let runs = vec![
            run_config(LogPolicy::fail_on(Severity::Fatal)),
            run_config(LogPolicy::fail_on(Severity::Warn)),
            run_config(LogPolicy::fail_on(Severity::Error)),
        ];
        assert_eq!(find_highest_failure_level(&runs), Severity::Warn);
        assert_eq!(find_highest_failure_level(&[]), Severity::Fatal);
    }
}
