use std::fs;
use std::path::PathBuf;

use crate::attributes::AttributeResolver;
use crate::engine::ConversionEngine;
use crate::error::DocforgeError;
use crate::executor::{
    ExecutionReport, LogInterceptingExecutor, LogPolicy, RunConfiguration, SafeMode,
    find_highest_failure_level,
};
use crate::filter::PatternFilter;
use crate::severity::Severity;
use crate::workspace::{Workspace, WorkspaceBuilder};

/// Output layout and run-unit options for a conversion pass.
#[derive(Clone, Debug)]
pub struct ServiceOptions {
    output_root: PathBuf,
    backends: Vec<String>,
    policy: LogPolicy,
    separate_output_dirs: bool,
    safe_mode: SafeMode,
    intermediate_artifacts: Option<PatternFilter>,
}

impl ServiceOptions {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            backends: Vec::new(),
            policy: LogPolicy::default(),
            separate_output_dirs: true,
            safe_mode: SafeMode::default(),
            intermediate_artifacts: None,
        }
    }

    pub fn backend(mut self, name: impl Into<String>) -> Self {
        self.backends.push(name.into());
        self
    }

    pub fn policy(mut self, policy: LogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn safe_mode(mut self, mode: SafeMode) -> Self {
        self.safe_mode = mode;
        self
    }

    /// Extra files produced in the working directory during conversion
    /// (e.g. generated diagrams) that should reach the output consumer.
    pub fn intermediate_artifacts(mut self, filter: PatternFilter) -> Self {
        self.intermediate_artifacts = Some(filter);
        self
    }

    /// When disabled, language passes share one output directory per
    /// language instead of one per language/backend pair.
    pub fn separate_output_dirs(mut self, separate: bool) -> Self {
        self.separate_output_dirs = separate;
        self
    }

    fn output_dir(&self, language: Option<&str>, backend: &str) -> PathBuf {
        match (language, self.separate_output_dirs) {
            (Some(code), true) => self.output_root.join(code).join(backend),
            (Some(code), false) => self.output_root.join(code),
            (None, true) => self.output_root.join(backend),
            (None, false) => self.output_root.clone(),
        }
    }
}

/// Aggregated result of a whole conversion pass.
#[derive(Clone, Debug)]
pub struct PassReport {
    pub outcomes: Vec<ExecutionReport>,
    /// Effective threshold for combined reporting across all run units.
    pub combined_failure_level: Severity,
}

/// High-level façade bundling workspace preparation, attribute resolution,
/// and log-intercepted execution into a single entry point.
///
/// One conversion pass walks every configured language (or the
/// single-language path) and, per prepared workspace, executes the engine
/// once per backend.
pub struct ConversionService<E: ConversionEngine> {
    workspaces: WorkspaceBuilder,
    attributes: AttributeResolver,
    executor: LogInterceptingExecutor<E>,
    options: ServiceOptions,
}

impl<E: ConversionEngine> ConversionService<E> {
    pub fn new(
        workspaces: WorkspaceBuilder,
        attributes: AttributeResolver,
        executor: LogInterceptingExecutor<E>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            workspaces,
            attributes,
            executor,
            options,
        }
    }

    /// Runs the full pass. The first unrecoverable failure propagates;
    /// nothing is retried or downgraded.
    pub fn run(&self) -> Result<PassReport, DocforgeError> {
        let units = self.prepare_units()?;

        let mut planned: Vec<(usize, RunConfiguration)> = Vec::new();
        for (index, (language, workspace)) in units.iter().enumerate() {
            let attributes = self.attributes.resolve(language.as_deref());
            for backend in &self.options.backends {
                planned.push((
                    index,
                    RunConfiguration {
                        backend: backend.clone(),
                        language: language.clone(),
                        working_source_dir: workspace.working_source_dir().to_path_buf(),
                        output_dir: self.options.output_dir(language.as_deref(), backend),
                        attributes: attributes.clone(),
                        safe_mode: self.options.safe_mode,
                        policy: self.options.policy.clone(),
                    },
                ));
            }
        }

        let runs: Vec<RunConfiguration> = planned.iter().map(|(_, run)| run.clone()).collect();
        let combined_failure_level = find_highest_failure_level(&runs);

        let mut outcomes = Vec::with_capacity(planned.len());
        for (index, run) in &planned {
            let (_, workspace) = &units[*index];
            fs::create_dir_all(&run.output_dir)?;
            tracing::info!(
                backend = %run.backend,
                language = run.language.as_deref().unwrap_or("-"),
                output = %run.output_dir.display(),
                "executing run unit"
            );
            outcomes.push(self.executor.execute(workspace, run)?);
        }

        for (language, workspace) in &units {
            self.copy_intermediate_artifacts(language.as_deref(), workspace)?;
        }

        Ok(PassReport {
            outcomes,
            combined_failure_level,
        })
    }

    /// Copies staged artifacts matching the intermediate-artifact filter
    /// from the working directory into the unit's output directory.
    fn copy_intermediate_artifacts(
        &self,
        language: Option<&str>,
        workspace: &Workspace,
    ) -> Result<(), DocforgeError> {
        let Some(filter) = &self.options.intermediate_artifacts else {
            return Ok(());
        };
        let destination = match language {
            Some(code) => self.options.output_root.join(code),
            None => self.options.output_root.clone(),
        };
        for relative in filter.resolve(workspace.working_source_dir())? {
            let target = destination.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(workspace.working_source_dir().join(&relative), target)?;
        }
        Ok(())
    }

    fn prepare_units(&self) -> Result<Vec<(Option<String>, Workspace)>, DocforgeError> {
        let languages = self.workspaces.configured_languages();
        if languages.is_empty() {
            return Ok(vec![(None, self.workspaces.prepare()?)]);
        }
        languages
            .iter()
            .map(|code| {
                Ok((
                    Some(code.clone()),
                    self.workspaces.prepare_language(code)?,
                ))
            })
            .collect()
    }
}
