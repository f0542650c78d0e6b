use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::DocforgeError;
use crate::filter::{PatternFilter, resolve_secondary};

/// Resolved pairing of a working source directory and its filtered file
/// set, ready for conversion. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workspace {
    working_source_dir: PathBuf,
    source_tree: BTreeSet<PathBuf>,
}

impl Workspace {
    /// Absolute root from which source documents are read during
    /// conversion; either the original source directory or a staging copy.
    pub fn working_source_dir(&self) -> &Path {
        &self.working_source_dir
    }

    /// The filtered primary-source paths, relative to the working source
    /// directory. Never null; may be empty.
    pub fn source_tree(&self) -> &BTreeSet<PathBuf> {
        &self.source_tree
    }

    /// Absolute paths of the primary sources, in stable lexicographic order.
    pub fn source_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.source_tree
            .iter()
            .map(|relative| self.working_source_dir.join(relative))
    }
}

/// One resource copy instruction: files matched by `filter` under the
/// working root are copied into `target` (relative to the destination),
/// preserving their relative paths.
#[derive(Clone, Debug)]
pub struct ResourceEntry {
    filter: PatternFilter,
    target: PathBuf,
}

impl ResourceEntry {
    pub fn new(filter: PatternFilter, target: impl Into<PathBuf>) -> Self {
        Self {
            filter,
            target: target.into(),
        }
    }

    /// Copies straight into the destination root.
    pub fn in_place(filter: PatternFilter) -> Self {
        Self::new(filter, PathBuf::new())
    }
}

/// Ordered resource copy instructions, optionally overridden per language.
///
/// Common entries are applied first; entries registered for the active
/// language are layered on top, so a language entry targeting the same
/// relative destination wins.
#[derive(Clone, Debug, Default)]
pub struct ResourceSpec {
    common: Vec<ResourceEntry>,
    per_language: BTreeMap<String, Vec<ResourceEntry>>,
}

impl ResourceSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(mut self, entry: ResourceEntry) -> Self {
        self.common.push(entry);
        self
    }

    pub fn language_entry(mut self, language: impl Into<String>, entry: ResourceEntry) -> Self {
        self.per_language
            .entry(language.into())
            .or_default()
            .push(entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.common.is_empty() && self.per_language.is_empty()
    }

    fn effective(&self, language: Option<&str>) -> impl Iterator<Item = &ResourceEntry> {
        let overrides = language
            .and_then(|code| self.per_language.get(code))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        self.common.iter().chain(overrides.iter())
    }
}

/// Builds `Workspace` descriptors from a source root, pattern filters, and
/// a resource copy specification.
///
/// Single-language and multi-language preparation are separate entry
/// points (`prepare` / `prepare_language`); mixing them with the opposite
/// configuration is a `MultiLanguageMisuse` error.
#[derive(Clone, Debug)]
pub struct WorkspaceBuilder {
    source_root: PathBuf,
    output_root: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    languages: Vec<String>,
    primary: PatternFilter,
    secondary: PatternFilter,
    resources: ResourceSpec,
    staging_dir: Option<PathBuf>,
}

impl WorkspaceBuilder {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: None,
            base_dir: None,
            languages: Vec::new(),
            primary: PatternFilter::primary_default(),
            secondary: PatternFilter::new().exclude(crate::filter::UNDERSCORE_EXCLUDE),
            resources: ResourceSpec::new(),
            staging_dir: None,
        }
    }

    pub fn output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = Some(path.into());
        self
    }

    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(path.into());
        self
    }

    pub fn languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn primary_filter(mut self, filter: PatternFilter) -> Self {
        self.primary = filter;
        self
    }

    pub fn secondary_filter(mut self, filter: PatternFilter) -> Self {
        self.secondary = filter;
        self
    }

    pub fn resources(mut self, spec: ResourceSpec) -> Self {
        self.resources = spec;
        self
    }

    /// Enables staging: sources and resources are materialized into a
    /// fresh copy under this directory before conversion.
    pub fn staging_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(path.into());
        self
    }

    pub fn configured_languages(&self) -> &[String] {
        &self.languages
    }

    /// Prepares the single-language workspace over the source root.
    pub fn prepare(&self) -> Result<Workspace, DocforgeError> {
        if !self.languages.is_empty() {
            return Err(DocforgeError::MultiLanguageMisuse(format!(
                "single-language preparation invoked while languages {:?} are configured",
                self.languages
            )));
        }
        self.prepare_root(&self.source_root, None)
    }

    /// Prepares the workspace for one configured language, rooted at
    /// `source_root/<language>`.
    pub fn prepare_language(&self, language: &str) -> Result<Workspace, DocforgeError> {
        if self.languages.is_empty() {
            return Err(DocforgeError::MultiLanguageMisuse(
                "language preparation invoked with no languages configured".into(),
            ));
        }
        if !self.languages.iter().any(|code| code == language) {
            return Err(DocforgeError::MultiLanguageMisuse(format!(
                "language '{language}' is not in the configured set {:?}",
                self.languages
            )));
        }
        self.prepare_root(&self.source_root.join(language), Some(language))
    }

    fn prepare_root(
        &self,
        root: &Path,
        language: Option<&str>,
    ) -> Result<Workspace, DocforgeError> {
        // Path-root compatibility is pure path arithmetic and must be
        // checked before any file I/O.
        self.validate_roots()?;

        let primary = self.primary.resolve(root)?;
        validate_sources(&primary)?;

        match &self.staging_dir {
            Some(staging_root) => self.materialize(root, language, &primary, staging_root),
            None => Ok(Workspace {
                working_source_dir: absolutize(root)?,
                source_tree: primary,
            }),
        }
    }

    /// Fails if source, output, and base directories do not share one
    /// filesystem root. Only relevant on platforms with multiple roots.
    fn validate_roots(&self) -> Result<(), DocforgeError> {
        let source = path_root(&self.source_root)?;
        let output = match &self.output_root {
            Some(path) => path_root(path)?,
            None => source.clone(),
        };
        let base = match &self.base_dir {
            Some(path) => path_root(path)?,
            None => source.clone(),
        };
        if source != output || source != base {
            return Err(DocforgeError::IncompatiblePathRoots {
                source,
                output,
                base,
            });
        }
        Ok(())
    }

    fn materialize(
        &self,
        root: &Path,
        language: Option<&str>,
        primary: &BTreeSet<PathBuf>,
        staging_root: &Path,
    ) -> Result<Workspace, DocforgeError> {
        // Concurrent units must own disjoint staging directories, so each
        // language gets its own subtree.
        let staging = match language {
            Some(code) => staging_root.join(code),
            None => staging_root.to_path_buf(),
        };

        // Fresh directory every pass; stale files from a previous pass must
        // never leak into this one.
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;
        tracing::debug!(staging = %staging.display(), "materializing workspace");

        let secondary = resolve_secondary(root, &self.primary, &self.secondary)?;
        for relative in primary.iter().chain(secondary.iter()) {
            copy_preserving(root, &staging, relative, relative)?;
        }

        for entry in self.resources.effective(language) {
            for relative in entry.filter.resolve(root)? {
                let destination = entry.target.join(&relative);
                copy_preserving(root, &staging, &relative, &destination)?;
            }
        }

        // The tree is recomputed from the staged copy so downstream
        // consumers never observe paths outside the staging root.
        let source_tree = self.primary.resolve(&staging)?;
        Ok(Workspace {
            working_source_dir: absolutize(&staging)?,
            source_tree,
        })
    }
}

/// Rejects primary matches whose file name starts with an underscore; a
/// custom filter that lets them through would convert include-only
/// partial documents as standalone sources.
fn validate_sources(primary: &BTreeSet<PathBuf>) -> Result<(), DocforgeError> {
    for path in primary {
        let underscored = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('_'));
        if underscored {
            return Err(DocforgeError::InvalidSource(format!(
                "source file '{}' begins with an underscore and cannot be a primary document",
                path.display()
            )));
        }
    }
    Ok(())
}

fn copy_preserving(
    source_root: &Path,
    destination_root: &Path,
    source_relative: &Path,
    destination_relative: &Path,
) -> Result<(), DocforgeError> {
    let destination = destination_root.join(destination_relative);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source_root.join(source_relative), destination)?;
    Ok(())
}

fn absolutize(path: &Path) -> Result<PathBuf, DocforgeError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn path_root(path: &Path) -> Result<String, DocforgeError> {
    let absolute = absolutize(path)?;
    match absolute.components().next() {
        Some(Component::Prefix(prefix)) => {
            Ok(prefix.as_os_str().to_string_lossy().into_owned())
        }
        Some(Component::RootDir) => Ok("/".to_string()),
        _ => Ok(String::new()),
    }
}
