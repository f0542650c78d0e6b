use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::overrides::{Override, OverrideBuilder};
use serde::{Deserialize, Serialize};

use crate::error::DocforgeError;

/// Document extensions matched when no include patterns are configured.
pub const DEFAULT_INCLUDES: &[&str] = &["**/*.adoc", "**/*.ad", "**/*.asc", "**/*.asciidoc"];

/// Default exclusion for primary sources: partial documents named with a
/// leading underscore are include-only and never converted on their own.
pub const UNDERSCORE_EXCLUDE: &str = "_*";

/// Include/exclude glob configuration evaluated against a directory tree.
///
/// Matching is gitignore-style with `**` recursive wildcards. Includes are
/// additive; a path qualifies iff it matches at least one include and no
/// exclude. Excludes always win regardless of include matches.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFilter {
    includes: Vec<String>,
    excludes: Vec<String>,
}

impl PatternFilter {
    /// A filter with no patterns; resolution falls back to the default
    /// document extensions.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default primary-source filter: default document extensions plus
    /// the underscore exclusion.
    pub fn primary_default() -> Self {
        Self::new().exclude(UNDERSCORE_EXCLUDE)
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn excludes(&self) -> &[String] {
        &self.excludes
    }

    /// Resolves the filter against `root`, returning the matched file paths
    /// relative to `root` in lexicographic order.
    pub fn resolve(&self, root: &Path) -> Result<BTreeSet<PathBuf>, DocforgeError> {
        let include = build_matcher(root, self.effective_includes())?;
        let exclude = build_matcher(root, self.excludes.iter().map(String::as_str))?;

        let mut matched = BTreeSet::new();
        let walker = WalkBuilder::new(root)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(%err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|kind| kind.is_file()) {
                continue;
            }
            let path = entry.path();
            if !include.matched(path, false).is_whitelist() {
                continue;
            }
            if exclude.matched(path, false).is_whitelist() {
                continue;
            }
            let relative = path.strip_prefix(root).unwrap_or(path);
            matched.insert(relative.to_path_buf());
        }

        Ok(matched)
    }

    fn effective_includes(&self) -> impl Iterator<Item = &str> {
        let (configured, defaults): (&[String], &[&str]) = if self.includes.is_empty() {
            (&[], DEFAULT_INCLUDES)
        } else {
            (&self.includes, &[])
        };
        configured
            .iter()
            .map(String::as_str)
            .chain(defaults.iter().copied())
    }
}

/// Resolves the secondary-source set: secondary matches minus primary
/// matches, so a file matched by the primary filter never appears here.
pub fn resolve_secondary(
    root: &Path,
    primary: &PatternFilter,
    secondary: &PatternFilter,
) -> Result<BTreeSet<PathBuf>, DocforgeError> {
    let primary_set = primary.resolve(root)?;
    let mut set = secondary.resolve(root)?;
    set.retain(|path| !primary_set.contains(path));
    Ok(set)
}

fn build_matcher<'a>(
    root: &Path,
    patterns: impl Iterator<Item = &'a str>,
) -> Result<Override, DocforgeError> {
    let mut builder = OverrideBuilder::new(root);
    for pattern in patterns {
        builder
            .add(pattern)
            .map_err(|err| DocforgeError::Pattern(err.to_string()))?;
    }
    builder
        .build()
        .map_err(|err| DocforgeError::Pattern(err.to_string()))
}
