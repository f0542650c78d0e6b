use crate::severity::Severity;

/// High-level error type shared across docforge components.
///
/// Every variant except `Io` maps to one of the unrecoverable failure kinds
/// of the orchestration contract; the core never catches and downgrades them.
///
/// `Display` and `Error` are implemented by hand because thiserror would
/// treat the `source` field of `IncompatiblePathRoots` as the error source.
#[derive(Debug)]
pub enum DocforgeError {
    /// Single-language and multi-language entry points were mixed.
    MultiLanguageMisuse(String),
    /// A primary source match violates a source-tree invariant.
    InvalidSource(String),
    /// Source, output, and base directories span different filesystem roots.
    IncompatiblePathRoots {
        source: String,
        output: String,
        base: String,
    },
    /// The external conversion engine raised an unrecoverable fault.
    EngineExecution(String),
    /// One or both log-failure gates tripped after a conversion pass.
    LogPolicyViolation {
        matched: Vec<String>,
        observed: Severity,
        threshold: Severity,
    },
    /// A treat-as-error pattern or include/exclude glob failed to compile.
    Pattern(String),
    Io(std::io::Error),
}

impl std::fmt::Display for DocforgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultiLanguageMisuse(msg) => write!(f, "multi-language misuse: {msg}"),
            Self::InvalidSource(msg) => write!(f, "invalid source: {msg}"),
            Self::IncompatiblePathRoots {
                source,
                output,
                base,
            } => write!(
                f,
                "incompatible path roots: source '{source}', output '{output}', base '{base}'"
            ),
            Self::EngineExecution(msg) => {
                write!(f, "conversion engine execution failed: {msg}")
            }
            Self::LogPolicyViolation {
                matched,
                observed,
                threshold,
            } => write!(f, "{}", log_policy_message(matched, observed, threshold)),
            Self::Pattern(msg) => write!(f, "invalid pattern: {msg}"),
            Self::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for DocforgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DocforgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<regex::Error> for DocforgeError {
    fn from(err: regex::Error) -> Self {
        Self::Pattern(err.to_string())
    }
}

fn log_policy_message(matched: &[String], observed: &Severity, threshold: &Severity) -> String {
    let mut lines = Vec::new();
    if !matched.is_empty() {
        lines.push(format!(
            "{} diagnostic(s) matched a treat-as-error pattern:",
            matched.len()
        ));
        for message in matched {
            lines.push(format!("  {message}"));
        }
    }
    if observed >= threshold {
        lines.push(format!(
            "maximum diagnostic severity {observed} >= failure threshold {threshold}"
        ));
    }
    lines.join("\n")
}
