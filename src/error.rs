//! Planning errors and warnings
//!
//! Everything here is raised before any apply step runs. Apply-side
//! failures stay in `anyhow` and end up as `ApplyResult::Failed`.

use std::fmt;
use thiserror::Error;

/// Errors that abort a convergence run during planning
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// A version was supplied but is not usable as a package version
    #[error("invalid version format: {0:?}")]
    InvalidVersionFormat(String),

    /// More than one content source was handed to a file descriptor
    #[error("conflicting content sources for {path}: {sources}")]
    ConflictingContentSource { path: String, sources: String },

    /// The template reference could not be resolved
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// No content provider is registered under the requested class name
    #[error("content provider not found: {0}")]
    ProviderNotFound(String),

    /// An option or fact key cannot be used for substitution
    #[error("invalid option {key:?}: {reason}")]
    InvalidOption { key: String, reason: String },

    /// A template file exists but could not be read
    #[error("failed to read template {name}: {message}")]
    TemplateUnreadable { name: String, message: String },
}

/// Result type for planning operations
pub type Result<T> = std::result::Result<T, PlanError>;

/// Non-fatal findings recorded while planning
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum PlanWarning {
    /// Several of `source`/`my_class`/`template` were set; `chosen` won
    AmbiguousContentSource {
        chosen: &'static str,
        ignored: Vec<&'static str>,
    },
    /// `source_dir_purge` was set without a `source_dir`
    PurgeWithoutSourceDir,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AmbiguousContentSource { chosen, ignored } => write!(
                f,
                "ambiguous content source: using {chosen}, ignoring {}",
                ignored.join(", ")
            ),
            Self::PurgeWithoutSourceDir => {
                write!(f, "source_dir_purge has no effect without source_dir")
            }
        }
    }
}
