//! Core types for declarative resource management

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource exists at an exact version
    Version(String),
    /// Resource does not exist/is not configured
    Absent,
    /// Resource exists but differs from desired
    Modified { from: String, to: String },
    /// State cannot be determined
    Unknown,
}

impl ResourceState {
    /// Check if state represents presence (any version counts)
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. } | Self::Version(_))
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Whether `current` already satisfies this (desired) state.
    ///
    /// `Present` without details accepts any present state, including a
    /// specific version; everything else needs an exact match.
    pub fn is_satisfied_by(&self, current: &ResourceState) -> bool {
        match (self, current) {
            (Self::Present { details: None }, c) => c.is_present(),
            (desired, c) => desired == c,
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { details: None } => write!(f, "present"),
            Self::Present { details: Some(d) } => write!(f, "present ({d})"),
            Self::Version(v) => write!(f, "{v}"),
            Self::Absent => write!(f, "absent"),
            Self::Modified { from, to } => write!(f, "modified ({from} -> {to})"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of applying a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped
    Skipped { reason: String },
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChange => write!(f, "unchanged"),
            Self::Created => write!(f, "created"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
            Self::Failed { error } => write!(f, "failed: {error}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Treat every resource as noop, regardless of its own flag
    pub noop: bool,
    /// Verbose output
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_accepts_any_version() {
        let desired = ResourceState::Present { details: None };
        assert!(desired.is_satisfied_by(&ResourceState::Version("4.2.1".into())));
        assert!(desired.is_satisfied_by(&ResourceState::Present { details: None }));
        assert!(!desired.is_satisfied_by(&ResourceState::Absent));
    }

    #[test]
    fn test_version_needs_exact_match() {
        let desired = ResourceState::Version("1.0.42".into());
        assert!(desired.is_satisfied_by(&ResourceState::Version("1.0.42".into())));
        assert!(!desired.is_satisfied_by(&ResourceState::Version("1.0.41".into())));
        assert!(!desired.is_satisfied_by(&ResourceState::Present { details: None }));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = ExecuteSummary::default();
        summary.add_result(&ApplyResult::Created);
        summary.add_result(&ApplyResult::Removed);
        summary.add_result(&ApplyResult::Skipped {
            reason: "noop".into(),
        });
        assert_eq!(summary.total_changes(), 2);
        assert_eq!(summary.total(), 3);
        assert!(summary.is_success());
    }
}
