//! Best-effort cleanup bookkeeping
//!
//! Removal of credentials must never abort a run or hide the error that
//! triggered it, so each removal step records an outcome here instead of
//! returning `Err`.

use std::fmt;

use tracing::warn;

/// Result of removing one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    /// Resource existed and was removed
    Removed,
    /// Nothing to remove
    Absent,
    /// Removal failed; the message explains why
    Warning(String),
}

/// Outcome for a single named resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// Human-readable resource name (file path or config key)
    pub resource: String,
    /// What happened to it
    pub status: CleanupStatus,
}

impl fmt::Display for CleanupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            CleanupStatus::Removed => write!(f, "removed {}", self.resource),
            CleanupStatus::Absent => write!(f, "{} already absent", self.resource),
            CleanupStatus::Warning(msg) => write!(f, "failed to remove {}: {}", self.resource, msg),
        }
    }
}

/// Aggregated outcomes of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupResult {
    outcomes: Vec<CleanupOutcome>,
}

impl CleanupResult {
    /// Empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a resource was removed
    pub fn removed(&mut self, resource: impl Into<String>) {
        self.push(resource, CleanupStatus::Removed);
    }

    /// Record that there was nothing to remove
    pub fn absent(&mut self, resource: impl Into<String>) {
        self.push(resource, CleanupStatus::Absent);
    }

    /// Record a failed removal and log it as a warning
    pub fn warning(&mut self, resource: impl Into<String>, message: impl Into<String>) {
        let resource = resource.into();
        let message = message.into();
        warn!(resource = %resource, "cleanup failed: {}", message);
        self.push(resource, CleanupStatus::Warning(message));
    }

    fn push(&mut self, resource: impl Into<String>, status: CleanupStatus) {
        self.outcomes.push(CleanupOutcome {
            resource: resource.into(),
            status,
        });
    }

    /// Append another result
    pub fn extend(&mut self, other: CleanupResult) {
        self.outcomes.extend(other.outcomes);
    }

    /// All recorded outcomes in order
    pub fn outcomes(&self) -> &[CleanupOutcome] {
        &self.outcomes
    }

    /// Outcomes that failed
    pub fn warnings(&self) -> impl Iterator<Item = &CleanupOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, CleanupStatus::Warning(_)))
    }

    /// True when no removal failed
    pub fn is_clean(&self) -> bool {
        self.warnings().next().is_none()
    }

    /// Status recorded for a resource, last one wins
    pub fn status_of(&self, resource: &str) -> Option<&CleanupStatus> {
        self.outcomes
            .iter()
            .rev()
            .find(|o| o.resource == resource)
            .map(|o| &o.status)
    }
}
