//! Per-item outcomes and the aggregate returned by every batch call

use serde::Serialize;
use thiserror::Error;

/// Destination rejected before any store call
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationError {
    #[error("source and destination are the same")]
    SameLocation,

    #[error("cannot move a folder into itself or one of its descendants")]
    IntoSelf,

    #[error("cannot place an object under its own key")]
    FileIntoSelf,

    #[error("invalid name '{0}'")]
    InvalidName(String),

    #[error("'{0}' is not in the trash")]
    NotInTrash(String),
}

/// Why one item of a batch did not succeed
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    #[error("{0}")]
    Validation(ValidationError),

    /// Nothing was changed; the source is untouched
    #[error("copy failed: {0}")]
    CopyFailure(String),

    /// The copy exists and a fresh listing proves the source does too
    #[error("delete failed, source still present: {0}")]
    DeleteFailureConfirmed(String),

    /// Delete failed and the follow-up listing failed as well; check manually
    #[error("delete failed and could not be verified: {0}")]
    VerificationFailure(String),

    #[error("upload failed: {0}")]
    UploadFailure(String),

    /// Not attempted because the batch was cancelled
    #[error("cancelled before start")]
    Cancelled,
}

impl From<ValidationError> for FailureReason {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

/// An item that ended up where it was meant to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSuccess {
    /// Display name of the source item
    pub name: String,
    /// Key the item now lives under (for deletes, the key that was removed)
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub name: String,
    pub reason: FailureReason,
}

/// Result of one item, before aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ItemResult {
    Succeeded {
        success: ItemSuccess,
        reclassified: bool,
    },
    Failed(ItemFailure),
    Skipped(String),
}

impl ItemResult {
    pub(crate) fn failed(name: impl Into<String>, reason: impl Into<FailureReason>) -> Self {
        Self::Failed(ItemFailure {
            name: name.into(),
            reason: reason.into(),
        })
    }
}

/// How a batch turned out as a whole, for user-facing messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Nothing succeeded or failed (every item skipped, or none given)
    Empty,
    AllSucceeded,
    AllFailed,
    Partial,
}

/// Aggregate of a batch call, in input order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<ItemSuccess>,
    pub failed: Vec<ItemFailure>,
    /// Items left out by a conflict decision; not failures
    pub skipped: Vec<String>,
    /// Names whose delete reported an error that a fresh listing disproved
    pub reclassified: Vec<String>,
}

impl BatchReport {
    pub(crate) fn push(&mut self, result: ItemResult) {
        match result {
            ItemResult::Succeeded {
                success,
                reclassified,
            } => {
                if reclassified {
                    self.reclassified.push(success.name.clone());
                }
                self.succeeded.push(success);
            }
            ItemResult::Failed(failure) => self.failed.push(failure),
            ItemResult::Skipped(name) => self.skipped.push(name),
        }
    }

    pub fn outcome(&self) -> BatchOutcome {
        match (self.succeeded.is_empty(), self.failed.is_empty()) {
            (true, true) => BatchOutcome::Empty,
            (false, true) => BatchOutcome::AllSucceeded,
            (true, false) => BatchOutcome::AllFailed,
            (false, false) => BatchOutcome::Partial,
        }
    }

    pub fn succeeded_names(&self) -> Vec<&str> {
        self.succeeded.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn was_cancelled(&self) -> bool {
        self.failed
            .iter()
            .any(|f| f.reason == FailureReason::Cancelled)
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

impl FromIterator<ItemResult> for BatchReport {
    fn from_iter<I: IntoIterator<Item = ItemResult>>(iter: I) -> Self {
        let mut report = Self::default();
        for result in iter {
            report.push(result);
        }
        report
    }
}
