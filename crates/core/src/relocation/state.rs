//! Lifecycle of a single relocation attempt

use std::fmt;

/// Where an attempt is in its copy, delete and verify sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationState {
    Validating,
    Copying,
    Deleting,
    Verifying,
    Succeeded,
    Failed,
}

impl RelocationState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Legal edges; permanent deletes skip the copy step
    pub const fn can_transition_to(self, next: Self) -> bool {
        use RelocationState::*;
        matches!(
            (self, next),
            (Validating, Copying | Deleting | Failed)
                | (Copying, Deleting | Succeeded | Failed)
                | (Deleting, Succeeded | Verifying)
                | (Verifying, Succeeded | Failed)
        )
    }
}

impl fmt::Display for RelocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validating => "validating",
            Self::Copying => "copying",
            Self::Deleting => "deleting",
            Self::Verifying => "verifying",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Tracks one attempt and traces each step
#[derive(Debug)]
pub(crate) struct Attempt<'a> {
    key: &'a str,
    state: RelocationState,
}

impl<'a> Attempt<'a> {
    pub(crate) fn new(key: &'a str) -> Self {
        Self {
            key,
            state: RelocationState::Validating,
        }
    }

    pub(crate) fn state(&self) -> RelocationState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: RelocationState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(key = self.key, from = %self.state, to = %next, "relocation step");
        self.state = next;
    }
}
