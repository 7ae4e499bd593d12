//! Typed classification of the non-recoverable failures a slot can hit. Leaf
//! git operations still return `anyhow::Result` with free-form context, the
//! way the rest of this codebase does; `SlotError` exists so the scheduler,
//! the tests, and the freeze engine can match on *kind* instead of grepping
//! error strings.
use std::fmt;

use crate::model::ReferenceDescriptor;

/// One of the non-recoverable error kinds a slot can produce. A handful of
/// recoverable conditions (a stale branch that fails to delete, a remote
/// that already exists, a deprecated spec field) never become a `SlotError` -
/// they're just `log::warn!` call sites.
#[derive(thiserror::Error, Debug)]
pub enum SlotError {
    #[error("spawning git failed: {0}")]
    SpawnFailure(#[source] anyhow::Error),

    #[error("clone of {remote}/{refspec} into {path} failed: {stderr}")]
    CloneFailed {
        remote: String,
        refspec: String,
        path: String,
        stderr: String,
    },

    #[error("working tree is dirty:\n{status}")]
    DirtyWorkingTree { status: String },

    #[error("reset to {target} failed: {stderr}")]
    ResetFailed { target: String, stderr: String },

    #[error("fetch from {remote} failed: {stderr}")]
    FetchFailed { remote: String, stderr: String },

    #[error("merge conflict applying {remote}/{refspec}: {stderr}")]
    MergeConflict {
        remote: String,
        refspec: String,
        stderr: String,
    },

    #[error("applying patches from {glob} failed: {stderr}")]
    PatchApplyFailed { glob: String, stderr: String },

    #[error("could not publish symlink for module {module}: {source}")]
    LinkError {
        module: String,
        #[source]
        source: std::io::Error,
    },

    #[error("slot declares no references")]
    NoReferences,
}

impl SlotError {
    pub fn merge_conflict(descriptor: &ReferenceDescriptor, stderr: impl Into<String>) -> Self {
        Self::MergeConflict {
            remote: descriptor.remote.clone(),
            refspec: descriptor.refspec.clone(),
            stderr: stderr.into(),
        }
    }
}

/// Wraps a `SlotError` with the slot name, so triage never has to guess which
/// slot produced a given message.
#[derive(Debug)]
pub struct SlotFailure {
    pub slot: String,
    pub error: SlotError,
}

impl fmt::Display for SlotFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {:?}: {}", self.slot, self.error)
    }
}

impl std::error::Error for SlotFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
