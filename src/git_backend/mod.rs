//! Git backend abstraction.
//!
//! Low-level git operations live behind the `GitBackend` trait so the
//! [`crate::gateway::RepositoryGateway`] above it never touches `git2`
//! directly. There is a single real implementation, [`Git2Backend`]; the
//! seam exists so tests (and, eventually, alternate storage engines) can
//! substitute a fake without touching callers.

mod git2_backend;

pub use git2_backend::Git2Backend;

use crate::error::{CoreError, CoreResult};
use std::path::Path;

/// Git object id, rendered as a 40-character hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid(String);

impl Oid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..7.min(self.0.len())]
    }

    pub fn to_git2(&self) -> CoreResult<git2::Oid> {
        git2::Oid::from_str(&self.0).map_err(CoreError::from)
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<git2::Oid> for Oid {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

/// One entry in a file's commit history, as returned by `log_for_file`.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub sha: Oid,
    pub author: String,
    pub timestamp: i64,
    pub message: String,
}

/// Low-level git operations needed by the gateway. All paths are relative
/// to the repository workdir unless noted.
pub trait GitBackend: Send {
    fn workdir(&self) -> &Path;

    // Branches -----------------------------------------------------------
    fn current_branch(&self) -> CoreResult<String>;
    fn branch_exists(&self, name: &str) -> CoreResult<bool>;
    fn create_branch_at(&self, name: &str, at_ref: &str) -> CoreResult<()>;
    fn checkout_branch(&self, name: &str) -> CoreResult<()>;
    fn delete_branch(&self, name: &str) -> CoreResult<()>;

    // Commits --------------------------------------------------------------
    fn stage_all(&self) -> CoreResult<()>;
    fn commit(&self, message: &str) -> CoreResult<Oid>;
    /// Empty-tree commit used only during repository initialization.
    fn commit_initial(&self, message: &str) -> CoreResult<Oid>;

    /// Non-fast-forward merge of `branch` into the currently checked-out
    /// branch, committing with `message`. Returns the new HEAD.
    fn merge_no_ff(&self, branch: &str, message: &str) -> CoreResult<Oid>;

    /// Lightweight tag pointing at the current HEAD.
    fn tag_lightweight(&self, name: &str) -> CoreResult<()>;

    // Object reads without checkout ----------------------------------------
    /// Read a file's content as of `commit_ref` (branch name or sha).
    fn show_file_at_commit(&self, commit_ref: &str, path: &str) -> CoreResult<Option<Vec<u8>>>;

    /// The most recent `max_count` commits touching `path`, starting from
    /// `start_ref`, newest first.
    fn log_for_file(&self, start_ref: &str, path: &str, max_count: usize) -> CoreResult<Vec<LogEntry>>;

    /// The sha of the single parent of `commit_ref`, or `None` for a root commit.
    fn parent_of(&self, commit_ref: &str) -> CoreResult<Option<Oid>>;

    fn ref_sha(&self, reference: &str) -> CoreResult<Oid>;
}
