//! Repository Gateway (C1): serialized, branch-restoring access to the
//! on-disk configuration repository.
//!
//! Every other component reaches the repository only through
//! [`RepositoryGateway::with_repo`]. The gateway is the single owner of the
//! git worktree: it serializes all access through a `tokio::sync::Mutex`
//! (a FIFO queue of suspended waiters) and restores whatever branch was
//! checked out on entry before releasing the lock, regardless of whether
//! the closure succeeded.

use tokio::sync::Mutex;

use crate::error::{CoreError, CoreResult};
use crate::git_backend::{Git2Backend, GitBackend, LogEntry, Oid};
use std::path::Path;

const CONFIG_DIR: &str = "config";
const GITKEEP: &str = ".gitkeep";

pub struct RepositoryGateway {
    backend: Mutex<Box<dyn GitBackend>>,
}

/// A thin, borrowed handle into the locked repository, valid only for the
/// lifetime of one [`RepositoryGateway::with_repo`] call.
pub struct ScopedRepo<'a> {
    backend: &'a dyn GitBackend,
}

impl<'a> ScopedRepo<'a> {
    pub fn current_branch(&self) -> CoreResult<String> {
        self.backend.current_branch()
    }

    pub fn checkout_branch(&self, name: &str) -> CoreResult<()> {
        self.backend.checkout_branch(name)
    }

    pub fn branch_exists(&self, name: &str) -> CoreResult<bool> {
        self.backend.branch_exists(name)
    }

    pub fn create_branch_at(&self, name: &str, at_ref: &str) -> CoreResult<()> {
        self.backend.create_branch_at(name, at_ref)
    }

    pub fn delete_branch(&self, name: &str) -> CoreResult<()> {
        self.backend.delete_branch(name)
    }

    pub fn stage_all(&self) -> CoreResult<()> {
        self.backend.stage_all()
    }

    pub fn commit(&self, message: &str) -> CoreResult<Oid> {
        self.backend.commit(message)
    }

    pub fn merge_no_ff(&self, branch: &str, message: &str) -> CoreResult<Oid> {
        self.backend.merge_no_ff(branch, message)
    }

    pub fn tag_lightweight(&self, name: &str) -> CoreResult<()> {
        self.backend.tag_lightweight(name)
    }

    pub fn show_file_at_commit(&self, commit_ref: &str, path: &str) -> CoreResult<Option<Vec<u8>>> {
        self.backend.show_file_at_commit(commit_ref, path)
    }

    pub fn log_for_file(&self, start_ref: &str, path: &str, max_count: usize) -> CoreResult<Vec<LogEntry>> {
        self.backend.log_for_file(start_ref, path, max_count)
    }

    pub fn parent_of(&self, commit_ref: &str) -> CoreResult<Option<Oid>> {
        self.backend.parent_of(commit_ref)
    }

    pub fn ref_sha(&self, reference: &str) -> CoreResult<Oid> {
        self.backend.ref_sha(reference)
    }

    pub fn workdir(&self) -> &Path {
        self.backend.workdir()
    }

    /// Path relative to the workdir for `config/<domain>/<key>.yaml`.
    pub fn config_file_path(&self, domain: &str, key: &str) -> std::path::PathBuf {
        self.backend.workdir().join(CONFIG_DIR).join(domain).join(format!("{key}.yaml"))
    }

    pub fn domain_dir_path(&self, domain: &str) -> std::path::PathBuf {
        self.backend.workdir().join(CONFIG_DIR).join(domain)
    }

    pub fn list_domains(&self) -> CoreResult<Vec<String>> {
        let root = self.backend.workdir().join(CONFIG_DIR);
        if !root.exists() {
            return Ok(Vec::new());
        }
        let mut domains: Vec<String> = std::fs::read_dir(&root)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        domains.sort();
        Ok(domains)
    }

    pub fn list_keys(&self, domain: &str) -> CoreResult<Vec<String>> {
        let dir = self.domain_dir_path(domain);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys: Vec<String> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|ext| ext == "yaml").unwrap_or(false))
            .filter_map(|e| e.path().file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .filter(|name| name != "schema")
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl RepositoryGateway {
    /// Open the repository at `path`, initializing it (idempotently) if it
    /// has no git metadata yet: an empty `config/.gitkeep`, an initial
    /// commit, the default branch renamed to `main`, and `staging` /
    /// `production` branches created from that commit.
    pub fn open(path: &Path, branches: &[&str]) -> CoreResult<Self> {
        let already_initialized = path.join(".git").exists();
        let backend = Git2Backend::init(path)?;

        if !already_initialized {
            tracing::info!(path = %path.display(), ?branches, "initializing configuration repository");
            let config_dir = path.join(CONFIG_DIR);
            std::fs::create_dir_all(&config_dir)?;
            std::fs::write(config_dir.join(GITKEEP), b"")?;
            backend.stage_all()?;
            backend.commit_initial("initial commit")?;

            for branch in branches {
                if !backend.branch_exists(branch)? {
                    backend.create_branch_at(branch, "HEAD")?;
                }
            }
        }

        Ok(Self {
            backend: Mutex::new(Box::new(backend)),
        })
    }

    /// Acquire exclusive access to the repository, run `f`, then restore
    /// whichever branch was checked out on entry before releasing the lock.
    /// Restoration happens whether or not `f` succeeded.
    pub async fn with_repo<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&ScopedRepo) -> CoreResult<T>,
    {
        let guard = self.backend.lock().await;
        let scoped = ScopedRepo {
            backend: guard.as_ref(),
        };

        let original_branch = scoped.current_branch().ok();
        let result = f(&scoped);
        if let Err(ref e) = result {
            tracing::warn!(error = %e, "repository operation failed");
        }

        if let Some(branch) = original_branch {
            if scoped.current_branch().ok().as_deref() != Some(branch.as_str()) {
                let _ = scoped.checkout_branch(&branch);
            }
        }

        result
    }

    /// Checkout `env_branch`, ensuring it is a known branch first. Small
    /// helper so callers that need a specific environment don't repeat the
    /// not-found mapping.
    pub fn require_branch(scoped: &ScopedRepo, branch: &str) -> CoreResult<()> {
        if !scoped.branch_exists(branch)? {
            return Err(CoreError::not_found(format!("branch '{branch}' does not exist")));
        }
        scoped.checkout_branch(branch)
    }
}
