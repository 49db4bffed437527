//! Git2 (libgit2) implementation of [`GitBackend`].

use git2::{IndexAddOption, Repository, Signature};
use std::path::{Path, PathBuf};

use super::{GitBackend, LogEntry, Oid};
use crate::error::{CoreError, CoreResult};

const COMMITTER_NAME: &str = "confgov-core";
const COMMITTER_EMAIL: &str = "confgov-core@local";

pub struct Git2Backend {
    repo: Repository,
    workdir: PathBuf,
}

impl Git2Backend {
    /// Open an existing repository at `path`. Use [`Git2Backend::init`] to
    /// create one from scratch.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let repo = Repository::open(path)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| CoreError::internal("repository has no workdir (bare repos are not supported)"))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// Initialize a brand-new repository at `path` (idempotent: if one
    /// already exists there, it is simply opened).
    pub fn init(path: &Path) -> CoreResult<Self> {
        if path.join(".git").exists() {
            return Self::open(path);
        }
        std::fs::create_dir_all(path)?;
        let repo = Repository::init(path)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| CoreError::internal("repository has no workdir"))?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    fn signature(&self) -> CoreResult<Signature<'_>> {
        self.repo
            .signature()
            .or_else(|_| Signature::now(COMMITTER_NAME, COMMITTER_EMAIL))
            .map_err(CoreError::from)
    }

    fn find_commit(&self, reference: &str) -> CoreResult<git2::Commit<'_>> {
        if let Ok(branch) = self.repo.find_branch(reference, git2::BranchType::Local) {
            return Ok(branch.get().peel_to_commit()?);
        }
        if let Ok(git_ref) = self.repo.find_reference(reference) {
            return Ok(git_ref.peel_to_commit()?);
        }
        if let Ok(oid) = git2::Oid::from_str(reference) {
            if let Ok(commit) = self.repo.find_commit(oid) {
                return Ok(commit);
            }
        }
        let obj = self
            .repo
            .revparse_single(reference)
            .map_err(|_| CoreError::not_found(format!("ref '{reference}' does not exist")))?;
        Ok(obj.peel_to_commit()?)
    }
}

impl GitBackend for Git2Backend {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn current_branch(&self) -> CoreResult<String> {
        let head = self.repo.head()?;
        if !head.is_branch() {
            return Err(CoreError::internal("HEAD is detached"));
        }
        head.shorthand()
            .map(|s| s.to_string())
            .ok_or_else(|| CoreError::internal("branch name is not valid UTF-8"))
    }

    fn branch_exists(&self, name: &str) -> CoreResult<bool> {
        Ok(self.repo.find_branch(name, git2::BranchType::Local).is_ok())
    }

    fn create_branch_at(&self, name: &str, at_ref: &str) -> CoreResult<()> {
        let commit = self.find_commit(at_ref)?;
        self.repo.branch(name, &commit, false)?;
        Ok(())
    }

    fn checkout_branch(&self, name: &str) -> CoreResult<()> {
        let refname = format!("refs/heads/{name}");
        let commit = self
            .repo
            .find_reference(&refname)
            .map_err(|_| CoreError::not_found(format!("branch '{name}' does not exist")))?
            .peel_to_commit()?;

        self.repo.set_head(&refname)?;

        let mut checkout_opts = git2::build::CheckoutBuilder::new();
        checkout_opts.force();
        self.repo
            .reset(commit.as_object(), git2::ResetType::Hard, Some(&mut checkout_opts))?;
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> CoreResult<()> {
        match self.repo.find_branch(name, git2::BranchType::Local) {
            Ok(mut branch) => {
                branch.delete()?;
                Ok(())
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn stage_all(&self) -> CoreResult<()> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;
        Ok(())
    }

    fn commit(&self, message: &str) -> CoreResult<Oid> {
        let sig = self.signature()?;
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let head = self.repo.head()?;
        let parent = head.peel_to_commit()?;

        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?;
        Ok(Oid::from(oid))
    }

    fn commit_initial(&self, message: &str) -> CoreResult<Oid> {
        let sig = self.signature()?;
        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let oid = self.repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?;
        Ok(Oid::from(oid))
    }

    fn merge_no_ff(&self, branch: &str, message: &str) -> CoreResult<Oid> {
        let ours = self.repo.head()?.peel_to_commit()?;
        let theirs = self.find_commit(branch)?;

        let base_oid = self.repo.merge_base(ours.id(), theirs.id())?;
        if base_oid == theirs.id() {
            // already up to date — nothing to merge
            return Ok(Oid::from(ours.id()));
        }

        let mut idx = self.repo.merge_commits(&ours, &theirs, None)?;
        if idx.has_conflicts() {
            return Err(CoreError::state_conflict(format!(
                "merging '{branch}' produced conflicts"
            )));
        }

        let tree_id = idx.write_tree_to(&self.repo)?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = self.signature()?;
        let oid = self
            .repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&ours, &theirs])?;

        // move the working tree to match the new HEAD
        let mut checkout_opts = git2::build::CheckoutBuilder::new();
        checkout_opts.force();
        let commit = self.repo.find_commit(oid)?;
        self.repo
            .checkout_tree(commit.tree()?.as_object(), Some(&mut checkout_opts))?;

        Ok(Oid::from(oid))
    }

    fn tag_lightweight(&self, name: &str) -> CoreResult<()> {
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.tag_lightweight(name, head.as_object(), false)?;
        Ok(())
    }

    fn show_file_at_commit(&self, commit_ref: &str, path: &str) -> CoreResult<Option<Vec<u8>>> {
        let commit = self.find_commit(commit_ref)?;
        let tree = commit.tree()?;
        match tree.get_path(Path::new(path)) {
            Ok(entry) => {
                let blob = self.repo.find_blob(entry.id())?;
                Ok(Some(blob.content().to_vec()))
            }
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn log_for_file(&self, start_ref: &str, path: &str, max_count: usize) -> CoreResult<Vec<LogEntry>> {
        let start = self.find_commit(start_ref)?;

        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(start.id())?;
        revwalk.set_sorting(git2::Sort::TIME)?;

        let mut entries = Vec::new();
        let path_ref = Path::new(path);

        for oid in revwalk {
            if entries.len() >= max_count {
                break;
            }
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            let tree = commit.tree()?;

            let touches_path = if commit.parent_count() == 0 {
                tree.get_path(path_ref).is_ok()
            } else {
                let mut touched = false;
                for parent in commit.parents() {
                    let parent_tree = parent.tree()?;
                    let diff = self.repo.diff_tree_to_tree(
                        Some(&parent_tree),
                        Some(&tree),
                        Some(git2::DiffOptions::new().pathspec(path).to_owned()),
                    )?;
                    if diff.deltas().len() > 0 {
                        touched = true;
                        break;
                    }
                }
                touched
            };

            if touches_path {
                entries.push(LogEntry {
                    sha: Oid::from(commit.id()),
                    author: commit.author().name().unwrap_or("unknown").to_string(),
                    timestamp: commit.time().seconds(),
                    message: commit.message().unwrap_or("").to_string(),
                });
            }
        }

        Ok(entries)
    }

    fn parent_of(&self, commit_ref: &str) -> CoreResult<Option<Oid>> {
        let commit = self.find_commit(commit_ref)?;
        match commit.parent(0) {
            Ok(parent) => Ok(Some(Oid::from(parent.id()))),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn ref_sha(&self, reference: &str) -> CoreResult<Oid> {
        Ok(Oid::from(self.find_commit(reference)?.id()))
    }
}
