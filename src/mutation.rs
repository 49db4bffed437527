//! Mutation Engine (C3): builds the draft commit for one change-request
//! operation, and later merges or discards the resulting draft branch.

use crate::config::ServiceConfig;
use crate::error::{CoreError, CoreResult};
use crate::gateway::RepositoryGateway;

#[derive(Debug, Clone)]
pub enum MutationOp {
    Create { domain: String, key: String, content: Vec<u8> },
    Update { domain: String, key: String, content: Vec<u8> },
    Delete { domain: String, key: String },
    CreateDomain { domain: String },
    DeleteDomain { domain: String },
}

pub struct MutationEngine<'a> {
    gateway: &'a RepositoryGateway,
    config: &'a ServiceConfig,
}

impl<'a> MutationEngine<'a> {
    pub fn new(gateway: &'a RepositoryGateway, config: &'a ServiceConfig) -> Self {
        Self { gateway, config }
    }

    fn branch(&self, env: &str) -> CoreResult<&str> {
        self.config
            .branch_for(env)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown environment '{env}'")))
    }

    /// Build the draft branch `draft/<draft_id>` from `env`'s branch and
    /// commit `op` onto it with message `title`. Returns the new commit sha.
    ///
    /// YAML content is validated *before* the draft branch is created, so a
    /// parse failure never leaves a `draft/*` branch behind.
    pub async fn create_draft(&self, env: &str, draft_id: &str, op: MutationOp, title: &str) -> CoreResult<String> {
        let target_branch = self.branch(env)?.to_string();
        let draft_branch = format!("draft/{draft_id}");
        let title = title.to_string();

        if let MutationOp::Create { content, .. } | MutationOp::Update { content, .. } = &op {
            serde_yaml::from_slice::<serde_yaml::Value>(content)
                .map_err(|e| CoreError::invalid_input(format!("invalid YAML: {e}")))?;
        }

        let result = self
            .gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &target_branch)?;

                if scoped.branch_exists(&draft_branch)? {
                    return Err(CoreError::state_conflict(format!(
                        "draft branch '{draft_branch}' already exists"
                    )));
                }
                scoped.create_branch_at(&draft_branch, "HEAD")?;
                scoped.checkout_branch(&draft_branch)?;

                apply_op(scoped, &op)?;

                scoped.stage_all()?;
                let sha = scoped.commit(&title)?;
                Ok(sha.to_string())
            })
            .await;

        if let Ok(ref sha) = result {
            tracing::info!(draft_id, env, sha, "draft created");
        }
        result
    }

    /// Non-fast-forward merge `draft/<draft_id>` into `env`'s branch with
    /// message `merge: <title>`, then delete the draft branch.
    pub async fn merge_draft(&self, env: &str, draft_id: &str, title: &str) -> CoreResult<String> {
        let target_branch = self.branch(env)?.to_string();
        let draft_branch = format!("draft/{draft_id}");
        let message = format!("merge: {title}");

        let result = self
            .gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &target_branch)?;
                let sha = scoped.merge_no_ff(&draft_branch, &message)?;
                scoped.delete_branch(&draft_branch)?;
                Ok(sha.to_string())
            })
            .await;

        if let Ok(ref sha) = result {
            tracing::info!(draft_id, env, sha, "draft merged");
        }
        result
    }

    /// Delete `draft/<draft_id>` if it exists. Tolerates absence.
    pub async fn discard_draft(&self, draft_id: &str) -> CoreResult<()> {
        let draft_branch = format!("draft/{draft_id}");
        self.gateway
            .with_repo(move |scoped| scoped.delete_branch(&draft_branch))
            .await
    }
}

fn apply_op(scoped: &crate::gateway::ScopedRepo, op: &MutationOp) -> CoreResult<()> {
    match op {
        MutationOp::Create { domain, key, content } | MutationOp::Update { domain, key, content } => {
            let dir = scoped.domain_dir_path(domain);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(scoped.config_file_path(domain, key), content)?;

            let gitkeep = dir.join(".gitkeep");
            if gitkeep.exists() {
                std::fs::remove_file(gitkeep)?;
            }
            Ok(())
        }
        MutationOp::Delete { domain, key } => {
            let path = scoped.config_file_path(domain, key);
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            Ok(())
        }
        MutationOp::CreateDomain { domain } => {
            let dir = scoped.domain_dir_path(domain);
            std::fs::create_dir_all(&dir)?;
            std::fs::write(dir.join(".gitkeep"), b"")?;
            Ok(())
        }
        MutationOp::DeleteDomain { domain } => {
            let dir = scoped.domain_dir_path(domain);
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
            Ok(())
        }
    }
}
