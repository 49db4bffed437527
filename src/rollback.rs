//! Rollback Engine (C6): restores a single file, or every file touched by a
//! promotion, to an earlier commit's content via a new commit.

use crate::config::ServiceConfig;
use crate::error::{CoreError, CoreResult};
use crate::gateway::RepositoryGateway;

pub struct RollbackEngine<'a> {
    gateway: &'a RepositoryGateway,
    config: &'a ServiceConfig,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(gateway: &'a RepositoryGateway, config: &'a ServiceConfig) -> Self {
        Self { gateway, config }
    }

    fn branch(&self, env: &str) -> CoreResult<&str> {
        self.config
            .branch_for(env)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown environment '{env}'")))
    }

    /// Restore `config/<domain>/<key>.yaml` on `env`'s branch to its content
    /// at `target_commit`, committing the restoration.
    pub async fn rollback_config(
        &self,
        env: &str,
        domain: &str,
        key: &str,
        target_commit: &str,
        reason: &str,
    ) -> CoreResult<String> {
        let branch = self.branch(env)?.to_string();
        let domain = domain.to_string();
        let key = key.to_string();
        let target_commit = target_commit.to_string();
        let short = target_commit.chars().take(7).collect::<String>();
        let message = format!("rollback: {domain}/{key} in {env} to {short} — {reason}");
        let path = format!("config/{domain}/{key}.yaml");
        let domain_key = format!("{domain}/{key}");

        let result = self
            .gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;

                let content = scoped
                    .show_file_at_commit(&target_commit, &path)?
                    .ok_or_else(|| CoreError::not_found(format!("{domain}/{key} did not exist at {target_commit}")))?;

                std::fs::create_dir_all(scoped.domain_dir_path(&domain))?;
                std::fs::write(scoped.config_file_path(&domain, &key), content)?;

                scoped.stage_all()?;
                let sha = scoped.commit(&message)?;
                Ok(sha.to_string())
            })
            .await;

        if let Ok(ref sha) = result {
            tracing::info!(env, domain_key, sha, "config rolled back");
        }
        result
    }

    /// Undo a promotion: for each promoted file, restore the target branch
    /// to that file's content at `parent(original_commit)` — or delete it,
    /// if it did not exist before the promotion.
    pub async fn rollback_promotion(
        &self,
        promotion_id: &str,
        target_env: &str,
        domain: &str,
        keys: &[String],
        original_commit: &str,
        reason: &str,
    ) -> CoreResult<String> {
        let branch = self.branch(target_env)?.to_string();
        let domain = domain.to_string();
        let keys = keys.to_vec();
        let original_commit = original_commit.to_string();
        let message = format!("rollback promotion {promotion_id}: {reason}");

        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;

                let parent = scoped
                    .parent_of(&original_commit)?
                    .ok_or_else(|| CoreError::state_conflict("promotion commit has no parent to roll back to"))?;

                for key in &keys {
                    let path = format!("config/{domain}/{key}.yaml");
                    match scoped.show_file_at_commit(&parent.to_string(), &path)? {
                        Some(content) => {
                            std::fs::create_dir_all(scoped.domain_dir_path(&domain))?;
                            std::fs::write(scoped.config_file_path(&domain, key), content)?;
                        }
                        None => {
                            let file = scoped.config_file_path(&domain, key);
                            if file.exists() {
                                std::fs::remove_file(file)?;
                            }
                        }
                    }
                }

                scoped.stage_all()?;
                let sha = scoped.commit(&message)?;
                Ok(sha.to_string())
            })
            .await
    }
}
