//! Promotion Engine (C5): copies a selected set of files from a source
//! environment to a target environment as a single atomic commit, tagged
//! for traceability.

use chrono::Utc;

use crate::config::ServiceConfig;
use crate::diff::unified_diff;
use crate::error::{CoreError, CoreResult};
use crate::gateway::RepositoryGateway;

#[derive(Debug, Clone)]
pub struct FilePreview {
    pub key: String,
    pub source_content: Option<Vec<u8>>,
    pub target_content: Option<Vec<u8>>,
    pub diff: String,
}

pub struct PromotionEngine<'a> {
    gateway: &'a RepositoryGateway,
    config: &'a ServiceConfig,
}

impl<'a> PromotionEngine<'a> {
    pub fn new(gateway: &'a RepositoryGateway, config: &'a ServiceConfig) -> Self {
        Self { gateway, config }
    }

    fn branch(&self, env: &str) -> CoreResult<&str> {
        self.config
            .branch_for(env)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown environment '{env}'")))
    }

    /// Validate that `(source, target)` is one of the two permitted
    /// promotion flows: dev -> staging, staging -> prod.
    pub fn validate_flow(source: &str, target: &str) -> CoreResult<()> {
        match (source, target) {
            ("dev", "staging") | ("staging", "prod") => Ok(()),
            _ => Err(CoreError::invalid_input(format!(
                "promotion from '{source}' to '{target}' is not permitted"
            ))),
        }
    }

    pub async fn preview(&self, source: &str, target: &str, domain: &str, keys: &[String]) -> CoreResult<Vec<FilePreview>> {
        Self::validate_flow(source, target)?;
        let source_branch = self.branch(source)?.to_string();
        let target_branch = self.branch(target)?.to_string();
        let domain = domain.to_string();

        let mut previews = Vec::new();
        for key in keys {
            let path = format!("config/{domain}/{key}.yaml");

            let source_content = {
                let source_branch = source_branch.clone();
                let path = path.clone();
                self.gateway
                    .with_repo(move |scoped| {
                        RepositoryGateway::require_branch(scoped, &source_branch)?;
                        scoped.show_file_at_commit("HEAD", &path)
                    })
                    .await?
            };

            let target_content = {
                let target_branch = target_branch.clone();
                let path = path.clone();
                self.gateway
                    .with_repo(move |scoped| {
                        RepositoryGateway::require_branch(scoped, &target_branch)?;
                        scoped.show_file_at_commit("HEAD", &path)
                    })
                    .await?
            };

            let diff = unified_diff(
                target_content.as_deref().unwrap_or(b""),
                source_content.as_deref().unwrap_or(b""),
            );

            previews.push(FilePreview {
                key: key.clone(),
                source_content,
                target_content,
                diff,
            });
        }

        Ok(previews)
    }

    /// Execute the promotion as a single commit. Returns the new HEAD sha.
    /// Files absent in the source are skipped, not errors. Makes either one
    /// commit covering every written file, or none at all.
    pub async fn execute(
        &self,
        promotion_id: &str,
        source: &str,
        target: &str,
        domain: &str,
        keys: &[String],
    ) -> CoreResult<String> {
        Self::validate_flow(source, target)?;
        let source_branch = self.branch(source)?.to_string();
        let target_branch = self.branch(target)?.to_string();
        let domain_owned = domain.to_string();
        let promotion_id = promotion_id.to_string();
        let keys_owned: Vec<String> = keys.to_vec();
        let source_env = source.to_string();
        let target_env = target.to_string();

        let captured: Vec<(String, Vec<u8>)> = {
            let source_branch = source_branch.clone();
            let domain = domain_owned.clone();
            let keys = keys_owned.clone();
            self.gateway
                .with_repo(move |scoped| {
                    RepositoryGateway::require_branch(scoped, &source_branch)?;
                    let mut captured = Vec::new();
                    for key in &keys {
                        let path = format!("config/{domain}/{key}.yaml");
                        if let Some(content) = scoped.show_file_at_commit("HEAD", &path)? {
                            captured.push((key.clone(), content));
                        }
                    }
                    Ok(captured)
                })
                .await?
        };

        if captured.is_empty() {
            return Err(CoreError::state_conflict(
                "none of the requested files exist in the source environment",
            ));
        }

        let written_keys: Vec<String> = captured.iter().map(|(k, _)| k.clone()).collect();
        let message = format!(
            "promote: {domain_owned}/{} {source_env} \u{2192} {target_env} [{promotion_id}]",
            written_keys.join(",")
        );
        let tag_name = format!(
            "promote-{target_env}-{domain_owned}-{}",
            Utc::now().to_rfc3339().replace([':', '.'], "-")
        );

        let result = self
            .gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &target_branch)?;

                let dir = scoped.domain_dir_path(&domain_owned);
                std::fs::create_dir_all(&dir)?;
                for (key, content) in &captured {
                    std::fs::write(scoped.config_file_path(&domain_owned, key), content)?;
                }

                let gitkeep = dir.join(".gitkeep");
                if gitkeep.exists() {
                    std::fs::remove_file(gitkeep)?;
                }

                scoped.stage_all()?;
                let sha = scoped.commit(&message)?;
                scoped.tag_lightweight(&tag_name)?;
                Ok(sha.to_string())
            })
            .await;

        match &result {
            Ok(sha) => tracing::info!(promotion_id, source, target, domain, sha, "promotion executed"),
            Err(e) => tracing::warn!(promotion_id, source, target, domain, error = %e, "promotion failed"),
        }
        result
    }
}
