//! Snapshot Reader (C2): read-only views of configuration at a branch tip,
//! at an arbitrary commit, or across history.

use crate::config::ServiceConfig;
use crate::error::{CoreError, CoreResult};
use crate::gateway::RepositoryGateway;

const MAX_HISTORY: usize = 100;

#[derive(Debug, Clone)]
pub struct YamlParseError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl From<serde_yaml::Error> for YamlParseError {
    fn from(e: serde_yaml::Error) -> Self {
        let location = e.location();
        Self {
            message: e.to_string(),
            line: location.map(|l| l.line()),
            column: location.map(|l| l.column()),
        }
    }
}

/// The content of a config key at some point in time. `parsed` is `None`
/// when the YAML failed to parse; the raw bytes are always present.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub raw: Vec<u8>,
    pub sha: String,
    pub parsed: Option<serde_yaml::Value>,
    pub parse_error: Option<YamlParseError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    Merge,
    Promote,
    Rollback,
    Other,
}

fn classify(message: &str) -> CommitKind {
    let trimmed = message.trim_start();
    if trimmed.starts_with("merge:") || trimmed.starts_with("merge ") {
        CommitKind::Merge
    } else if trimmed.starts_with("promote:") {
        CommitKind::Promote
    } else if trimmed.to_ascii_lowercase().starts_with("rollback") {
        CommitKind::Rollback
    } else {
        CommitKind::Other
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub sha: String,
    pub author: String,
    pub timestamp: i64,
    pub message: String,
    pub kind: CommitKind,
}

pub struct SnapshotReader<'a> {
    gateway: &'a RepositoryGateway,
    config: &'a ServiceConfig,
}

impl<'a> SnapshotReader<'a> {
    pub fn new(gateway: &'a RepositoryGateway, config: &'a ServiceConfig) -> Self {
        Self { gateway, config }
    }

    fn branch(&self, env: &str) -> CoreResult<&str> {
        self.config
            .branch_for(env)
            .ok_or_else(|| CoreError::invalid_input(format!("unknown environment '{env}'")))
    }

    pub async fn get_config(&self, env: &str, domain: &str, key: &str) -> CoreResult<ConfigSnapshot> {
        let branch = self.branch(env)?.to_string();
        let path = format!("config/{domain}/{key}.yaml");

        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;

                let raw = scoped
                    .show_file_at_commit("HEAD", &path)?
                    .ok_or_else(|| CoreError::not_found(format!("{domain}/{key} not found in {branch}")))?;

                let history = scoped.log_for_file("HEAD", &path, 1)?;
                let sha = history
                    .first()
                    .map(|e| e.sha.to_string())
                    .ok_or_else(|| CoreError::internal("file exists but has no history"))?;

                let (parsed, parse_error) = match serde_yaml::from_slice::<serde_yaml::Value>(&raw) {
                    Ok(v) => (Some(v), None),
                    Err(e) => (None, Some(YamlParseError::from(e))),
                };

                Ok(ConfigSnapshot {
                    raw,
                    sha,
                    parsed,
                    parse_error,
                })
            })
            .await
    }

    pub async fn list_keys(&self, env: &str, domain: &str) -> CoreResult<Vec<String>> {
        let branch = self.branch(env)?.to_string();
        let domain = domain.to_string();
        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;
                scoped.list_keys(&domain)
            })
            .await
    }

    pub async fn list_domains(&self, env: &str) -> CoreResult<Vec<String>> {
        let branch = self.branch(env)?.to_string();
        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;
                scoped.list_domains()
            })
            .await
    }

    pub async fn get_config_at_commit(
        &self,
        env: &str,
        domain: &str,
        key: &str,
        sha: &str,
    ) -> CoreResult<Vec<u8>> {
        let branch = self.branch(env)?.to_string();
        let path = format!("config/{domain}/{key}.yaml");
        let sha = sha.to_string();

        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;
                scoped
                    .show_file_at_commit(&sha, &path)?
                    .ok_or_else(|| CoreError::not_found(format!("{domain}/{key} did not exist at {sha}")))
            })
            .await
    }

    pub async fn get_config_history(&self, env: &str, domain: &str, key: &str) -> CoreResult<Vec<HistoryEntry>> {
        let branch = self.branch(env)?.to_string();
        let path = format!("config/{domain}/{key}.yaml");

        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;
                let entries = scoped.log_for_file("HEAD", &path, MAX_HISTORY)?;
                Ok(entries
                    .into_iter()
                    .map(|e| HistoryEntry {
                        sha: e.sha.to_string(),
                        author: e.author,
                        timestamp: e.timestamp,
                        kind: classify(&e.message),
                        message: e.message,
                    })
                    .collect())
            })
            .await
    }
}
