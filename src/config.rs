//! Service configuration.
//!
//! Layered the way the CLI this engine is descended from layers its own
//! config, simplified from a three-scope (repo/user/local) CLI config down
//! to a single-scope service config: defaults, overridden by a TOML file,
//! overridden by environment variables (`CONFGOV_*`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn default_repo_path() -> PathBuf {
    PathBuf::from("./config-repo")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/confgov")
}

fn default_environments() -> HashMap<String, String> {
    let mut m = HashMap::new();
    m.insert("dev".to_string(), "main".to_string());
    m.insert("staging".to_string(), "staging".to_string());
    m.insert("prod".to_string(), "production".to_string());
    m
}

/// On-disk / env-var representation; every field optional so partial files
/// and partial env overrides both work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialServiceConfig {
    pub repo_path: Option<PathBuf>,
    pub metadata_path: Option<PathBuf>,
    pub environments: Option<HashMap<String, String>>,
}

/// Fully-resolved configuration, threaded explicitly into the components
/// that need it. No ambient global: every constructor takes a `&ServiceConfig`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub repo_path: PathBuf,
    pub metadata_path: PathBuf,
    /// Logical environment name -> branch name. Closed set; see `environments()`.
    pub environments: HashMap<String, String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            repo_path: default_repo_path(),
            metadata_path: default_metadata_path(),
            environments: default_environments(),
        }
    }
}

impl ServiceConfig {
    /// Load from an optional TOML file, then apply `CONFGOV_*` environment
    /// variable overrides. Missing file is not an error — defaults apply.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(path) = config_file {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                let partial: PartialServiceConfig =
                    toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))?;
                cfg.apply(partial);
            }
        }

        cfg.apply_env();
        Ok(cfg)
    }

    fn apply(&mut self, partial: PartialServiceConfig) {
        if let Some(p) = partial.repo_path {
            self.repo_path = p;
        }
        if let Some(p) = partial.metadata_path {
            self.metadata_path = p;
        }
        if let Some(envs) = partial.environments {
            self.environments = envs;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CONFGOV_REPO_PATH") {
            self.repo_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CONFGOV_METADATA_PATH") {
            self.metadata_path = PathBuf::from(v);
        }
    }

    /// Branch name for a logical environment, or `None` if the environment
    /// is not in the closed set this deployment recognizes.
    pub fn branch_for(&self, env: &str) -> Option<&str> {
        self.environments.get(env).map(String::as_str)
    }

    pub fn is_known_environment(&self, env: &str) -> bool {
        self.environments.contains_key(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_three_environments() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.branch_for("dev"), Some("main"));
        assert_eq!(cfg.branch_for("staging"), Some("staging"));
        assert_eq!(cfg.branch_for("prod"), Some("production"));
        assert!(!cfg.is_known_environment("canary"));
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let cfg = ServiceConfig::load(Some(Path::new("/nonexistent/confgov.toml"))).unwrap();
        assert_eq!(cfg.repo_path, default_repo_path());
    }

    #[test]
    fn load_parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confgov.toml");
        std::fs::write(&path, "repo_path = \"/tmp/repo\"\n").unwrap();

        let cfg = ServiceConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.repo_path, PathBuf::from("/tmp/repo"));
        // untouched field keeps its default
        assert_eq!(cfg.metadata_path, default_metadata_path());
    }
}
