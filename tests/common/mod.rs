use confgov_core::config::ServiceConfig;
use confgov_core::gateway::RepositoryGateway;
use std::path::Path;

/// Open a fresh gateway rooted at `dir`, with the default dev/staging/prod
/// branch set already created. Mirrors what an embedder does on startup.
pub async fn open_gateway(dir: &Path) -> RepositoryGateway {
    RepositoryGateway::open(dir, &["main", "staging", "production"])
        .expect("gateway should initialize a fresh repository")
}

pub fn service_config(dir: &Path) -> ServiceConfig {
    ServiceConfig {
        repo_path: dir.to_path_buf(),
        metadata_path: dir.join("metadata"),
        environments: [
            ("dev".to_string(), "main".to_string()),
            ("staging".to_string(), "staging".to_string()),
            ("prod".to_string(), "production".to_string()),
        ]
        .into_iter()
        .collect(),
    }
}
