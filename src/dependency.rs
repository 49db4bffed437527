//! Dependency/consumer registry contract (read-only from the core's side).
//!
//! Impact analysis ("what consumes this key") is an external collaborator
//! per the core's scope; this module defines only the read contract and
//! record shape it relies on, plus an in-memory implementation for tests
//! and for embedders with no external registry.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerRegistration {
    pub app_id: String,
    pub environment: String,
    pub domain: String,
    pub consumed_keys: Vec<String>,
    pub last_heartbeat: Option<String>,
    pub contact: Option<String>,
}

#[async_trait]
pub trait ConsumerRegistry: Send + Sync {
    async fn consumers_of(&self, environment: &str, domain: &str, key: &str) -> CoreResult<Vec<ConsumerRegistration>>;
}

#[derive(Default)]
pub struct InMemoryConsumerRegistry {
    registrations: RwLock<Vec<ConsumerRegistration>>,
}

impl InMemoryConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, registration: ConsumerRegistration) {
        self.registrations.write().unwrap().push(registration);
    }
}

#[async_trait]
impl ConsumerRegistry for InMemoryConsumerRegistry {
    async fn consumers_of(&self, environment: &str, domain: &str, key: &str) -> CoreResult<Vec<ConsumerRegistration>> {
        Ok(self
            .registrations
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.environment == environment && r.domain == domain && r.consumed_keys.iter().any(|k| k == key))
            .cloned()
            .collect())
    }
}

/// Grouping helper an HTTP layer might use to render "N consumers across M apps".
pub fn group_by_app(registrations: &[ConsumerRegistration]) -> HashMap<String, Vec<&ConsumerRegistration>> {
    let mut groups: HashMap<String, Vec<&ConsumerRegistration>> = HashMap::new();
    for r in registrations {
        groups.entry(r.app_id.clone()).or_default().push(r);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_consumers_by_key() {
        let registry = InMemoryConsumerRegistry::new();
        registry.register(ConsumerRegistration {
            app_id: "checkout".to_string(),
            environment: "prod".to_string(),
            domain: "pricing".to_string(),
            consumed_keys: vec!["default".to_string()],
            last_heartbeat: None,
            contact: None,
        });

        let found = registry.consumers_of("prod", "pricing", "default").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].app_id, "checkout");

        let none = registry.consumers_of("prod", "pricing", "other").await.unwrap();
        assert!(none.is_empty());
    }
}
