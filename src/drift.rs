//! Drift Analyzer (C7): cross-environment comparison of every (domain, key)
//! pair, plus a focused diff endpoint for a single key.

use std::collections::BTreeSet;

use crate::config::ServiceConfig;
use crate::diff::unified_diff;
use crate::error::CoreResult;
use crate::gateway::RepositoryGateway;

const ENVIRONMENTS: [&str; 3] = ["dev", "staging", "prod"];

/// 32-bit rolling hash `h <- ((h<<5) - h) + c` over the raw UTF-8 bytes of
/// the content, rendered as base-16 of the signed 32-bit result. This is a
/// speed optimisation for grouping, never a substitute for the byte-exact
/// comparison used to decide equality.
pub fn fingerprint(content: &[u8]) -> String {
    let mut h: i32 = 0;
    for &b in content {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(b as i32);
    }
    if h < 0 {
        format!("-{:x}", h.unsigned_abs())
    } else {
        format!("{h:x}")
    }
}

/// `round(100 * synced / total)`, rounding half up rather than truncating.
fn round_percentage(synced: usize, total: usize) -> u32 {
    ((200 * synced + total) / (2 * total)) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftStatus {
    Synced,
    DevOnly,
    Drifted,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairLabel {
    Same,
    Different,
    MissingSource,
    MissingTarget,
}

fn pair_label(source: &Option<Vec<u8>>, target: &Option<Vec<u8>>) -> PairLabel {
    match (source, target) {
        (None, None) => PairLabel::Same,
        (None, Some(_)) => PairLabel::MissingSource,
        (Some(_), None) => PairLabel::MissingTarget,
        (Some(s), Some(t)) => {
            if s == t {
                PairLabel::Same
            } else {
                PairLabel::Different
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyDrift {
    pub domain: String,
    pub key: String,
    pub status: DriftStatus,
    pub dev_vs_staging: PairLabel,
    pub staging_vs_prod: PairLabel,
}

#[derive(Debug, Clone)]
pub struct DomainReport {
    pub domain: String,
    pub keys: Vec<KeyDrift>,
    pub sync_percentage: u32,
}

#[derive(Debug, Clone)]
pub struct DriftReport {
    pub domains: Vec<DomainReport>,
    pub overall_sync_percentage: u32,
}

#[derive(Debug, Clone)]
pub struct KeyDiff {
    pub source_content: Option<Vec<u8>>,
    pub target_content: Option<Vec<u8>>,
    pub diff: String,
    pub is_different: bool,
}

pub struct DriftAnalyzer<'a> {
    gateway: &'a RepositoryGateway,
    config: &'a ServiceConfig,
}

impl<'a> DriftAnalyzer<'a> {
    pub fn new(gateway: &'a RepositoryGateway, config: &'a ServiceConfig) -> Self {
        Self { gateway, config }
    }

    async fn read_content(&self, env: &str, domain: &str, key: &str) -> Option<Vec<u8>> {
        let branch = self.config.branch_for(env)?.to_string();
        let path = format!("config/{domain}/{key}.yaml");
        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;
                scoped.show_file_at_commit("HEAD", &path)
            })
            .await
            .ok()
            .flatten()
    }

    async fn domains_for(&self, env: &str) -> Vec<String> {
        let branch = match self.config.branch_for(env) {
            Some(b) => b.to_string(),
            None => return Vec::new(),
        };
        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;
                scoped.list_domains()
            })
            .await
            .unwrap_or_default()
    }

    async fn keys_for(&self, env: &str, domain: &str) -> Vec<String> {
        let branch = match self.config.branch_for(env) {
            Some(b) => b.to_string(),
            None => return Vec::new(),
        };
        let domain = domain.to_string();
        self.gateway
            .with_repo(move |scoped| {
                RepositoryGateway::require_branch(scoped, &branch)?;
                scoped.list_keys(&domain)
            })
            .await
            .unwrap_or_default()
    }

    pub async fn analyze(&self) -> CoreResult<DriftReport> {
        let mut all_domains: BTreeSet<String> = BTreeSet::new();
        for env in ENVIRONMENTS {
            all_domains.extend(self.domains_for(env).await);
        }

        let mut domain_reports = Vec::new();
        let mut overall_synced = 0usize;
        let mut overall_total = 0usize;

        for domain in all_domains {
            let mut all_keys: BTreeSet<String> = BTreeSet::new();
            for env in ENVIRONMENTS {
                all_keys.extend(self.keys_for(env, &domain).await);
            }

            let mut keys = Vec::new();
            let mut synced_count = 0usize;

            for key in all_keys {
                let dev = self.read_content("dev", &domain, &key).await;
                let staging = self.read_content("staging", &domain, &key).await;
                let prod = self.read_content("prod", &domain, &key).await;

                let dev_vs_staging = pair_label(&dev, &staging);
                let staging_vs_prod = pair_label(&staging, &prod);

                let status = classify(&dev, &staging, &prod, dev_vs_staging, staging_vs_prod);
                if status == DriftStatus::Synced {
                    synced_count += 1;
                }

                keys.push(KeyDrift {
                    domain: domain.clone(),
                    key,
                    status,
                    dev_vs_staging,
                    staging_vs_prod,
                });
            }

            let total = keys.len();
            let sync_percentage = if total == 0 { 100 } else { round_percentage(synced_count, total) };

            overall_synced += synced_count;
            overall_total += total;

            domain_reports.push(DomainReport {
                domain,
                keys,
                sync_percentage,
            });
        }

        let overall_sync_percentage = if overall_total == 0 {
            100
        } else {
            round_percentage(overall_synced, overall_total)
        };

        Ok(DriftReport {
            domains: domain_reports,
            overall_sync_percentage,
        })
    }

    pub async fn diff(&self, domain: &str, key: &str, source: &str, target: &str) -> CoreResult<KeyDiff> {
        let source_content = self.read_content(source, domain, key).await;
        let target_content = self.read_content(target, domain, key).await;

        let diff = unified_diff(
            target_content.as_deref().unwrap_or(b""),
            source_content.as_deref().unwrap_or(b""),
        );
        let is_different = source_content != target_content;

        Ok(KeyDiff {
            source_content,
            target_content,
            diff,
            is_different,
        })
    }
}

fn classify(
    dev: &Option<Vec<u8>>,
    staging: &Option<Vec<u8>>,
    prod: &Option<Vec<u8>>,
    dev_vs_staging: PairLabel,
    staging_vs_prod: PairLabel,
) -> DriftStatus {
    if dev.is_some() && staging.is_none() && prod.is_none() {
        return DriftStatus::DevOnly;
    }

    if dev.is_some() && staging.is_some() && prod.is_some() {
        let dev_fp = fingerprint(dev.as_ref().unwrap());
        let staging_fp = fingerprint(staging.as_ref().unwrap());
        let prod_fp = fingerprint(prod.as_ref().unwrap());
        if dev_fp == staging_fp && staging_fp == prod_fp {
            return DriftStatus::Synced;
        }
    }

    if dev_vs_staging == PairLabel::Different || staging_vs_prod == PairLabel::Different {
        return DriftStatus::Drifted;
    }

    DriftStatus::Partial
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_identical_content() {
        assert_eq!(fingerprint(b"rate: 0.1\n"), fingerprint(b"rate: 0.1\n"));
    }

    #[test]
    fn fingerprint_differs_for_different_content() {
        assert_ne!(fingerprint(b"rate: 0.1\n"), fingerprint(b"rate: 0.2\n"));
    }

    #[test]
    fn fingerprint_of_empty_content_is_zero() {
        assert_eq!(fingerprint(b""), "0");
    }

    #[test]
    fn fingerprint_renders_negative_hashes_with_a_sign_not_twos_complement() {
        assert_eq!(fingerprint(b"pricing/default"), "-2e7d7308");
    }

    #[test]
    fn round_percentage_rounds_half_up_instead_of_truncating() {
        assert_eq!(round_percentage(2, 3), 67);
        assert_eq!(round_percentage(1, 3), 33);
        assert_eq!(round_percentage(1, 2), 50);
    }

    #[test]
    fn classify_all_present_identical_is_synced() {
        let dev = Some(b"a".to_vec());
        let staging = Some(b"a".to_vec());
        let prod = Some(b"a".to_vec());
        let status = classify(&dev, &staging, &prod, PairLabel::Same, PairLabel::Same);
        assert_eq!(status, DriftStatus::Synced);
    }

    #[test]
    fn classify_dev_only() {
        let dev = Some(b"a".to_vec());
        let status = classify(&dev, &None, &None, PairLabel::MissingTarget, PairLabel::Same);
        assert_eq!(status, DriftStatus::DevOnly);
    }

    #[test]
    fn classify_drifted_on_divergent_adjacent_pair() {
        let dev = Some(b"a".to_vec());
        let staging = Some(b"b".to_vec());
        let prod = Some(b"b".to_vec());
        let status = classify(&dev, &staging, &prod, PairLabel::Different, PairLabel::Same);
        assert_eq!(status, DriftStatus::Drifted);
    }
}
