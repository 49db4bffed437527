//! Review State Machine (C4): the lifecycle of change-requests and
//! promotion-requests, and the engine that drives their side effects
//! (building/merging drafts, executing/rolling back promotions) while
//! keeping the metadata store and audit log in lockstep.

pub mod audit;
pub mod store;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::error::{CoreError, CoreResult};
use crate::gateway::RepositoryGateway;
use crate::id;
use crate::mutation::{MutationEngine, MutationOp};
use crate::promotion::PromotionEngine;
use crate::rollback::RollbackEngine;

use self::audit::{AuditEntry, AuditSink};
use self::store::MetadataStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Member,
    Admin,
}

#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Merged,
    Discarded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum ChangeOp {
    Create { domain: String, key: String, content: String },
    Update { domain: String, key: String, content: String },
    Delete { domain: String, key: String },
    CreateDomain { domain: String },
    DeleteDomain { domain: String },
}

impl ChangeOp {
    fn domain(&self) -> &str {
        match self {
            ChangeOp::Create { domain, .. }
            | ChangeOp::Update { domain, .. }
            | ChangeOp::Delete { domain, .. }
            | ChangeOp::CreateDomain { domain }
            | ChangeOp::DeleteDomain { domain } => domain,
        }
    }

    fn key(&self) -> Option<&str> {
        match self {
            ChangeOp::Create { key, .. } | ChangeOp::Update { key, .. } | ChangeOp::Delete { key, .. } => Some(key),
            ChangeOp::CreateDomain { .. } | ChangeOp::DeleteDomain { .. } => None,
        }
    }

    fn into_mutation(self) -> MutationOp {
        match self {
            ChangeOp::Create { domain, key, content } => MutationOp::Create {
                domain,
                key,
                content: content.into_bytes(),
            },
            ChangeOp::Update { domain, key, content } => MutationOp::Update {
                domain,
                key,
                content: content.into_bytes(),
            },
            ChangeOp::Delete { domain, key } => MutationOp::Delete { domain, key },
            ChangeOp::CreateDomain { domain } => MutationOp::CreateDomain { domain },
            ChangeOp::DeleteDomain { domain } => MutationOp::DeleteDomain { domain },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: String,
    pub environment: String,
    pub op: ChangeOp,
    pub title: String,
    pub description: Option<String>,
    pub status: ChangeRequestStatus,
    pub creator: String,
    pub reviewer: Option<String>,
    pub review_comment: Option<String>,
    pub merge_commit: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub merged_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionRequestStatus {
    Pending,
    Approved,
    Rejected,
    Promoted,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionRequest {
    pub id: String,
    pub source: String,
    pub target: String,
    pub domain: String,
    pub keys: Vec<String>,
    pub status: PromotionRequestStatus,
    pub requester: String,
    pub reviewer: Option<String>,
    pub notes: Option<String>,
    pub review_notes: Option<String>,
    pub commit_sha: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ReviewEngine<'a> {
    gateway: &'a RepositoryGateway,
    config: &'a ServiceConfig,
    changes: MetadataStore<ChangeRequest>,
    promotions: MetadataStore<PromotionRequest>,
    audit: &'a dyn AuditSink,
}

impl<'a> ReviewEngine<'a> {
    pub fn new(gateway: &'a RepositoryGateway, config: &'a ServiceConfig, audit: &'a dyn AuditSink) -> CoreResult<Self> {
        Ok(Self {
            gateway,
            config,
            changes: MetadataStore::new(&config.metadata_path.join("change_requests"))?,
            promotions: MetadataStore::new(&config.metadata_path.join("promotion_requests"))?,
            audit,
        })
    }

    async fn record(&self, entry: AuditEntry) {
        // Audit failures must never roll back the state transition they
        // describe; they are logged as a best-effort side channel.
        let _ = self.audit.record(entry).await;
    }

    // --- ChangeRequest -----------------------------------------------------

    pub async fn create_change_request(
        &self,
        environment: &str,
        op: ChangeOp,
        title: &str,
        description: Option<String>,
        creator: &str,
    ) -> CoreResult<ChangeRequest> {
        if !self.config.is_known_environment(environment) {
            return Err(CoreError::invalid_input(format!("unknown environment '{environment}'")));
        }

        let id = id::generate();
        let now = Utc::now().to_rfc3339();
        let mutation = MutationEngine::new(self.gateway, self.config);
        mutation
            .create_draft(environment, &id, op.clone().into_mutation(), title)
            .await?;

        let request = ChangeRequest {
            id: id.clone(),
            environment: environment.to_string(),
            op,
            title: title.to_string(),
            description,
            status: ChangeRequestStatus::Draft,
            creator: creator.to_string(),
            reviewer: None,
            review_comment: None,
            merge_commit: None,
            created_at: now.clone(),
            updated_at: now,
            merged_at: None,
        };
        self.changes.save(&id, &request)?;
        tracing::info!(id, environment, creator, "change request created");

        self.record(audit_entry(
            creator,
            "change_request.created",
            "change_request",
            &id,
            Some(environment),
            Some(request.op.domain()),
            serde_json::json!({ "title": title, "key": request.op.key() }),
            None,
        ))
        .await;

        Ok(request)
    }

    pub async fn submit_change_request(&self, id: &str, actor: &str) -> CoreResult<ChangeRequest> {
        let result = self.changes.update(id, |cr| {
            if cr.status != ChangeRequestStatus::Draft {
                return Err(CoreError::state_conflict("change request is not in draft"));
            }
            cr.status = ChangeRequestStatus::PendingReview;
            cr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        });

        match result {
            Ok(cr) => {
                self.record(audit_entry(
                    actor,
                    "change_request.submitted",
                    "change_request",
                    id,
                    Some(&cr.environment),
                    Some(cr.op.domain()),
                    serde_json::json!({}),
                    None,
                ))
                .await;
                Ok(cr)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn approve_change_request(&self, id: &str, reviewer: &str, comment: Option<String>) -> CoreResult<ChangeRequest> {
        let cr = self.changes.update(id, |cr| {
            if cr.status != ChangeRequestStatus::PendingReview {
                return Err(CoreError::state_conflict("change request is not pending review"));
            }
            cr.status = ChangeRequestStatus::Approved;
            cr.reviewer = Some(reviewer.to_string());
            cr.review_comment = comment.clone();
            cr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        })?;

        self.record(audit_entry(
            reviewer,
            "change_request.approved",
            "change_request",
            id,
            Some(&cr.environment),
            Some(cr.op.domain()),
            serde_json::json!({ "comment": cr.review_comment }),
            None,
        ))
        .await;
        Ok(cr)
    }

    pub async fn reject_change_request(&self, id: &str, reviewer: &str, comment: Option<String>) -> CoreResult<ChangeRequest> {
        let cr = self.changes.update(id, |cr| {
            if cr.status != ChangeRequestStatus::PendingReview {
                return Err(CoreError::state_conflict("change request is not pending review"));
            }
            cr.status = ChangeRequestStatus::Rejected;
            cr.reviewer = Some(reviewer.to_string());
            cr.review_comment = comment.clone();
            cr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        })?;

        self.record(audit_entry(
            reviewer,
            "change_request.rejected",
            "change_request",
            id,
            Some(&cr.environment),
            Some(cr.op.domain()),
            serde_json::json!({ "comment": cr.review_comment }),
            None,
        ))
        .await;
        Ok(cr)
    }

    pub async fn merge_change_request(&self, id: &str, actor: &str) -> CoreResult<ChangeRequest> {
        let cr = self.changes.load(id)?;
        if cr.status != ChangeRequestStatus::Approved {
            return Err(CoreError::state_conflict("change request is not approved"));
        }

        let mutation = MutationEngine::new(self.gateway, self.config);
        let sha = mutation.merge_draft(&cr.environment, id, &cr.title).await?;

        let cr = self.changes.update(id, |cr| {
            cr.status = ChangeRequestStatus::Merged;
            cr.merge_commit = Some(sha.clone());
            cr.merged_at = Some(Utc::now().to_rfc3339());
            cr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        })?;

        self.record(audit_entry(
            actor,
            "change_request.merged",
            "change_request",
            id,
            Some(&cr.environment),
            Some(cr.op.domain()),
            serde_json::json!({}),
            cr.merge_commit.clone(),
        ))
        .await;
        Ok(cr)
    }

    pub async fn discard_change_request(&self, id: &str, actor: &str) -> CoreResult<ChangeRequest> {
        let current = self.changes.load(id)?;
        if current.status == ChangeRequestStatus::Discarded {
            return Ok(current);
        }
        if !matches!(
            current.status,
            ChangeRequestStatus::Draft | ChangeRequestStatus::PendingReview | ChangeRequestStatus::Rejected
        ) {
            return Err(CoreError::state_conflict("change request cannot be discarded from its current state"));
        }

        let mutation = MutationEngine::new(self.gateway, self.config);
        mutation.discard_draft(id).await?;

        let cr = self.changes.update(id, |cr| {
            cr.status = ChangeRequestStatus::Discarded;
            cr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        })?;

        self.record(audit_entry(
            actor,
            "change_request.discarded",
            "change_request",
            id,
            Some(&cr.environment),
            Some(cr.op.domain()),
            serde_json::json!({}),
            None,
        ))
        .await;
        Ok(cr)
    }

    pub fn get_change_request(&self, id: &str) -> CoreResult<ChangeRequest> {
        self.changes.load(id)
    }

    pub fn list_change_requests(&self) -> CoreResult<Vec<ChangeRequest>> {
        self.changes.list()
    }

    // --- PromotionRequest ----------------------------------------------------

    pub async fn create_promotion_request(
        &self,
        source: &str,
        target: &str,
        domain: &str,
        keys: Vec<String>,
        requester: &str,
        notes: Option<String>,
    ) -> CoreResult<PromotionRequest> {
        PromotionEngine::validate_flow(source, target)?;
        if keys.is_empty() {
            return Err(CoreError::invalid_input("promotion request must include at least one file"));
        }

        let id = id::generate();
        let now = Utc::now().to_rfc3339();
        let request = PromotionRequest {
            id: id.clone(),
            source: source.to_string(),
            target: target.to_string(),
            domain: domain.to_string(),
            keys,
            status: PromotionRequestStatus::Pending,
            requester: requester.to_string(),
            reviewer: None,
            notes,
            review_notes: None,
            commit_sha: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.promotions.save(&id, &request)?;

        self.record(audit_entry(
            requester,
            "promotion.created",
            "promotion_request",
            &id,
            Some(target),
            Some(domain),
            serde_json::json!({ "source": source }),
            None,
        ))
        .await;
        Ok(request)
    }

    pub async fn approve_promotion(&self, id: &str, actor: &Actor, notes: Option<String>) -> CoreResult<PromotionRequest> {
        let current = self.promotions.load(id)?;
        if current.requester == actor.id && actor.role != Role::Admin {
            tracing::warn!(id, actor = %actor.id, "self-approval of promotion denied");
            return Err(CoreError::state_conflict("a requester cannot approve their own promotion"));
        }

        let pr = self.promotions.update(id, |pr| {
            if pr.status != PromotionRequestStatus::Pending {
                return Err(CoreError::state_conflict("promotion request is not pending"));
            }
            pr.status = PromotionRequestStatus::Approved;
            pr.reviewer = Some(actor.id.clone());
            pr.review_notes = notes.clone();
            pr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        })?;

        self.record(audit_entry(
            &actor.id,
            "promotion.approved",
            "promotion_request",
            id,
            Some(&pr.target),
            Some(&pr.domain),
            serde_json::json!({}),
            None,
        ))
        .await;
        Ok(pr)
    }

    pub async fn reject_promotion(&self, id: &str, actor: &str, notes: Option<String>) -> CoreResult<PromotionRequest> {
        let pr = self.promotions.update(id, |pr| {
            if pr.status != PromotionRequestStatus::Pending {
                return Err(CoreError::state_conflict("promotion request is not pending"));
            }
            pr.status = PromotionRequestStatus::Rejected;
            pr.reviewer = Some(actor.to_string());
            pr.review_notes = notes.clone();
            pr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        })?;

        self.record(audit_entry(
            actor,
            "promotion.rejected",
            "promotion_request",
            id,
            Some(&pr.target),
            Some(&pr.domain),
            serde_json::json!({}),
            None,
        ))
        .await;
        Ok(pr)
    }

    pub async fn execute_promotion(&self, id: &str, actor: &str) -> CoreResult<PromotionRequest> {
        let current = self.promotions.load(id)?;
        if current.status != PromotionRequestStatus::Approved {
            return Err(CoreError::state_conflict("promotion request is not approved"));
        }

        let engine = PromotionEngine::new(self.gateway, self.config);
        let outcome = engine
            .execute(id, &current.source, &current.target, &current.domain, &current.keys)
            .await;

        match outcome {
            Ok(sha) => {
                let pr = self.promotions.update(id, |pr| {
                    pr.status = PromotionRequestStatus::Promoted;
                    pr.commit_sha = Some(sha.clone());
                    pr.updated_at = Utc::now().to_rfc3339();
                    Ok(())
                })?;
                tracing::info!(id, sha, "promotion request executed");

                self.record(audit_entry(
                    actor,
                    "promotion.executed",
                    "promotion_request",
                    id,
                    Some(&pr.target),
                    Some(&pr.domain),
                    serde_json::json!({}),
                    pr.commit_sha.clone(),
                ))
                .await;
                Ok(pr)
            }
            Err(e) => {
                let pr = self.promotions.update(id, |pr| {
                    pr.status = PromotionRequestStatus::Failed;
                    pr.updated_at = Utc::now().to_rfc3339();
                    Ok(())
                })?;

                self.record(audit_entry(
                    actor,
                    "promotion.failed",
                    "promotion_request",
                    id,
                    Some(&pr.target),
                    Some(&pr.domain),
                    serde_json::json!({ "error": e.to_string() }),
                    None,
                ))
                .await;
                Err(e)
            }
        }
    }

    pub async fn rollback_promotion(&self, id: &str, actor: &str, reason: &str) -> CoreResult<PromotionRequest> {
        let current = self.promotions.load(id)?;
        if current.status != PromotionRequestStatus::Promoted {
            return Err(CoreError::state_conflict("promotion has not been executed"));
        }
        let original_commit = current
            .commit_sha
            .clone()
            .ok_or_else(|| CoreError::internal("promoted request has no recorded commit"))?;

        let engine = RollbackEngine::new(self.gateway, self.config);
        let sha = engine
            .rollback_promotion(id, &current.target, &current.domain, &current.keys, &original_commit, reason)
            .await?;

        let pr = self.promotions.update(id, |pr| {
            pr.status = PromotionRequestStatus::RolledBack;
            pr.updated_at = Utc::now().to_rfc3339();
            Ok(())
        })?;

        self.record(audit_entry(
            actor,
            "promotion.rolled_back",
            "promotion_request",
            id,
            Some(&pr.target),
            Some(&pr.domain),
            serde_json::json!({ "reason": reason }),
            Some(sha),
        ))
        .await;
        Ok(pr)
    }

    pub fn get_promotion_request(&self, id: &str) -> CoreResult<PromotionRequest> {
        self.promotions.load(id)
    }

    pub fn list_promotion_requests(&self) -> CoreResult<Vec<PromotionRequest>> {
        self.promotions.list()
    }
}

#[allow(clippy::too_many_arguments)]
fn audit_entry(
    actor: &str,
    action: &str,
    entity_type: &str,
    entity_id: &str,
    environment: Option<&str>,
    domain: Option<&str>,
    details: serde_json::Value,
    commit_sha: Option<String>,
) -> AuditEntry {
    AuditEntry {
        timestamp: Utc::now().to_rfc3339(),
        actor: actor.to_string(),
        action: action.to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        environment: environment.map(str::to_string),
        domain: domain.map(str::to_string),
        details,
        commit_sha,
    }
}
