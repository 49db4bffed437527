mod common;

use confgov_core::review::audit::InMemoryAuditSink;
use confgov_core::review::{Actor, ChangeOp, Role};
use confgov_core::review::ReviewEngine;
use confgov_core::snapshot::SnapshotReader;
use confgov_core::drift::DriftAnalyzer;

#[tokio::test]
async fn create_and_merge() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = common::open_gateway(dir.path()).await;
    let config = common::service_config(dir.path());
    let audit = InMemoryAuditSink::new();
    let engine = ReviewEngine::new(&gateway, &config, &audit).unwrap();

    let cr = engine
        .create_change_request(
            "dev",
            ChangeOp::Create {
                domain: "pricing".to_string(),
                key: "default".to_string(),
                content: "rate: 0.1\n".to_string(),
            },
            "init",
            None,
            "alice",
        )
        .await
        .unwrap();

    engine.submit_change_request(&cr.id, "alice").await.unwrap();
    engine.approve_change_request(&cr.id, "bob", None).await.unwrap();
    let merged = engine.merge_change_request(&cr.id, "bob").await.unwrap();
    assert!(merged.merge_commit.is_some());

    let reader = SnapshotReader::new(&gateway, &config);
    let snapshot = reader.get_config("dev", "pricing", "default").await.unwrap();
    assert_eq!(snapshot.raw, b"rate: 0.1\n");

    let history = reader.get_config_history("dev", "pricing", "default").await.unwrap();
    assert!(history[0].message.trim_start().starts_with("merge:"));
}

#[tokio::test]
async fn promotion_dev_to_staging() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = common::open_gateway(dir.path()).await;
    let config = common::service_config(dir.path());
    let audit = InMemoryAuditSink::new();
    let engine = ReviewEngine::new(&gateway, &config, &audit).unwrap();

    let cr = engine
        .create_change_request(
            "dev",
            ChangeOp::Create {
                domain: "pricing".to_string(),
                key: "default".to_string(),
                content: "rate: 0.1\n".to_string(),
            },
            "init",
            None,
            "alice",
        )
        .await
        .unwrap();
    engine.submit_change_request(&cr.id, "alice").await.unwrap();
    engine.approve_change_request(&cr.id, "bob", None).await.unwrap();
    engine.merge_change_request(&cr.id, "bob").await.unwrap();

    let pr = engine
        .create_promotion_request("dev", "staging", "pricing", vec!["default".to_string()], "alice", None)
        .await
        .unwrap();
    let alice = Actor {
        id: "bob".to_string(),
        role: Role::Member,
    };
    engine.approve_promotion(&pr.id, &alice, None).await.unwrap();
    let executed = engine.execute_promotion(&pr.id, "bob").await.unwrap();
    assert!(executed.commit_sha.is_some());

    let reader = SnapshotReader::new(&gateway, &config);
    let snapshot = reader.get_config("staging", "pricing", "default").await.unwrap();
    assert_eq!(snapshot.raw, b"rate: 0.1\n");
}

#[tokio::test]
async fn promotion_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = common::open_gateway(dir.path()).await;
    let config = common::service_config(dir.path());
    let audit = InMemoryAuditSink::new();
    let engine = ReviewEngine::new(&gateway, &config, &audit).unwrap();

    let cr = engine
        .create_change_request(
            "dev",
            ChangeOp::Create {
                domain: "pricing".to_string(),
                key: "default".to_string(),
                content: "rate: 0.1\n".to_string(),
            },
            "init",
            None,
            "alice",
        )
        .await
        .unwrap();
    engine.submit_change_request(&cr.id, "alice").await.unwrap();
    engine.approve_change_request(&cr.id, "bob", None).await.unwrap();
    engine.merge_change_request(&cr.id, "bob").await.unwrap();

    let pr = engine
        .create_promotion_request("dev", "staging", "pricing", vec!["default".to_string()], "alice", None)
        .await
        .unwrap();
    let bob = Actor {
        id: "bob".to_string(),
        role: Role::Member,
    };
    engine.approve_promotion(&pr.id, &bob, None).await.unwrap();
    engine.execute_promotion(&pr.id, "bob").await.unwrap();

    let rolled_back = engine.rollback_promotion(&pr.id, "bob", "regression").await.unwrap();
    assert_eq!(
        rolled_back.status,
        confgov_core::review::PromotionRequestStatus::RolledBack
    );

    let reader = SnapshotReader::new(&gateway, &config);
    let err = reader.get_config("staging", "pricing", "default").await.unwrap_err();
    assert_eq!(err.kind(), confgov_core::error::ErrorKind::NotFound);
}

#[tokio::test]
async fn drift_after_divergence() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = common::open_gateway(dir.path()).await;
    let config = common::service_config(dir.path());
    let audit = InMemoryAuditSink::new();
    let engine = ReviewEngine::new(&gateway, &config, &audit).unwrap();

    let cr = engine
        .create_change_request(
            "dev",
            ChangeOp::Create {
                domain: "pricing".to_string(),
                key: "default".to_string(),
                content: "rate: 0.1\n".to_string(),
            },
            "init",
            None,
            "alice",
        )
        .await
        .unwrap();
    engine.submit_change_request(&cr.id, "alice").await.unwrap();
    engine.approve_change_request(&cr.id, "bob", None).await.unwrap();
    engine.merge_change_request(&cr.id, "bob").await.unwrap();

    let pr = engine
        .create_promotion_request("dev", "staging", "pricing", vec!["default".to_string()], "alice", None)
        .await
        .unwrap();
    let bob = Actor {
        id: "bob".to_string(),
        role: Role::Member,
    };
    engine.approve_promotion(&pr.id, &bob, None).await.unwrap();
    engine.execute_promotion(&pr.id, "bob").await.unwrap();

    let staging_change = engine
        .create_change_request(
            "staging",
            ChangeOp::Update {
                domain: "pricing".to_string(),
                key: "default".to_string(),
                content: "rate: 0.2\n".to_string(),
            },
            "bump rate",
            None,
            "carol",
        )
        .await
        .unwrap();
    engine.submit_change_request(&staging_change.id, "carol").await.unwrap();
    engine.approve_change_request(&staging_change.id, "bob", None).await.unwrap();
    engine.merge_change_request(&staging_change.id, "bob").await.unwrap();

    let analyzer = DriftAnalyzer::new(&gateway, &config);
    let report = analyzer.analyze().await.unwrap();
    let domain = report.domains.iter().find(|d| d.domain == "pricing").unwrap();
    let key = domain.keys.iter().find(|k| k.key == "default").unwrap();

    assert_eq!(key.status, confgov_core::drift::DriftStatus::Drifted);
    assert_eq!(key.dev_vs_staging, confgov_core::drift::PairLabel::Different);
    assert_eq!(key.staging_vs_prod, confgov_core::drift::PairLabel::MissingTarget);
}

#[tokio::test]
async fn invalid_yaml_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = common::open_gateway(dir.path()).await;
    let config = common::service_config(dir.path());
    let audit = InMemoryAuditSink::new();
    let engine = ReviewEngine::new(&gateway, &config, &audit).unwrap();

    let result = engine
        .create_change_request(
            "dev",
            ChangeOp::Create {
                domain: "pricing".to_string(),
                key: "default".to_string(),
                content: "a: [1,\n".to_string(),
            },
            "broken",
            None,
            "alice",
        )
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.kind(), confgov_core::error::ErrorKind::InvalidInput);

    // no change-request metadata and no dangling draft branch
    assert!(engine.list_change_requests().unwrap().is_empty());
    gateway
        .with_repo(|scoped| {
            assert!(!scoped.branch_exists("draft/whatever-it-would-have-been")?);
            Ok(())
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn self_approval_of_promotion_denied() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = common::open_gateway(dir.path()).await;
    let config = common::service_config(dir.path());
    let audit = InMemoryAuditSink::new();
    let engine = ReviewEngine::new(&gateway, &config, &audit).unwrap();

    let cr = engine
        .create_change_request(
            "dev",
            ChangeOp::Create {
                domain: "pricing".to_string(),
                key: "default".to_string(),
                content: "rate: 0.1\n".to_string(),
            },
            "init",
            None,
            "alice",
        )
        .await
        .unwrap();
    engine.submit_change_request(&cr.id, "alice").await.unwrap();
    engine.approve_change_request(&cr.id, "bob", None).await.unwrap();
    engine.merge_change_request(&cr.id, "bob").await.unwrap();

    let pr = engine
        .create_promotion_request("dev", "staging", "pricing", vec!["default".to_string()], "u1", None)
        .await
        .unwrap();

    let u1_member = Actor {
        id: "u1".to_string(),
        role: Role::Member,
    };
    let denied = engine.approve_promotion(&pr.id, &u1_member, None).await.unwrap_err();
    assert_eq!(denied.kind(), confgov_core::error::ErrorKind::StateConflict);

    let u1_admin = Actor {
        id: "u1".to_string(),
        role: Role::Admin,
    };
    let approved = engine.approve_promotion(&pr.id, &u1_admin, None).await.unwrap();
    assert_eq!(approved.status, confgov_core::review::PromotionRequestStatus::Approved);
}
