//! Integration tests for the plan lifecycle engine.
//!
//! Each test creates a unique temporary database (shared PostgreSQL
//! container via molar-test-utils), runs migrations, and drops it on
//! completion so tests are fully isolated.

use sqlx::PgPool;
use uuid::Uuid;

use molar_core::PlanError;
use molar_core::catalog::{ServiceDefinition, TomlCatalog};
use molar_core::items::{self, NewItem};
use molar_core::lifecycle;
use molar_core::service::{self, NewPlan};
use molar_db::models::{PlanState, TreatmentPlan};
use molar_test_utils::{create_test_db, drop_test_db};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn simple_service(base: &str) -> ServiceDefinition {
    ServiceDefinition {
        id: Uuid::new_v4(),
        name: "Dental cleaning".to_string(),
        base_price: base.parse().unwrap(),
        fixed_materials_cost: "0".parse().unwrap(),
        optional_material_groups: Vec::new(),
    }
}

async fn draft_plan(pool: &PgPool) -> TreatmentPlan {
    service::create_plan(
        pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "Restoration program"),
    )
    .await
    .expect("create_plan should succeed")
}

/// Create a draft plan with one priced item.
async fn draft_plan_with_item(pool: &PgPool) -> TreatmentPlan {
    let plan = draft_plan(pool).await;
    let mut catalog = TomlCatalog::new();
    let svc = simple_service("100.00");
    let service_id = svc.id;
    catalog.insert(svc);

    items::add_item(pool, &catalog, plan.id, NewItem::new(service_id))
        .await
        .expect("add_item should succeed");
    plan
}

// ---------------------------------------------------------------------------
// present
// ---------------------------------------------------------------------------

#[tokio::test]
async fn present_succeeds_with_items() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan_with_item(&pool).await;
    let presented = lifecycle::present(&pool, plan.id).await.unwrap();

    assert_eq!(presented.state, PlanState::Presented);
    assert!(presented.presented_at.is_some());
    assert!(presented.version > plan.version);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn present_empty_plan_fails_and_leaves_state_unchanged() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan(&pool).await;
    let result = lifecycle::present(&pool, plan.id).await;

    match result.unwrap_err() {
        PlanError::Validation(msg) => {
            assert!(msg.contains("at least one procedure"), "got: {msg}")
        }
        other => panic!("expected Validation, got {other:?}"),
    }

    let unchanged = service::get_plan(&pool, plan.id).await.unwrap();
    assert_eq!(unchanged.state, PlanState::Draft);
    assert!(unchanged.presented_at.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn present_unknown_plan_is_not_found() {
    let (pool, db_name) = create_test_db().await;

    let result = lifecycle::present(&pool, Uuid::new_v4()).await;
    assert!(matches!(result.unwrap_err(), PlanError::NotFound { .. }));

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// accept / reject
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accept_after_present_sets_accepted_at() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan_with_item(&pool).await;
    lifecycle::present(&pool, plan.id).await.unwrap();
    let accepted = lifecycle::accept(&pool, plan.id).await.unwrap();

    assert_eq!(accepted.state, PlanState::Accepted);
    assert!(accepted.accepted_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn accept_from_draft_is_invalid() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan_with_item(&pool).await;
    let result = lifecycle::accept(&pool, plan.id).await;

    match result.unwrap_err() {
        PlanError::InvalidTransition { from, to } => {
            assert_eq!(from, PlanState::Draft);
            assert_eq!(to, PlanState::Accepted);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

/// Scenario: present, reject with a reason, then try to accept.
#[tokio::test]
async fn rejection_stores_reason_and_blocks_acceptance() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan_with_item(&pool).await;
    lifecycle::present(&pool, plan.id).await.unwrap();

    let rejected = lifecycle::reject(&pool, plan.id, Some("cost declined"))
        .await
        .unwrap();
    assert_eq!(rejected.state, PlanState::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("cost declined"));

    let result = lifecycle::accept(&pool, plan.id).await;
    assert!(matches!(
        result.unwrap_err(),
        PlanError::InvalidTransition {
            from: PlanState::Rejected,
            to: PlanState::Accepted,
        }
    ));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn reject_from_draft_is_allowed() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan(&pool).await;
    let rejected = lifecycle::reject(&pool, plan.id, None).await.unwrap();

    assert_eq!(rejected.state, PlanState::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some(""));

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// cancel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_requires_nonempty_reason() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan_with_item(&pool).await;
    lifecycle::present(&pool, plan.id).await.unwrap();
    lifecycle::accept(&pool, plan.id).await.unwrap();

    let result = lifecycle::cancel(&pool, plan.id, "   ").await;
    assert!(matches!(result.unwrap_err(), PlanError::Validation(_)));

    // State unchanged.
    let unchanged = service::get_plan(&pool, plan.id).await.unwrap();
    assert_eq!(unchanged.state, PlanState::Accepted);

    let cancelled = lifecycle::cancel(&pool, plan.id, "patient moved away")
        .await
        .unwrap();
    assert_eq!(cancelled.state, PlanState::Cancelled);
    assert_eq!(
        cancelled.cancellation_reason.as_deref(),
        Some("patient moved away")
    );
    assert!(cancelled.cancelled_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn cancel_from_draft_is_invalid() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan_with_item(&pool).await;
    let result = lifecycle::cancel(&pool, plan.id, "changed my mind").await;

    assert!(matches!(
        result.unwrap_err(),
        PlanError::InvalidTransition {
            from: PlanState::Draft,
            to: PlanState::Cancelled,
        }
    ));

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Monotonicity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn terminal_plans_refuse_every_further_transition() {
    let (pool, db_name) = create_test_db().await;

    let plan = draft_plan_with_item(&pool).await;
    lifecycle::present(&pool, plan.id).await.unwrap();
    lifecycle::reject(&pool, plan.id, Some("too expensive"))
        .await
        .unwrap();

    assert!(matches!(
        lifecycle::present(&pool, plan.id).await.unwrap_err(),
        PlanError::InvalidTransition { .. }
    ));
    assert!(matches!(
        lifecycle::accept(&pool, plan.id).await.unwrap_err(),
        PlanError::InvalidTransition { .. }
    ));
    assert!(matches!(
        lifecycle::reject(&pool, plan.id, None).await.unwrap_err(),
        PlanError::InvalidTransition { .. }
    ));
    assert!(matches!(
        lifecycle::cancel(&pool, plan.id, "reason").await.unwrap_err(),
        PlanError::InvalidTransition { .. }
    ));

    // The plan is still exactly as the rejection left it.
    let final_plan = service::get_plan(&pool, plan.id).await.unwrap();
    assert_eq!(final_plan.state, PlanState::Rejected);
    assert_eq!(final_plan.rejection_reason.as_deref(), Some("too expensive"));

    pool.close().await;
    drop_test_db(&db_name).await;
}
