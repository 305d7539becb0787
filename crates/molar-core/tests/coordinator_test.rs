//! Integration tests for the item completion coordinator: episode linkage,
//! manual completion, idempotence, and automatic plan progression.

use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use molar_core::PlanError;
use molar_core::catalog::{ServiceDefinition, TomlCatalog};
use molar_core::coordinator;
use molar_core::episode::{self, EpisodeEvent};
use molar_core::items::{self, NewItem};
use molar_core::lifecycle;
use molar_core::service::{self, NewPlan};
use molar_db::models::{ItemState, PlanState};
use molar_test_utils::{create_test_db, drop_test_db};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn service_def(name: &str, base: &str, fixed: &str) -> ServiceDefinition {
    ServiceDefinition {
        id: Uuid::new_v4(),
        name: name.to_string(),
        base_price: base.parse().unwrap(),
        fixed_materials_cost: fixed.parse().unwrap(),
        optional_material_groups: Vec::new(),
    }
}

/// Create an accepted two-item plan: item A (base 100, no materials) and
/// item B (base 50, fixed materials 10). Returns (plan_id, item_a, item_b).
async fn accepted_two_item_plan(pool: &PgPool) -> (Uuid, Uuid, Uuid) {
    let plan = service::create_plan(
        pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "Restoration program"),
    )
    .await
    .unwrap();

    let mut catalog = TomlCatalog::new();
    let svc_a = service_def("Dental cleaning", "100.00", "0.00");
    let svc_b = service_def("Fluoride treatment", "50.00", "10.00");
    let (svc_a_id, svc_b_id) = (svc_a.id, svc_b.id);
    catalog.insert(svc_a);
    catalog.insert(svc_b);

    let item_a = items::add_item(pool, &catalog, plan.id, NewItem::new(svc_a_id))
        .await
        .unwrap();
    let item_b = items::add_item(pool, &catalog, plan.id, NewItem::new(svc_b_id))
        .await
        .unwrap();

    lifecycle::present(pool, plan.id).await.unwrap();
    lifecycle::accept(pool, plan.id).await.unwrap();

    (plan.id, item_a.id, item_b.id)
}

// ---------------------------------------------------------------------------
// Happy path (Scenario A)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn episodes_complete_items_and_advance_the_plan() {
    let (pool, db_name) = create_test_db().await;

    let (_, item_a, item_b) = accepted_two_item_plan(&pool).await;
    let ep1 = Uuid::new_v4();
    let ep2 = Uuid::new_v4();
    let visit = Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap();

    // First episode: item A completes, plan auto-advances to in_progress.
    let outcome = coordinator::link_episode_to_item(&pool, item_a, ep1, Some(visit))
        .await
        .unwrap();
    assert_eq!(outcome.item.state, ItemState::Completed);
    assert_eq!(outcome.item.realized_date, Some(visit));
    assert_eq!(outcome.item.episode_id, Some(ep1));
    assert_eq!(outcome.plan.state, PlanState::InProgress);
    assert_eq!(outcome.progress.completed, 1);
    assert_eq!(outcome.progress.total, 2);
    assert_eq!(outcome.progress.percent_complete(), 50);

    // Second episode: item B completes, plan auto-advances to completed.
    let outcome = coordinator::link_episode_to_item(&pool, item_b, ep2, None)
        .await
        .unwrap();
    assert_eq!(outcome.item.state, ItemState::Completed);
    assert_eq!(outcome.plan.state, PlanState::Completed);
    assert!(outcome.plan.completed_at.is_some());
    assert_eq!(outcome.progress.percent_complete(), 100);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn single_item_plan_passes_through_in_progress() {
    let (pool, db_name) = create_test_db().await;

    let plan = service::create_plan(
        &pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "One extraction"),
    )
    .await
    .unwrap();

    let mut catalog = TomlCatalog::new();
    let svc = service_def("Extraction", "120.00", "5.00");
    let svc_id = svc.id;
    catalog.insert(svc);
    let item = items::add_item(&pool, &catalog, plan.id, NewItem::new(svc_id))
        .await
        .unwrap();

    lifecycle::present(&pool, plan.id).await.unwrap();
    lifecycle::accept(&pool, plan.id).await.unwrap();

    let outcome = coordinator::complete_item_manually(&pool, item.id)
        .await
        .unwrap();
    // Both automatic edges fire within the one completion.
    assert_eq!(outcome.plan.state, PlanState::Completed);
    assert!(outcome.plan.completed_at.is_some());

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Idempotence and conflicts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn linking_the_same_episode_twice_is_a_noop() {
    let (pool, db_name) = create_test_db().await;

    let (_, item_a, _) = accepted_two_item_plan(&pool).await;
    let ep1 = Uuid::new_v4();
    let visit = Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap();

    let first = coordinator::link_episode_to_item(&pool, item_a, ep1, Some(visit))
        .await
        .unwrap();
    let second = coordinator::link_episode_to_item(&pool, item_a, ep1, Some(visit))
        .await
        .unwrap();

    assert_eq!(second.item.state, ItemState::Completed);
    assert_eq!(second.item.realized_date, first.item.realized_date);
    assert_eq!(second.item.version, first.item.version);
    assert_eq!(second.progress, first.progress);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn retried_link_is_safe_even_after_the_plan_completes() {
    let (pool, db_name) = create_test_db().await;

    let (_, item_a, item_b) = accepted_two_item_plan(&pool).await;
    let ep1 = Uuid::new_v4();
    let ep2 = Uuid::new_v4();

    coordinator::link_episode_to_item(&pool, item_a, ep1, None)
        .await
        .unwrap();
    let done = coordinator::link_episode_to_item(&pool, item_b, ep2, None)
        .await
        .unwrap();
    assert_eq!(done.plan.state, PlanState::Completed);

    // A delayed retry of the first link arrives after the plan closed.
    let retry = coordinator::link_episode_to_item(&pool, item_a, ep1, None)
        .await
        .unwrap();
    assert_eq!(retry.item.state, ItemState::Completed);
    assert_eq!(retry.plan.state, PlanState::Completed);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn linking_a_second_episode_is_a_conflict() {
    let (pool, db_name) = create_test_db().await;

    let (_, item_a, _) = accepted_two_item_plan(&pool).await;
    let ep1 = Uuid::new_v4();
    let ep2 = Uuid::new_v4();

    coordinator::link_episode_to_item(&pool, item_a, ep1, None)
        .await
        .unwrap();
    let result = coordinator::link_episode_to_item(&pool, item_a, ep2, None).await;

    match result.unwrap_err() {
        PlanError::EpisodeLinkConflict {
            item_id,
            linked_episode_id,
        } => {
            assert_eq!(item_id, item_a);
            assert_eq!(linked_episode_id, ep1);
        }
        other => panic!("expected EpisodeLinkConflict, got {other:?}"),
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn completing_a_completed_item_manually_is_a_noop() {
    let (pool, db_name) = create_test_db().await;

    let (_, item_a, _) = accepted_two_item_plan(&pool).await;

    let first = coordinator::complete_item_manually(&pool, item_a)
        .await
        .unwrap();
    let second = coordinator::complete_item_manually(&pool, item_a)
        .await
        .unwrap();

    assert_eq!(second.item.version, first.item.version);
    assert_eq!(second.item.realized_date, first.item.realized_date);
    assert_eq!(second.progress, first.progress);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn episode_link_on_manually_completed_item_records_the_link() {
    let (pool, db_name) = create_test_db().await;

    let (_, item_a, _) = accepted_two_item_plan(&pool).await;
    let ep1 = Uuid::new_v4();

    let manual = coordinator::complete_item_manually(&pool, item_a)
        .await
        .unwrap();
    assert_eq!(manual.item.episode_id, None);

    let linked = coordinator::link_episode_to_item(&pool, item_a, ep1, None)
        .await
        .unwrap();
    assert_eq!(linked.item.episode_id, Some(ep1));
    assert_eq!(linked.item.state, ItemState::Completed);
    assert_eq!(linked.item.realized_date, manual.item.realized_date);

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_outside_an_active_plan_is_locked() {
    let (pool, db_name) = create_test_db().await;

    let plan = service::create_plan(
        &pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "Pending program"),
    )
    .await
    .unwrap();

    let mut catalog = TomlCatalog::new();
    let svc = service_def("Cleaning", "40.00", "0.00");
    let svc_id = svc.id;
    catalog.insert(svc);
    let item = items::add_item(&pool, &catalog, plan.id, NewItem::new(svc_id))
        .await
        .unwrap();

    // Still draft.
    let result = coordinator::complete_item_manually(&pool, item.id).await;
    assert!(matches!(
        result.unwrap_err(),
        PlanError::PlanLocked {
            state: PlanState::Draft
        }
    ));

    // Presented but not yet accepted.
    lifecycle::present(&pool, plan.id).await.unwrap();
    let result = coordinator::link_episode_to_item(&pool, item.id, Uuid::new_v4(), None).await;
    assert!(matches!(
        result.unwrap_err(),
        PlanError::PlanLocked {
            state: PlanState::Presented
        }
    ));

    // The item never moved.
    let (_, items) = service::get_plan_with_items(&pool, plan.id).await.unwrap();
    assert_eq!(items[0].state, ItemState::Pending);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn completing_an_unknown_item_is_not_found() {
    let (pool, db_name) = create_test_db().await;

    let result = coordinator::complete_item_manually(&pool, Uuid::new_v4()).await;
    assert!(matches!(result.unwrap_err(), PlanError::NotFound { .. }));

    pool.close().await;
    drop_test_db(&db_name).await;
}

// ---------------------------------------------------------------------------
// Episode event adapter
// ---------------------------------------------------------------------------

#[tokio::test]
async fn free_standing_episode_is_ignored() {
    let (pool, db_name) = create_test_db().await;

    let event = EpisodeEvent {
        episode_id: Uuid::new_v4(),
        date: Some(Utc::now()),
        plan_item_id: None,
    };
    let outcome = episode::handle_episode(&pool, &event).await.unwrap();
    assert!(outcome.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn episode_event_with_item_reference_completes_it() {
    let (pool, db_name) = create_test_db().await;

    let (_, item_a, _) = accepted_two_item_plan(&pool).await;
    let event = EpisodeEvent {
        episode_id: Uuid::new_v4(),
        date: None,
        plan_item_id: Some(item_a),
    };

    let outcome = episode::handle_episode(&pool, &event)
        .await
        .unwrap()
        .expect("outcome expected for referenced item");
    assert_eq!(outcome.item.state, ItemState::Completed);
    assert_eq!(outcome.item.episode_id, Some(event.episode_id));
    assert_eq!(outcome.plan.state, PlanState::InProgress);

    pool.close().await;
    drop_test_db(&db_name).await;
}
