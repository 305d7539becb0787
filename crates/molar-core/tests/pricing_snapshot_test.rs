//! Integration tests for the frozen-pricing guarantee: snapshots are
//! computed once at item creation and never move with the catalog.

use rust_decimal::Decimal;
use uuid::Uuid;

use molar_core::PlanError;
use molar_core::catalog::{MaterialGroup, MaterialOption, ServiceDefinition, TomlCatalog};
use molar_core::items::{self, NewItem};
use molar_core::service::{self, NewPlan};
use molar_test_utils::{create_test_db, drop_test_db};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn filling_service(base: &str) -> (ServiceDefinition, Uuid) {
    let resin_id = Uuid::new_v4();
    let service = ServiceDefinition {
        id: Uuid::new_v4(),
        name: "Composite filling".to_string(),
        base_price: dec(base),
        fixed_materials_cost: dec("12.50"),
        optional_material_groups: vec![MaterialGroup {
            id: Uuid::new_v4(),
            name: "Restoration material".to_string(),
            is_mandatory: true,
            quantity: 2,
            options: vec![MaterialOption {
                id: resin_id,
                name: "Composite resin".to_string(),
                price: dec("30.00"),
            }],
        }],
    };
    (service, resin_id)
}

#[tokio::test]
async fn snapshot_components_are_persisted_individually() {
    let (pool, db_name) = create_test_db().await;

    let plan = service::create_plan(
        &pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "Fillings"),
    )
    .await
    .unwrap();

    let mut catalog = TomlCatalog::new();
    let (svc, resin_id) = filling_service("85.00");
    let svc_id = svc.id;
    catalog.insert(svc);

    let item = items::add_item(
        &pool,
        &catalog,
        plan.id,
        NewItem::new(svc_id).with_material(resin_id),
    )
    .await
    .unwrap();

    assert_eq!(item.price_service, dec("85.00"));
    assert_eq!(item.price_fixed_materials, dec("12.50"));
    assert_eq!(item.price_material, dec("60.00"));
    assert_eq!(item.price_total, dec("157.50"));
    assert_eq!(
        item.price_total,
        item.price_service + item.price_fixed_materials + item.price_material
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

/// Scenario: the catalog price changes after the item was created; the
/// stored snapshot must not move.
#[tokio::test]
async fn catalog_price_drift_does_not_touch_stored_snapshots() {
    let (pool, db_name) = create_test_db().await;

    let plan = service::create_plan(
        &pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "Cleaning"),
    )
    .await
    .unwrap();

    let svc_id = Uuid::new_v4();
    let mut catalog = TomlCatalog::new();
    catalog.insert(ServiceDefinition {
        id: svc_id,
        name: "Dental cleaning".to_string(),
        base_price: dec("100.00"),
        fixed_materials_cost: Decimal::ZERO,
        optional_material_groups: Vec::new(),
    });

    let item = items::add_item(&pool, &catalog, plan.id, NewItem::new(svc_id))
        .await
        .unwrap();
    assert_eq!(item.price_service, dec("100.00"));

    // The practice raises the price.
    catalog.insert(ServiceDefinition {
        id: svc_id,
        name: "Dental cleaning".to_string(),
        base_price: dec("150.00"),
        fixed_materials_cost: Decimal::ZERO,
        optional_material_groups: Vec::new(),
    });

    // The existing item keeps its frozen snapshot.
    let (_, stored) = service::get_plan_with_items(&pool, plan.id).await.unwrap();
    assert_eq!(stored[0].price_service, dec("100.00"));
    assert_eq!(stored[0].price_total, dec("100.00"));

    // A new item picks up the new price.
    let new_item = items::add_item(&pool, &catalog, plan.id, NewItem::new(svc_id))
        .await
        .unwrap();
    assert_eq!(new_item.price_service, dec("150.00"));

    // And the old one still has not moved.
    let (_, stored) = service::get_plan_with_items(&pool, plan.id).await.unwrap();
    assert_eq!(stored[0].price_service, dec("100.00"));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn mandatory_material_without_selection_is_rejected() {
    let (pool, db_name) = create_test_db().await;

    let plan = service::create_plan(
        &pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "Fillings"),
    )
    .await
    .unwrap();

    let mut catalog = TomlCatalog::new();
    let (svc, _) = filling_service("85.00");
    let svc_id = svc.id;
    catalog.insert(svc);

    let result = items::add_item(&pool, &catalog, plan.id, NewItem::new(svc_id)).await;
    assert!(matches!(result.unwrap_err(), PlanError::Validation(_)));

    // Nothing was inserted.
    let (_, stored) = service::get_plan_with_items(&pool, plan.id).await.unwrap();
    assert!(stored.is_empty());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let (pool, db_name) = create_test_db().await;

    let plan = service::create_plan(
        &pool,
        NewPlan::new(Uuid::new_v4(), Uuid::new_v4(), "Empty catalog"),
    )
    .await
    .unwrap();

    let catalog = TomlCatalog::new();
    let result = items::add_item(&pool, &catalog, plan.id, NewItem::new(Uuid::new_v4())).await;
    assert!(matches!(
        result.unwrap_err(),
        PlanError::NotFound { entity: "service", .. }
    ));

    pool.close().await;
    drop_test_db(&db_name).await;
}
