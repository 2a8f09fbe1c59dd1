mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use stockroom_api::errors::ServiceError;
use stockroom_api::services::CatalogKind;

#[tokio::test]
async fn merging_vendors_repoints_items_and_drops_the_loser() {
    let app = TestApp::new().await;
    app.seed_item_with_vendor("Pencil", "Acme Co", 5).await;
    app.seed_item_with_vendor("Pen", "Acme Co", 5).await;
    app.seed_item_with_vendor("Eraser", "Acme Co", 5).await;
    app.services
        .catalog
        .get_or_create(CatalogKind::Vendor, "Acme Corp")
        .await
        .expect("create target vendor");

    let outcome = app
        .services
        .normalizer
        .merge_references(&app.admin(), CatalogKind::Vendor, "Acme Co", "Acme Corp")
        .await
        .expect("merge vendors");
    assert_eq!(outcome.repointed, 3);
    assert_eq!(outcome.deleted, 1);

    let surviving = app
        .services
        .catalog
        .resolve_id(CatalogKind::Vendor, "Acme Corp")
        .await
        .expect("surviving vendor");
    for name in ["Pencil", "Pen", "Eraser"] {
        let item = app.services.catalog.get_item(name).await.expect("item");
        assert_eq!(item.vendor_id, surviving);
    }

    let gone = app
        .services
        .catalog
        .resolve_id(CatalogKind::Vendor, "Acme Co")
        .await;
    assert_matches!(gone, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn merging_into_a_nonexistent_target_is_rejected() {
    let app = TestApp::new().await;
    app.seed_item_with_vendor("Pencil", "Acme Co", 5).await;

    let result = app
        .services
        .normalizer
        .merge_references(&app.admin(), CatalogKind::Vendor, "Acme Co", "Acme Corp")
        .await;
    assert_matches!(result, Err(ServiceError::NotFound(_)));

    // The losing row is untouched on rejection.
    app.services
        .catalog
        .resolve_id(CatalogKind::Vendor, "Acme Co")
        .await
        .expect("vendor still present");
}

#[tokio::test]
async fn merging_an_unreferenced_name_just_deletes_it() {
    let app = TestApp::new().await;
    app.services
        .catalog
        .get_or_create(CatalogKind::Brand, "NoName")
        .await
        .expect("create brand");
    app.services
        .catalog
        .get_or_create(CatalogKind::Brand, "HouseBrand")
        .await
        .expect("create brand");

    let outcome = app
        .services
        .normalizer
        .merge_references(&app.admin(), CatalogKind::Brand, "NoName", "HouseBrand")
        .await
        .expect("merge brands");
    assert_eq!(outcome.repointed, 0);
    assert_eq!(outcome.deleted, 1);

    let gone = app
        .services
        .catalog
        .resolve_id(CatalogKind::Brand, "NoName")
        .await;
    assert_matches!(gone, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn merging_an_absent_loser_is_a_noop() {
    let app = TestApp::new().await;
    app.services
        .catalog
        .get_or_create(CatalogKind::Category, "Supplies")
        .await
        .expect("create category");

    let outcome = app
        .services
        .normalizer
        .merge_references(&app.admin(), CatalogKind::Category, "Phantom", "Supplies")
        .await
        .expect("merge categories");
    assert_eq!(outcome.repointed, 0);
    assert_eq!(outcome.deleted, 0);
}

#[tokio::test]
async fn renaming_over_an_existing_name_conflicts() {
    let app = TestApp::new().await;
    app.services
        .catalog
        .get_or_create(CatalogKind::Vendor, "Acme Co")
        .await
        .expect("create vendor");
    app.services
        .catalog
        .get_or_create(CatalogKind::Vendor, "Acme Corp")
        .await
        .expect("create vendor");

    let result = app
        .services
        .normalizer
        .rename_reference(&app.admin(), CatalogKind::Vendor, "Acme Co", "Acme Corp")
        .await;
    assert_matches!(result, Err(ServiceError::Conflict(_)));

    // Renaming a name that does not exist changes nothing.
    let changed = app
        .services
        .normalizer
        .rename_reference(&app.admin(), CatalogKind::Vendor, "Phantom", "Fresh Name")
        .await
        .expect("rename");
    assert_eq!(changed, 0);

    let changed = app
        .services
        .normalizer
        .rename_reference(&app.admin(), CatalogKind::Vendor, "Acme Co", "Acme Supply")
        .await
        .expect("rename");
    assert_eq!(changed, 1);
}

#[tokio::test]
async fn merging_duplicate_items_adds_quantities() {
    let app = TestApp::new().await;
    app.seed_item("Blue Pen", 7).await;
    app.seed_item("Blue Pen (dup)", 4).await;

    let surviving = app
        .services
        .normalizer
        .merge_duplicate_items(&app.admin(), "Blue Pen", "Blue Pen (dup)")
        .await
        .expect("merge duplicates");
    assert_eq!(surviving, 11);
    assert_eq!(app.quantity("Blue Pen").await, 11);

    let gone = app.services.catalog.get_item("Blue Pen (dup)").await;
    assert_matches!(gone, Err(ServiceError::NotFound(_)));
}

#[tokio::test]
async fn cart_lines_for_a_merged_away_name_surface_at_approval() {
    let app = TestApp::new().await;
    app.seed_item("Blue Pen", 7).await;
    app.seed_item("Blue Pen (dup)", 4).await;

    let cart = app.services.carts.create_cart().await.expect("create cart");
    app.stage(cart.id, "Blue Pen (dup)", 1).await;

    app.services
        .normalizer
        .merge_duplicate_items(&app.admin(), "Blue Pen", "Blue Pen (dup)")
        .await
        .expect("merge duplicates");

    // The line still points at the removed name by string; the approval
    // reports it rather than guessing the survivor.
    let result = app
        .services
        .approvals
        .approve_cart(cart.id, &app.staff(), None)
        .await;
    assert_matches!(result, Err(ServiceError::UnresolvedProduct(name)) if name == "Blue Pen (dup)");
}

#[tokio::test]
async fn unused_reference_deletion_refuses_while_referenced() {
    let app = TestApp::new().await;
    app.seed_item_with_vendor("Pencil", "Acme Co", 5).await;

    let deleted = app
        .services
        .normalizer
        .delete_unused_reference(&app.admin(), CatalogKind::Vendor, "Acme Co")
        .await
        .expect("attempt delete");
    assert!(!deleted, "referenced vendor must not be deleted");

    app.services
        .normalizer
        .remove_item_and_inventory(&app.admin(), "Pencil")
        .await
        .expect("remove item");

    let deleted = app
        .services
        .normalizer
        .delete_unused_reference(&app.admin(), CatalogKind::Vendor, "Acme Co")
        .await
        .expect("delete now unreferenced");
    assert!(deleted);
}

#[tokio::test]
async fn unused_item_deletion_refuses_while_inventory_exists() {
    let app = TestApp::new().await;
    app.seed_item("Pencil", 5).await;

    let deleted = app
        .services
        .normalizer
        .delete_unused_item(&app.admin(), "Pencil")
        .await
        .expect("attempt delete");
    assert!(!deleted, "item with an inventory row must not be deleted");

    app.services.catalog.get_item("Pencil").await.expect("item survives");
}

#[tokio::test]
async fn reassignment_is_all_or_none() {
    let app = TestApp::new().await;
    app.seed_item("Pencil", 5).await;
    let before = app.services.catalog.get_item("Pencil").await.expect("item");

    app.services
        .catalog
        .get_or_create(CatalogKind::Vendor, "Initech")
        .await
        .expect("create vendor");

    // Category and brand do not resolve; nothing may be repointed.
    let result = app
        .services
        .normalizer
        .reassign_item_details(&app.admin(), "Pencil", "Initech", "Hardware", "OfficePro")
        .await;
    let message = match result {
        Err(ServiceError::UnresolvedReference(message)) => message,
        other => panic!("expected UnresolvedReference, got {:?}", other),
    };
    assert!(message.contains("category 'Hardware'"));
    assert!(message.contains("brand 'OfficePro'"));
    assert!(!message.contains("vendor"));

    let after = app.services.catalog.get_item("Pencil").await.expect("item");
    assert_eq!(after.vendor_id, before.vendor_id);
    assert_eq!(after.category_id, before.category_id);
    assert_eq!(after.brand_id, before.brand_id);

    // With every name resolvable the reassignment lands whole.
    app.services
        .catalog
        .get_or_create(CatalogKind::Category, "Hardware")
        .await
        .expect("create category");
    app.services
        .catalog
        .get_or_create(CatalogKind::Brand, "OfficePro")
        .await
        .expect("create brand");

    app.services
        .normalizer
        .reassign_item_details(&app.admin(), "Pencil", "Initech", "Hardware", "OfficePro")
        .await
        .expect("reassign");

    let after = app.services.catalog.get_item("Pencil").await.expect("item");
    assert_ne!(after.vendor_id, before.vendor_id);
    assert_ne!(after.category_id, before.category_id);
    assert_ne!(after.brand_id, before.brand_id);
}

#[tokio::test]
async fn updates_validate_their_inputs() {
    let app = TestApp::new().await;
    app.seed_item("Pencil", 5).await;

    let result = app
        .services
        .normalizer
        .update_quantity(&app.admin(), "Pencil", -1)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidInput(_)));

    app.services
        .normalizer
        .update_quantity(&app.admin(), "Pencil", 25)
        .await
        .expect("update quantity");
    assert_eq!(app.quantity("Pencil").await, 25);

    let result = app
        .services
        .normalizer
        .update_cost(&app.admin(), "Pencil", dec!(-1.50))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidInput(_)));

    app.services
        .normalizer
        .update_cost(&app.admin(), "Pencil", dec!(2.45))
        .await
        .expect("update cost");
    let item = app.services.catalog.get_item("Pencil").await.expect("item");
    assert_eq!(item.cost, dec!(2.45));
}

#[tokio::test]
async fn normalizer_operations_require_the_admin_role() {
    let app = TestApp::new().await;
    app.seed_item("Pencil", 5).await;
    let staff = app.staff();

    let rename = app
        .services
        .normalizer
        .rename_reference(&staff, CatalogKind::Vendor, "Acme Corp", "Acme")
        .await;
    assert_matches!(rename, Err(ServiceError::Unauthorized(_)));

    let merge = app
        .services
        .normalizer
        .merge_duplicate_items(&staff, "Pencil", "Pen")
        .await;
    assert_matches!(merge, Err(ServiceError::Unauthorized(_)));

    let update = app
        .services
        .normalizer
        .update_quantity(&staff, "Pencil", 1)
        .await;
    assert_matches!(update, Err(ServiceError::Unauthorized(_)));

    // State is untouched.
    assert_eq!(app.quantity("Pencil").await, 5);
}

#[tokio::test]
async fn renaming_an_item_follows_the_conflict_rules() {
    let app = TestApp::new().await;
    app.seed_item("Blue Pen", 5).await;
    app.seed_item("Black Pen", 5).await;

    let result = app
        .services
        .normalizer
        .rename_item(&app.admin(), "Blue Pen", "Black Pen")
        .await;
    assert_matches!(result, Err(ServiceError::Conflict(_)));

    let changed = app
        .services
        .normalizer
        .rename_item(&app.admin(), "Blue Pen", "Navy Pen")
        .await
        .expect("rename item");
    assert_eq!(changed, 1);

    app.services.catalog.get_item("Navy Pen").await.expect("renamed item");
    let old = app.services.catalog.get_item("Blue Pen").await;
    assert_matches!(old, Err(ServiceError::NotFound(_)));
}
