mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use stockroom_api::errors::{CartPhase, ServiceError};

#[tokio::test]
async fn idle_pending_carts_expire_and_lose_their_lines() {
    let app = TestApp::new().await;
    app.seed_item("Pencil", 10).await;

    let cart = app.services.carts.create_cart().await.expect("create cart");
    app.stage(cart.id, "Pencil", 2).await;

    let now = Utc::now() + Duration::hours(2);
    let expired = app
        .services
        .approvals
        .sweep_expired_carts(Duration::hours(1), now)
        .await
        .expect("sweep");
    assert_eq!(expired, 1);

    // Lines are gone and the cart left the pending list.
    let lines = app
        .services
        .carts
        .list_line_items(cart.id)
        .await
        .expect("cart row still exists");
    assert!(lines.is_empty());
    let pending = app.services.carts.list_pending().await.expect("list pending");
    assert!(pending.iter().all(|c| c.id != cart.id));

    // The terminal state is observable by a late approval.
    let result = app
        .services
        .approvals
        .approve_cart(cart.id, &app.staff(), None)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidState(CartPhase::Expired)));

    // Expiry reclaims the reservation without touching stock.
    assert_eq!(app.quantity("Pencil").await, 10);
}

#[tokio::test]
async fn sweep_is_idempotent() {
    let app = TestApp::new().await;

    app.services.carts.create_cart().await.expect("create cart");

    let now = Utc::now() + Duration::hours(2);
    let first = app
        .services
        .approvals
        .sweep_expired_carts(Duration::hours(1), now)
        .await
        .expect("first sweep");
    assert_eq!(first, 1);

    let second = app
        .services
        .approvals
        .sweep_expired_carts(Duration::hours(1), now)
        .await
        .expect("second sweep");
    assert_eq!(second, 0);
}

#[tokio::test]
async fn fresh_carts_are_left_alone() {
    let app = TestApp::new().await;

    let cart = app.services.carts.create_cart().await.expect("create cart");

    let expired = app
        .services
        .approvals
        .sweep_expired_carts(Duration::hours(1), Utc::now())
        .await
        .expect("sweep");
    assert_eq!(expired, 0);

    let pending = app.services.carts.list_pending().await.expect("list pending");
    assert!(pending.iter().any(|c| c.id == cart.id));
}

#[tokio::test]
async fn staging_on_an_expired_cart_is_rejected() {
    let app = TestApp::new().await;

    let cart = app.services.carts.create_cart().await.expect("create cart");
    let now = Utc::now() + Duration::hours(2);
    app.services
        .approvals
        .sweep_expired_carts(Duration::hours(1), now)
        .await
        .expect("sweep");

    let result = app
        .services
        .carts
        .add_line_item(
            cart.id,
            stockroom_api::services::AddLineItemInput {
                product_name: "Pencil".to_string(),
                quantity: 1,
            },
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidState(CartPhase::Expired)));
}
