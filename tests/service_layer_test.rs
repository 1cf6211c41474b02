//! Service operations without an HTTP route of their own.

mod common;

use assert_matches::assert_matches;
use common::{TestApp, TEST_PASSWORD};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use timexpert_store::{
    config::AdminBootstrapConfig,
    entities::{invoice, AuthProvider, Role},
    errors::ServiceError,
};

#[tokio::test]
async fn oauth_login_provisions_then_refreshes_account() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;

    let created = users
        .upsert_oauth_user(AuthProvider::Google, Some("buyer.two@gmail.test"), Some("Lan Pham"))
        .await
        .expect("provision");
    assert_eq!(created.username, "buyer.two");
    assert_eq!(created.role, Role::Buyer);
    assert_eq!(created.provider, AuthProvider::Google);
    assert_eq!(created.first_name.as_deref(), Some("Lan"));
    assert_eq!(created.last_name.as_deref(), Some("Pham"));

    let refreshed = users
        .upsert_oauth_user(
            AuthProvider::Google,
            Some("buyer.two@gmail.test"),
            Some("Lan Thi Pham"),
        )
        .await
        .expect("refresh");
    assert_eq!(refreshed.id, created.id);
    assert_eq!(refreshed.last_name.as_deref(), Some("Thi Pham"));
    assert!(users
        .exists_by_email("buyer.two@gmail.test")
        .await
        .expect("lookup"));
}

#[tokio::test]
async fn oauth_username_collisions_get_a_counter() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;

    let model = users
        .upsert_oauth_user(AuthProvider::Facebook, Some("buyer@facebook.test"), None)
        .await
        .expect("provision");
    assert_eq!(model.username, "buyer1");
    assert_eq!(model.first_name.as_deref(), Some("User"));
    assert_eq!(model.last_name.as_deref(), Some("buyer1"));
}

#[tokio::test]
async fn oauth_refuses_email_of_a_local_account() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;

    let err = users
        .upsert_oauth_user(AuthProvider::Google, Some("buyer@timexpert.test"), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BadRequest(_));

    let err = users
        .upsert_oauth_user(AuthProvider::Google, None, Some("No Email"))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BadRequest(_));
}

#[tokio::test]
async fn bootstrap_admin_is_created_once() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;
    let bootstrap = AdminBootstrapConfig {
        username: "owner".to_string(),
        password: "owner-pass".to_string(),
        email: "owner@timexpert.test".to_string(),
    };

    assert!(users.ensure_admin_account(&bootstrap).await.expect("first run"));
    assert!(!users.ensure_admin_account(&bootstrap).await.expect("second run"));

    let owner = users
        .authenticate("owner", "owner-pass")
        .await
        .expect("owner login");
    assert_eq!(owner.role, Role::Admin);
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let app = TestApp::new().await;
    let users = &app.state.services.users;

    let unknown = users.authenticate("nobody", TEST_PASSWORD).await.unwrap_err();
    let wrong = users.authenticate("buyer", "bad-password").await.unwrap_err();
    assert_eq!(unknown.to_string(), wrong.to_string());
    assert_matches!(wrong, ServiceError::Unauthorized(_));
}

#[tokio::test]
async fn product_lookup_by_name_fragment() {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let first = app.seed_product(category.id, "Seiko Prospex Turtle", 400, 2).await;
    app.seed_product(category.id, "Seiko Prospex Samurai", 450, 2).await;

    let products = &app.state.services.products;
    let found = products
        .find_first_by_name("PROSPEX")
        .await
        .expect("lookup")
        .expect("a match");
    assert_eq!(found.id, first.id);
    assert!(products
        .find_first_by_name("omega")
        .await
        .expect("lookup")
        .is_none());
    assert!(products
        .find_first_by_name("   ")
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn completed_orders_feed_review_eligibility() {
    let app = TestApp::new().await;
    let category = app.seed_category("Field").await;
    let product = app.seed_product(category.id, "Khaki Field Auto", 500, 9).await;
    let first = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;
    let second = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;
    app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;
    app.complete_order(second).await;
    app.complete_order(first).await;

    let eligible = app
        .state
        .services
        .orders
        .completed_orders_containing(app.buyer_id, product.id)
        .await
        .expect("eligible orders");
    assert_eq!(eligible, vec![first, second]);
}

#[tokio::test]
async fn invoice_is_created_once_per_order() {
    let app = TestApp::new().await;
    let category = app.seed_category("Dress").await;
    let product = app.seed_product(category.id, "Tissot Everytime", 200, 3).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;

    let invoices = &app.state.services.invoices;
    let first = invoices.get_or_create(order_id).await.expect("invoice");
    let again = invoices.get_or_create(order_id).await.expect("invoice");
    assert_eq!(first.id, again.id);
    assert_eq!(first.invoice_number, again.invoice_number);

    let err = invoices.get_or_create(9999).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn simultaneous_invoice_requests_share_one_invoice() {
    let app = TestApp::new().await;
    let category = app.seed_category("Skeleton").await;
    let product = app.seed_product(category.id, "Orient Star Skeleton", 700, 3).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;

    let invoices = &app.state.services.invoices;
    let (first, second) = tokio::join!(
        invoices.invoice_for_order(order_id),
        invoices.get_or_create(order_id)
    );
    let first = first.expect("invoice detail");
    let second = second.expect("invoice");
    assert_eq!(first.invoice_number, second.invoice_number);

    let stored = invoice::Entity::find()
        .filter(invoice::Column::OrderId.eq(order_id))
        .count(app.state.db.as_ref())
        .await
        .expect("count invoices");
    assert_eq!(stored, 1);
}
