//! Admin dashboards and user administration.

mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{decimal, response_json, TestApp};
use rstest::rstest;
use rust_decimal::Decimal;
use serde_json::json;
use timexpert_store::entities::{OrderStatus, Role};

/// Two customers: buyer completes one order, second cancels one and has one pending.
async fn seed_sales(app: &TestApp) -> (i32, i32) {
    let watches = app.seed_category("Watches").await;
    let straps = app.seed_category("Straps").await;
    let watch = app.seed_product(watches.id, "Seiko Alpinist", 500, 10).await;
    let strap = app.seed_product(straps.id, "NATO Strap", 20, 50).await;
    let (second_id, _) = app.create_user("second", Role::Buyer).await;

    let completed = app
        .place_cod_order(app.buyer_id, &[(watch.id, 2), (strap.id, 3)])
        .await;
    app.complete_order(completed).await;

    let canceled = app.place_cod_order(second_id, &[(watch.id, 1)]).await;
    app.state
        .services
        .orders
        .update_status(canceled, OrderStatus::Canceled)
        .await
        .expect("cancel");
    app.place_cod_order(second_id, &[(strap.id, 1)]).await;

    (watch.id, second_id)
}

#[tokio::test]
async fn summary_counts_orders_customers_and_revenue() {
    let app = TestApp::new().await;
    seed_sales(&app).await;

    let response = app
        .as_admin(Method::GET, "/api/admin/statistics/summary", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let data = &body["data"];
    assert_eq!(data["total_orders"], 3);
    assert_eq!(data["pending_orders"], 1);
    assert_eq!(data["completed_orders"], 1);
    assert_eq!(data["total_customers"], 2);
    assert_eq!(data["total_products"], 2);
    assert_eq!(decimal(&data["total_revenue"]), Decimal::from(1060));
}

#[tokio::test]
async fn revenue_breakdowns_for_today() {
    let app = TestApp::new().await;
    seed_sales(&app).await;
    let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();

    let response = app
        .as_admin(
            Method::GET,
            &format!("/api/admin/statistics/revenue/daily?from={today}&to={today}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(decimal(&body["data"][0]["revenue"]), Decimal::from(1060));

    let response = app
        .as_admin(
            Method::GET,
            &format!("/api/admin/statistics/revenue/category?from={today}&to={today}"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["category_name"], "Watches");
    assert_eq!(decimal(&body["data"][0]["revenue"]), Decimal::from(1000));
    assert_eq!(body["data"][1]["category_name"], "Straps");

    let response = app
        .as_admin(
            Method::GET,
            &format!("/api/admin/statistics/revenue/customer?from={today}&to={today}&limit=5"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["user_id"], app.buyer_id);
}

#[rstest]
#[case("/api/admin/statistics/revenue/daily?from=2024-13-01&to=2024-12-31")]
#[case("/api/admin/statistics/orders/daily?from=yesterday&to=today")]
#[case("/api/admin/statistics/revenue/category?from=2024-06-30&to=2024-06-01")]
#[tokio::test]
async fn invalid_date_ranges_are_bad_requests(#[case] uri: &str) {
    let app = TestApp::new().await;

    let response = app.as_admin(Method::GET, uri, None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rankings_and_inventory() {
    let app = TestApp::new().await;
    let (watch_id, second_id) = seed_sales(&app).await;

    let response = app
        .as_admin(Method::GET, "/api/admin/statistics/products/top-selling", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["product_name"], "NATO Strap");
    assert_eq!(body["data"][0]["quantity_sold"], 3);
    assert_eq!(body["data"][1]["product_id"], watch_id);

    let response = app
        .as_admin(
            Method::GET,
            "/api/admin/statistics/customers/top-completed-orders?limit=1",
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["user_id"], app.buyer_id);

    let response = app
        .as_admin(
            Method::GET,
            "/api/admin/statistics/customers/top-canceled-orders",
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["user_id"], second_id);
    assert_eq!(body["data"][0]["order_count"], 1);

    let response = app
        .as_admin(Method::GET, "/api/admin/statistics/inventory", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["product_id"], watch_id);
    assert_eq!(body["data"][0]["stock"], 8);
    assert_eq!(body["data"][1]["stock"], 46);
}

#[tokio::test]
async fn statistics_are_admin_only() {
    let app = TestApp::new().await;

    let response = app
        .as_buyer(Method::GET, "/api/admin/statistics/summary", None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_manages_user_accounts() {
    let app = TestApp::new().await;

    let response = app
        .as_admin(
            Method::POST,
            "/api/admin/users",
            Some(json!({
                "username": "staff",
                "password": "staff-pass",
                "email": "staff@timexpert.test",
                "role": "ADMIN"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let staff_id = body["data"]["id"].as_i64().expect("user id");
    assert_eq!(body["data"]["role"], "ADMIN");

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/admin/users/{}", staff_id),
            Some(json!({ "role": "BUYER", "phone": "0900000000" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["role"], "BUYER");
    assert_eq!(body["data"]["phone"], "0900000000");

    let response = app
        .as_admin(Method::GET, "/api/admin/users?role=ADMIN", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);

    let response = app
        .as_admin(Method::GET, "/api/admin/users?sortBy=shoe_size", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_admin(Method::DELETE, &format!("/api/admin/users/{}", staff_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .as_admin(Method::GET, &format!("/api/admin/users/{}", staff_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn users_with_orders_or_self_cannot_be_deleted() {
    let app = TestApp::new().await;
    let category = app.seed_category("Sport").await;
    let product = app.seed_product(category.id, "G-Shock", 100, 5).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;

    let response = app
        .as_admin(
            Method::DELETE,
            &format!("/api/admin/users/{}", app.buyer_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .as_admin(
            Method::DELETE,
            &format!("/api/admin/users/{}", app.admin_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_admin(
            Method::GET,
            &format!("/api/admin/users/{}/orders", app.buyer_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"][0]["order_id"], order_id);
}

#[tokio::test]
async fn user_search_matches_underscore_literally() {
    let app = TestApp::new().await;
    app.create_user("ops_lead", Role::Buyer).await;

    let response = app
        .as_admin(Method::GET, "/api/admin/users?search=_", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["username"], "ops_lead");

    let response = app
        .as_admin(Method::GET, "/api/admin/users?search=TIMEXPERT", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 3);
}
