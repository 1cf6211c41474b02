mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal::Decimal;
use rstest::rstest;
use serde_json::json;

#[tokio::test]
async fn empty_cart_for_new_user() {
    let app = TestApp::new().await;

    let response = app.as_buyer(Method::GET, "/api/carts", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
    assert_eq!(decimal(&body["data"]["total"]), Decimal::ZERO);
}

#[tokio::test]
async fn adding_the_same_product_merges_lines() {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let product = app.seed_product(category.id, "Seiko SKX007", 250, 5).await;

    for _ in 0..2 {
        let response = app
            .as_buyer(
                Method::POST,
                "/api/carts/items",
                Some(json!({ "product_id": product.id, "quantity": 2 })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.as_buyer(Method::GET, "/api/carts", None).await;
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 4);
    assert_eq!(decimal(&body["data"]["total"]), Decimal::from(1000));
}

#[rstest]
#[case(6)]
#[case(10)]
#[tokio::test]
async fn adding_more_than_stock_is_a_conflict(#[case] quantity: i32) {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let product = app.seed_product(category.id, "Limited Edition", 900, 5).await;

    let response = app
        .as_buyer(
            Method::POST,
            "/api/carts/items",
            Some(json!({ "product_id": product.id, "quantity": quantity })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn hidden_products_cannot_be_added() {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let product = app.seed_product(category.id, "Retired Model", 100, 5).await;
    app.state
        .services
        .products
        .hide(product.id)
        .await
        .expect("hide product");

    let response = app
        .as_buyer(
            Method::POST,
            "/api/carts/items",
            Some(json!({ "product_id": product.id, "quantity": 1 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn updating_quantity_to_zero_removes_the_line() {
    let app = TestApp::new().await;
    let category = app.seed_category("Dress").await;
    let first = app.seed_product(category.id, "Cartier Tank", 3000, 3).await;
    let second = app.seed_product(category.id, "JLC Reverso", 7000, 3).await;

    for id in [first.id, second.id] {
        app.as_buyer(
            Method::POST,
            "/api/carts/items",
            Some(json!({ "product_id": id, "quantity": 1 })),
        )
        .await;
    }

    let response = app
        .as_buyer(
            Method::PUT,
            &format!("/api/carts/items/{}", first.id),
            Some(json!({ "quantity": 4 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .as_buyer(
            Method::PUT,
            &format!("/api/carts/items/{}", first.id),
            Some(json!({ "quantity": 0 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], second.id);
}

#[tokio::test]
async fn batch_remove_and_clear() {
    let app = TestApp::new().await;
    let category = app.seed_category("Sport").await;
    let a = app.seed_product(category.id, "A", 10, 9).await;
    let b = app.seed_product(category.id, "B", 20, 9).await;
    let c = app.seed_product(category.id, "C", 30, 9).await;

    for id in [a.id, b.id, c.id] {
        app.as_buyer(
            Method::POST,
            "/api/carts/items",
            Some(json!({ "product_id": id, "quantity": 1 })),
        )
        .await;
    }

    let response = app
        .as_buyer(
            Method::DELETE,
            "/api/carts/items/batch",
            Some(json!({ "product_ids": [a.id, c.id, 4242] })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], b.id);

    let response = app.as_buyer(Method::DELETE, "/api/carts", None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.as_buyer(Method::GET, "/api/carts", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn removing_a_product_not_in_cart_is_not_found() {
    let app = TestApp::new().await;
    let category = app.seed_category("Sport").await;
    let product = app.seed_product(category.id, "Lonely", 10, 1).await;

    let response = app
        .as_buyer(
            Method::DELETE,
            &format!("/api/carts/items/{}", product.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
