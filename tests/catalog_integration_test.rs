//! Catalog browsing and administration.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal, response_json, TestApp};
use rust_decimal::Decimal;
use serde_json::json;

#[tokio::test]
async fn storefront_lists_only_visible_products() {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let shown = app.seed_product(category.id, "Orient Kamasu", 320, 5).await;
    let hidden = app.seed_product(category.id, "Orient Mako", 250, 5).await;

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/products/admin/toggle-visibility/{}", hidden.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["visible"], false);

    let response = app.request(Method::GET, "/api/products", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], shown.id);

    let response = app
        .request(Method::GET, &format!("/api/products/{}", hidden.id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.as_admin(Method::GET, "/api/products/admin", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);
}

#[tokio::test]
async fn search_filters_by_name_and_category() {
    let app = TestApp::new().await;
    let divers = app.seed_category("Diver").await;
    let dress = app.seed_category("Dress").await;
    app.seed_product(divers.id, "Seiko Turtle", 450, 3).await;
    app.seed_product(divers.id, "Citizen Promaster", 300, 3).await;
    app.seed_product(dress.id, "Seiko Presage", 500, 3).await;

    let response = app
        .request(Method::GET, "/api/products?name=seiko", None, None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);

    let response = app
        .request(
            Method::GET,
            &format!("/api/products?name=SEIKO&categoryId={}", divers.id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Seiko Turtle");
    assert_eq!(body["data"]["items"][0]["category_name"], "Diver");

    let response = app
        .request(Method::GET, "/api/products?categoryId=9999", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn price_bounds_ignore_negative_values() {
    let app = TestApp::new().await;
    let category = app.seed_category("Pilot").await;
    app.seed_product(category.id, "Orient Flight", 180, 4).await;
    app.seed_product(category.id, "Citizen Skyhawk", 420, 4).await;

    let response = app
        .request(Method::GET, "/api/products?maxPrice=-1", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);

    let response = app
        .request(Method::GET, "/api/products?minPrice=-50&maxPrice=200", None, None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Orient Flight");
}

#[tokio::test]
async fn name_search_treats_wildcards_literally() {
    let app = TestApp::new().await;
    let category = app.seed_category("Straps").await;
    app.seed_product(category.id, "100% Silk Strap", 40, 4).await;
    app.seed_product(category.id, "1000 Series Bracelet", 90, 4).await;
    app.seed_product(category.id, "Steel_Link Band", 60, 4).await;
    app.seed_product(category.id, "Steel Mesh Band", 60, 4).await;

    let response = app
        .request(Method::GET, "/api/products?name=100%25", None, None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "100% Silk Strap");

    let response = app
        .request(Method::GET, "/api/products?name=steel_", None, None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["name"], "Steel_Link Band");
}

#[tokio::test]
async fn pagination_reports_total_pages() {
    let app = TestApp::new().await;
    let category = app.seed_category("Field").await;
    for i in 0..5 {
        app.seed_product(category.id, &format!("Field Watch {}", i), 100 + i, 2)
            .await;
    }

    let response = app
        .request(Method::GET, "/api/products?page=2&limit=2", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["page"], 2);
    assert_eq!(body["data"]["limit"], 2);
    assert_eq!(body["data"]["total"], 5);
    assert_eq!(body["data"]["total_pages"], 3);
    assert_eq!(body["data"]["items"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn admin_creates_and_updates_products() {
    let app = TestApp::new().await;
    let category = app.seed_category("Chronograph").await;

    let response = app
        .as_admin(
            Method::POST,
            "/api/products",
            Some(json!({
                "name": "Tissot PRX Chrono",
                "price": "1500",
                "stock": 4,
                "barcode": "TIS-PRX-01",
                "category_id": category.id,
                "image_urls": ["https://cdn.timexpert.test/prx-1.jpg", "https://cdn.timexpert.test/prx-2.jpg"]
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let product_id = body["data"]["id"].as_i64().expect("product id");
    assert_eq!(decimal(&body["data"]["price"]), Decimal::from(1500));
    assert_eq!(
        body["data"]["primary_image_url"],
        "https://cdn.timexpert.test/prx-1.jpg"
    );

    // Same barcode on another product.
    let response = app
        .as_admin(
            Method::POST,
            "/api/products",
            Some(json!({
                "name": "Copycat",
                "price": "10",
                "stock": 1,
                "barcode": "TIS-PRX-01",
                "category_id": category.id
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/products/{}", product_id),
            Some(json!({
                "name": "Tissot PRX Chronograph",
                "price": "1400",
                "stock": 6,
                "barcode": "TIS-PRX-01",
                "category_id": category.id
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["name"], "Tissot PRX Chronograph");
    assert_eq!(body["data"]["stock"], 6);

    let response = app
        .as_buyer(
            Method::POST,
            "/api/products",
            Some(json!({ "name": "x", "price": "1", "stock": 1, "category_id": category.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn hiding_a_product_keeps_it_for_admins() {
    let app = TestApp::new().await;
    let category = app.seed_category("Pilot").await;
    let product = app.seed_product(category.id, "Laco Augsburg", 600, 2).await;

    let response = app
        .as_admin(
            Method::DELETE,
            &format!("/api/products/admin/products/{}", product.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::GET, &format!("/api/products/{}", product.id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.as_admin(Method::GET, "/api/products/admin", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["items"][0]["visible"], false);
}

#[tokio::test]
async fn category_with_products_cannot_be_deleted() {
    let app = TestApp::new().await;
    let full = app.seed_category("Skeleton").await;
    app.seed_product(full.id, "Open Heart", 200, 1).await;
    let empty = app.seed_category("Smart").await;

    let response = app
        .as_admin(Method::DELETE, &format!("/api/categories/{}", full.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .as_admin(Method::DELETE, &format!("/api/categories/{}", empty.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, &format!("/api/categories/{}", empty.id), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn hidden_categories_are_admin_only() {
    let app = TestApp::new().await;
    let category = app.seed_category("Vintage").await;
    app.seed_category("Modern").await;

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/categories/{}/toggle-visibility", category.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.request(Method::GET, "/api/categories", None, None).await;
    let body = response_json(response).await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .expect("category list")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Modern"]);

    let response = app.as_admin(Method::GET, "/api/categories/admin", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(2));
}
