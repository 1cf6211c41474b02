//! Checkout, cancellation, admin workflow and VNPay return handling.

mod common;

use std::{collections::HashMap, sync::Arc};

use assert_matches::assert_matches;
use axum::http::{header, Method, StatusCode};
use common::{decimal, response_json, RecordingRefunds, TestApp, PAYMENT_RESULT_URL};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use timexpert_store::{
    entities::{OrderStatus, Role},
    errors::ServiceError,
    services::payments::{VnPayGateway, VNP_SECURE_HASH},
};

fn order_body(items: Value, payment_method: &str) -> Value {
    json!({
        "items": items,
        "full_name_shipping": "Tran Thi B",
        "phone_shipping": "0912345678",
        "address_shipping": "12 Nguyen Hue, District 1",
        "notes": "Gift wrap please",
        "payment_method": payment_method
    })
}

async fn stock_of(app: &TestApp, product_id: i32) -> i32 {
    app.state
        .services
        .products
        .get(product_id, false)
        .await
        .expect("product")
        .stock
}

/// Query string for a VNPay return signed with the test secret.
fn signed_return_query(app: &TestApp, order_id: i32, response_code: &str) -> String {
    let mut params: HashMap<String, String> = [
        ("vnp_Amount", "90000000".to_string()),
        ("vnp_BankCode", "NCB".to_string()),
        ("vnp_OrderInfo", format!("Thanh toan don hang {}", order_id)),
        ("vnp_ResponseCode", response_code.to_string()),
        ("vnp_TmnCode", app.state.config.vnpay.tmn_code.clone()),
        ("vnp_TransactionNo", "14012345".to_string()),
        ("vnp_TxnRef", order_id.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let gateway = VnPayGateway::new(app.state.config.vnpay.clone());
    let signature = gateway.sign_params(&params).expect("signature");
    params.insert(VNP_SECURE_HASH.to_string(), signature);

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

#[tokio::test]
async fn cod_checkout_reserves_stock_and_totals_lines() {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let diver = app.seed_product(category.id, "Seiko Turtle", 400, 5).await;
    let strap = app.seed_product(category.id, "Rubber Strap", 50, 10).await;

    let response = app
        .as_buyer(
            Method::POST,
            "/api/orders/create",
            Some(order_body(
                json!([
                    { "product_id": diver.id, "quantity": 2 },
                    { "product_id": strap.id, "quantity": 1 }
                ]),
                "COD",
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let order = &body["data"]["order"];
    assert_eq!(order["status"], "PENDING");
    assert_eq!(order["payment_method"], "COD");
    assert_eq!(decimal(&order["total_amount"]), Decimal::from(850));
    assert_eq!(order["items"].as_array().map(Vec::len), Some(2));
    assert!(body["data"]["payment_url"].is_null());

    assert_eq!(stock_of(&app, diver.id).await, 3);
    assert_eq!(stock_of(&app, strap.id).await, 9);

    let response = app.as_buyer(Method::GET, "/api/orders/me", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let plenty = app.seed_product(category.id, "Common", 100, 10).await;
    let scarce = app.seed_product(category.id, "Rare", 900, 1).await;

    let response = app
        .as_buyer(
            Method::POST,
            "/api/orders/create",
            Some(order_body(
                json!([
                    { "product_id": plenty.id, "quantity": 3 },
                    { "product_id": scarce.id, "quantity": 2 }
                ]),
                "COD",
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert_eq!(stock_of(&app, plenty.id).await, 10);
    assert_eq!(stock_of(&app, scarce.id).await, 1);

    let response = app.as_buyer(Method::GET, "/api/orders/me", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 0);
}

#[tokio::test]
async fn checkout_requires_shipping_details_and_items() {
    let app = TestApp::new().await;
    let category = app.seed_category("Diver").await;
    let product = app.seed_product(category.id, "Seiko", 100, 10).await;

    let response = app
        .as_buyer(
            Method::POST,
            "/api/orders/create",
            Some(json!({
                "items": [{ "product_id": product.id, "quantity": 1 }],
                "payment_method": "COD"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_buyer(
            Method::POST,
            "/api/orders/create",
            Some(order_body(json!([]), "COD")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn buyer_cancel_restocks_and_requires_reason() {
    let app = TestApp::new().await;
    let category = app.seed_category("Dress").await;
    let product = app.seed_product(category.id, "Nomos Tangente", 1800, 4).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 3)]).await;
    assert_eq!(stock_of(&app, product.id).await, 1);

    let response = app
        .as_buyer(
            Method::POST,
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "   " })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .as_buyer(
            Method::POST,
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "Changed my mind" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "CANCELED");
    assert_eq!(body["data"]["cancellation_reason"], "Changed my mind");
    assert_eq!(stock_of(&app, product.id).await, 4);
}

/// Places a COD order for the buyer and marks it PAID.
async fn paid_order(app: &TestApp, product_id: i32, quantity: i32) -> i32 {
    let order_id = app
        .place_cod_order(app.buyer_id, &[(product_id, quantity)])
        .await;
    app.state
        .services
        .orders
        .update_status(order_id, OrderStatus::Paid)
        .await
        .expect("mark paid");
    order_id
}

#[tokio::test]
async fn canceling_a_paid_order_refunds_it_first() {
    let refunds = Arc::new(RecordingRefunds::default());
    let app = TestApp::with_refunds(refunds.clone()).await;
    let category = app.seed_category("Chronograph").await;
    let product = app.seed_product(category.id, "Speedmaster", 2500, 3).await;
    let unpaid = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;
    let paid = paid_order(&app, product.id, 2).await;
    assert_eq!(stock_of(&app, product.id).await, 0);

    let response = app
        .as_buyer(
            Method::POST,
            &format!("/api/orders/{}/cancel", unpaid),
            Some(json!({ "reason": "Ordered twice" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(refunds.refunded().is_empty());

    let response = app
        .as_buyer(
            Method::POST,
            &format!("/api/orders/{}/cancel", paid),
            Some(json!({ "reason": "Found it cheaper" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "CANCELED");
    assert_eq!(refunds.refunded(), vec![(paid, OrderStatus::Paid)]);
    assert_eq!(stock_of(&app, product.id).await, 3);
}

#[tokio::test]
async fn failed_refund_keeps_order_paid_and_stock_reserved() {
    let app = TestApp::with_refunds(Arc::new(RecordingRefunds::failing())).await;
    let category = app.seed_category("Chronograph").await;
    let product = app.seed_product(category.id, "Navitimer", 3000, 5).await;
    let order_id = paid_order(&app, product.id, 2).await;

    let response = app
        .as_buyer(
            Method::POST,
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "No longer needed" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(stock_of(&app, product.id).await, 3);

    let err = app
        .state
        .services
        .orders
        .update_status(order_id, OrderStatus::Canceled)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));
    assert_eq!(stock_of(&app, product.id).await, 3);

    let order = app
        .state
        .services
        .orders
        .get_order(order_id)
        .await
        .expect("order");
    assert_eq!(order.status, OrderStatus::Paid);
    assert!(order.cancellation_reason.is_none());
}

#[tokio::test]
async fn shipped_orders_cannot_be_canceled_by_buyer() {
    let app = TestApp::new().await;
    let category = app.seed_category("Dress").await;
    let product = app.seed_product(category.id, "Orient Bambino", 150, 4).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;

    let orders = &app.state.services.orders;
    orders
        .update_status(order_id, OrderStatus::Processing)
        .await
        .expect("processing");
    orders
        .update_status(order_id, OrderStatus::Shipped)
        .await
        .expect("shipped");

    let response = app
        .as_buyer(
            Method::POST,
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "Too slow" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stock_of(&app, product.id).await, 3);
}

#[tokio::test]
async fn admin_status_workflow_enforces_transitions() {
    let app = TestApp::new().await;
    let category = app.seed_category("Pilot").await;
    let product = app.seed_product(category.id, "Stowa Flieger", 700, 2).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/admin/orders/{}/status", order_id),
            Some(json!({ "status": "COMPLETED" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for status in ["PROCESSING", "SHIPPED", "COMPLETED"] {
        let response = app
            .as_admin(
                Method::PUT,
                &format!("/api/admin/orders/{}/status", order_id),
                Some(json!({ "status": status })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "moving to {}", status);
        let body = response_json(response).await;
        assert_eq!(body["data"]["status"], status);
    }

    let err = app
        .state
        .services
        .orders
        .update_status(order_id, OrderStatus::Canceled)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::BadRequest(_));
    assert_eq!(stock_of(&app, product.id).await, 1);
}

#[tokio::test]
async fn admin_cancel_restocks() {
    let app = TestApp::new().await;
    let category = app.seed_category("Pilot").await;
    let product = app.seed_product(category.id, "Archimede", 500, 5).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 2)]).await;

    let response = app
        .as_admin(
            Method::PUT,
            &format!("/api/admin/orders/{}/status", order_id),
            Some(json!({ "status": "CANCELED" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(stock_of(&app, product.id).await, 5);
}

#[tokio::test]
async fn admin_order_listing_filters_and_validates_sort() {
    let app = TestApp::new().await;
    let category = app.seed_category("Pilot").await;
    let product = app.seed_product(category.id, "Flieger", 100, 10).await;
    let first = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;
    app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;
    app.state
        .services
        .orders
        .update_status(first, OrderStatus::Processing)
        .await
        .expect("processing");

    let response = app
        .as_admin(Method::GET, "/api/admin/orders?status=PROCESSING", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["order_id"], first);

    let response = app
        .as_admin(Method::GET, "/api/admin/orders?sortBy=colour", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.as_buyer(Method::GET, "/api/admin/orders", None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn other_buyers_cannot_see_or_cancel_an_order() {
    let app = TestApp::new().await;
    let category = app.seed_category("Dress").await;
    let product = app.seed_product(category.id, "Junghans Max Bill", 900, 3).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(product.id, 1)]).await;
    let (_, stranger) = app.create_user("stranger", Role::Buyer).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/{}", order_id),
            None,
            Some(&stranger),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .request(
            Method::POST,
            &format!("/api/orders/{}/cancel", order_id),
            Some(json!({ "reason": "not mine" })),
            Some(&stranger),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .as_admin(Method::GET, &format!("/api/orders/{}", order_id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn vnpay_success_marks_paid_and_cleans_cart() {
    let app = TestApp::new().await;
    let category = app.seed_category("Luxury").await;
    let watch = app.seed_product(category.id, "Grand Seiko Snowflake", 900, 2).await;
    let other = app.seed_product(category.id, "Travel Case", 40, 5).await;

    for id in [watch.id, other.id] {
        app.as_buyer(
            Method::POST,
            "/api/carts/items",
            Some(json!({ "product_id": id, "quantity": 1 })),
        )
        .await;
    }

    let response = app
        .as_buyer(
            Method::POST,
            "/api/orders/create",
            Some(order_body(
                json!([{ "product_id": watch.id, "quantity": 1 }]),
                "VN_PAY",
            )),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    let order_id = body["data"]["order"]["order_id"].as_i64().expect("order id") as i32;
    let payment_url = body["data"]["payment_url"].as_str().expect("payment url");
    assert!(payment_url.contains(&format!("vnp_TxnRef={}", order_id)));
    assert!(payment_url.contains("vnp_Amount=90000&"));
    assert!(payment_url.contains("vnp_SecureHash="));

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/orders/vnpay_return?{}",
                signed_return_query(&app, order_id, "00")
            ),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with(PAYMENT_RESULT_URL));
    assert!(target.contains(&format!("orderId={}", order_id)));
    assert!(target.contains("status=paid"));

    let order = app
        .state
        .services
        .orders
        .get_order(order_id)
        .await
        .expect("order");
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.vnpay_transaction_id.as_deref(), Some("14012345"));

    let response = app.as_buyer(Method::GET, "/api/carts", None).await;
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["product_id"], other.id);

    // A replayed callback leaves the order alone.
    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/orders/vnpay_return?{}",
                signed_return_query(&app, order_id, "24")
            ),
            None,
            None,
        )
        .await;
    assert!(location(&response).contains("status=paid"));
}

#[tokio::test]
async fn vnpay_failure_cancels_and_restocks() {
    let app = TestApp::new().await;
    let category = app.seed_category("Luxury").await;
    let watch = app.seed_product(category.id, "King Seiko", 900, 2).await;

    let created = app
        .as_buyer(
            Method::POST,
            "/api/orders/create",
            Some(order_body(
                json!([{ "product_id": watch.id, "quantity": 2 }]),
                "VN_PAY",
            )),
        )
        .await;
    let body = response_json(created).await;
    let order_id = body["data"]["order"]["order_id"].as_i64().expect("order id") as i32;
    assert_eq!(stock_of(&app, watch.id).await, 0);

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/orders/vnpay_return?{}",
                signed_return_query(&app, order_id, "24")
            ),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).contains("status=canceled"));
    assert_eq!(stock_of(&app, watch.id).await, 2);
}

#[tokio::test]
async fn vnpay_bad_signature_redirects_with_error() {
    let app = TestApp::new().await;
    let category = app.seed_category("Luxury").await;
    let watch = app.seed_product(category.id, "Credor", 900, 2).await;
    let order_id = app.place_cod_order(app.buyer_id, &[(watch.id, 1)]).await;

    let tampered = signed_return_query(&app, order_id, "00").replace("14012345", "99999999");
    let response = app
        .request(
            Method::GET,
            &format!("/api/orders/vnpay_return?{}", tampered),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.contains("status=error"));
    assert!(target.contains("code=backend_error"));
    assert!(target.contains(&format!("orderId={}", order_id)));

    let order = app
        .state
        .services
        .orders
        .get_order(order_id)
        .await
        .expect("order");
    assert_eq!(order.status, OrderStatus::Pending);
}
