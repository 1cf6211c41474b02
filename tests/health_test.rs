mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};

#[tokio::test]
async fn liveness_and_readiness() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "up");

    let response = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/health", None, None).await;
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["info"]["title"], "TimeXpert Store API");
    assert!(body["paths"]["/api/orders/vnpay_return"].is_object());
}
