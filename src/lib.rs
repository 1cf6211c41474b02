//! TimeXpert Store backend
//!
//! Catalog, carts, orders with VNPay checkout, reviews, invoices and admin
//! statistics for a watch and jewelry shop, served over axum.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{response::Json, Extension, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<config::AppConfig>,
    pub services: handlers::AppServices,
}

// Common response wrappers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// One page of a listing; `page` is 1-based.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    /// Success payload with a human readable note, e.g. "Cart cleared".
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Every `/api` route, with auth and role gates applied per module.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/users", handlers::users::users_routes())
        .nest("/password", handlers::password::password_routes())
        .nest("/products", handlers::products::products_routes())
        .nest("/categories", handlers::categories::categories_routes())
        .nest("/carts", handlers::carts::carts_routes())
        .nest("/orders", handlers::orders::orders_routes())
        .nest("/admin/orders", handlers::admin_orders::admin_orders_routes())
        .nest("/admin/users", handlers::admin_users::admin_users_routes())
        .nest(
            "/admin/statistics",
            handlers::statistics::statistics_routes(),
        )
        .nest("/favorites", handlers::favorites::favorites_routes())
        .nest("/invoices", handlers::invoices::invoices_routes())
        .nest("/reviews", handlers::reviews::reviews_routes())
        .nest(
            "/recommendations",
            handlers::recommendations::recommendations_routes(),
        )
}

/// Full application router: health probes, API, Swagger UI and the
/// request-scoped layers shared by every route.
///
/// CORS and compression are left to the binary so tests exercise the bare
/// stack.
pub fn build_router(state: AppState) -> Router {
    let auth_service = state.services.auth.clone();

    Router::new()
        .merge(health::health_routes())
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        .layer(crate::tracing::configure_http_tracing())
        .layer(Extension(auth_service))
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn message_keeps_payload() {
        let response = ApiResponse::with_message(3, "Cart updated");
        assert!(response.success);
        assert_eq!(response.data, Some(3));
        assert_eq!(response.message.as_deref(), Some("Cart updated"));
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 21, 1, 10);
        assert_eq!(page.total_pages, 3);

        let empty = PaginatedResponse::<u8>::new(vec![], 0, 1, 10);
        assert_eq!(empty.total_pages, 0);
    }
}
