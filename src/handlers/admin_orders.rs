use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{AuthRouterExt, ROLE_ADMIN},
    entities::OrderStatus,
    handlers::common::PaginationParams,
    services::orders::{AdminOrderFilter, OrderDto, UpdateOrderStatusRequest},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AdminOrderQuery {
    pub status: Option<OrderStatus>,
    pub user_id: Option<i32>,
    /// created_at, id, total_amount or status
    pub sort_by: Option<String>,
    /// asc or desc (default)
    pub sort_dir: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub fn admin_orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", put(update_status))
        .with_role(ROLE_ADMIN)
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    params(AdminOrderQuery),
    responses(
        (status = 200, description = "Filtered page of orders", body = crate::ApiResponse<PaginatedResponse<OrderDto>>),
        (status = 400, description = "Unsupported sort field", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<AdminOrderQuery>,
) -> ApiResult<PaginatedResponse<OrderDto>> {
    let (page, limit) = PaginationParams {
        page: query.page,
        limit: query.limit,
    }
    .resolve(&state.config);
    let filter = AdminOrderFilter {
        status: query.status,
        user_id: query.user_id,
        sort_by: query.sort_by,
        sort_dir: query.sort_dir,
    };
    let orders = state
        .services
        .orders
        .list_orders_admin(filter, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with its items", body = crate::ApiResponse<OrderDto>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Orders"
)]
pub async fn get_order(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<OrderDto> {
    let order = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Move an order along the status table; CANCELED restocks and refunds
#[utoipa::path(
    put,
    path = "/api/admin/orders/{id}/status",
    params(("id" = i32, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = crate::ApiResponse<OrderDto>),
        (status = 400, description = "Invalid status transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Refund failed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Orders"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderDto> {
    let order = state
        .services
        .orders
        .update_status(id, payload.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
