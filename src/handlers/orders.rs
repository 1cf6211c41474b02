use axum::{
    extract::{ConnectInfo, Json, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::{collections::HashMap, net::SocketAddr};
use tracing::{error, warn};
use url::Url;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::common::{client_ip, PaginationParams},
    services::orders::{CancelOrderRequest, CreateOrderRequest, CreateOrderResponse, OrderDto},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

/// Buyer order endpoints plus the public VNPay return URL
pub fn orders_routes() -> Router<AppState> {
    let buyer = Router::new()
        .route("/create", post(create_order))
        .route("/me", get(list_my_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .with_auth();

    Router::new()
        .route("/vnpay_return", get(vnpay_return))
        .merge(buyer)
}

/// Loads the order and checks the caller owns it or is an admin.
pub(crate) async fn authorized_order(
    state: &AppState,
    user: &AuthUser,
    order_id: i32,
) -> Result<OrderDto, ServiceError> {
    let order = state.services.orders.get_order(order_id).await?;
    if !user.can_access_user(order.user_id) {
        warn!(order_id, user_id = user.user_id, "Order access denied");
        return Err(ServiceError::Forbidden(
            "You do not have access to this order".to_string(),
        ));
    }
    Ok(order)
}

/// Place an order for selected cart items
#[utoipa::path(
    post,
    path = "/api/orders/create",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order placed; VNPay orders include the payment URL", body = crate::ApiResponse<CreateOrderResponse>),
        (status = 400, description = "Missing items, shipping details or payment method", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
    connect: Option<ConnectInfo<SocketAddr>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let ip = client_ip(&headers, connect.as_ref());
    let created = state
        .services
        .orders
        .create_from_selected_items(user.user_id, payload, &ip)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

#[utoipa::path(
    get,
    path = "/api/orders/me",
    params(PaginationParams),
    responses(
        (status = 200, description = "Caller's orders, newest first", body = crate::ApiResponse<PaginatedResponse<OrderDto>>)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_my_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderDto>> {
    let (page, limit) = pagination.resolve(&state.config);
    let orders = state
        .services
        .orders
        .list_user_orders(user.user_id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with its items", body = crate::ApiResponse<OrderDto>),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> ApiResult<OrderDto> {
    let order = authorized_order(&state, &user, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    params(("id" = i32, Path, description = "Order id")),
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Order canceled and restocked", body = crate::ApiResponse<OrderDto>),
        (status = 400, description = "Missing reason or order no longer cancellable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 502, description = "Refund failed", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<CancelOrderRequest>,
) -> ApiResult<OrderDto> {
    authorized_order(&state, &user, id).await?;
    let order = state
        .services
        .orders
        .cancel_order(id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Browser lands here after paying on VNPay; always answers with a redirect
/// to the storefront's payment result page.
#[utoipa::path(
    get,
    path = "/api/orders/vnpay_return",
    responses(
        (status = 302, description = "Redirect to the payment result page")
    ),
    tag = "Orders"
)]
pub async fn vnpay_return(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let base = &state.config.frontend_payment_result_url;
    let target = match state.services.orders.handle_vnpay_return(&params).await {
        Ok(order) => {
            let status = order.status.to_string().to_lowercase();
            payment_result_url(
                base,
                &[("orderId", order.order_id.to_string()), ("status", status)],
            )
        }
        Err(e) => {
            error!(error = %e, "VNPay return processing failed");
            let order_ref = params.get("vnp_TxnRef").cloned().unwrap_or_default();
            payment_result_url(
                base,
                &[
                    ("orderId", order_ref),
                    ("status", "error".to_string()),
                    ("code", "backend_error".to_string()),
                ],
            )
        }
    };

    (StatusCode::FOUND, [(header::LOCATION, target)]).into_response()
}

fn payment_result_url(base: &str, pairs: &[(&str, String)]) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())));
            url.to_string()
        }
        Err(_) => {
            let query: String = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs.iter().map(|(k, v)| (*k, v.as_str())))
                .finish();
            format!("{}?{}", base, query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_url_appends_query() {
        let url = payment_result_url(
            "http://localhost:3000/payment-result",
            &[("orderId", "12".into()), ("status", "paid".into())],
        );
        assert_eq!(
            url,
            "http://localhost:3000/payment-result?orderId=12&status=paid"
        );
    }

    #[test]
    fn relative_base_still_gets_query() {
        let url = payment_result_url("/payment-result", &[("status", "error".into())]);
        assert_eq!(url, "/payment-result?status=error");
    }
}
