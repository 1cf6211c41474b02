use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};

use crate::{
    auth::{AuthRouterExt, AuthUser},
    handlers::orders::authorized_order,
    services::invoices::InvoiceDetailDto,
    ApiResponse, ApiResult, AppState,
};

pub fn invoices_routes() -> Router<AppState> {
    Router::new()
        .route("/order/:order_id", get(invoice_for_order))
        .with_auth()
}

/// Invoice for an order, issued on first request
#[utoipa::path(
    get,
    path = "/api/invoices/order/{order_id}",
    params(("order_id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Invoice details", body = crate::ApiResponse<InvoiceDetailDto>),
        (status = 403, description = "Not the order owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Invoices"
)]
pub async fn invoice_for_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<i32>,
) -> ApiResult<InvoiceDetailDto> {
    authorized_order(&state, &user, order_id).await?;
    let invoice = state.services.invoices.invoice_for_order(order_id).await?;
    Ok(Json(ApiResponse::success(invoice)))
}
