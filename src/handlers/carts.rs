use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use validator::Validate;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::common::no_content_response,
    services::carts::{AddCartItemRequest, CartDto, RemoveCartItemsRequest, UpdateCartItemRequest},
    ApiResponse, ApiResult, AppState,
};

/// The signed-in user's cart
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_item))
        .route("/items/batch", delete(remove_items))
        .route("/items/:product_id", put(update_item).delete(remove_item))
        .with_auth()
}

#[utoipa::path(
    get,
    path = "/api/carts",
    responses(
        (status = 200, description = "Current cart; empty when none exists", body = crate::ApiResponse<CartDto>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<CartDto> {
    let cart = state.services.carts.get_cart(user.user_id).await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    post,
    path = "/api/carts/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Item added", body = crate::ApiResponse<CartDto>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Not enough stock", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn add_item(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddCartItemRequest>,
) -> ApiResult<CartDto> {
    payload.validate()?;
    let cart = state
        .services
        .carts
        .add_item(user.user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

/// Zero or a negative quantity removes the line
#[utoipa::path(
    put,
    path = "/api/carts/items/{product_id}",
    params(("product_id" = i32, Path, description = "Product id")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity updated", body = crate::ApiResponse<CartDto>),
        (status = 404, description = "Cart or item not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Not enough stock", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn update_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i32>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> ApiResult<CartDto> {
    let cart = state
        .services
        .carts
        .update_quantity(user.user_id, product_id, payload.quantity)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/carts/items/{product_id}",
    params(("product_id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Item removed", body = crate::ApiResponse<CartDto>),
        (status = 404, description = "Cart or item not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i32>,
) -> ApiResult<CartDto> {
    let cart = state
        .services
        .carts
        .remove_item(user.user_id, product_id)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/carts/items/batch",
    request_body = RemoveCartItemsRequest,
    responses(
        (status = 200, description = "Items removed; unknown ids ignored", body = crate::ApiResponse<CartDto>)
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn remove_items(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RemoveCartItemsRequest>,
) -> ApiResult<CartDto> {
    let cart = state
        .services
        .carts
        .remove_items(user.user_id, payload.product_ids)
        .await?;
    Ok(Json(ApiResponse::success(cart)))
}

#[utoipa::path(
    delete,
    path = "/api/carts",
    responses(
        (status = 204, description = "Cart cleared")
    ),
    security(("Bearer" = [])),
    tag = "Carts"
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.carts.clear_cart(user.user_id).await?;
    Ok(no_content_response())
}
