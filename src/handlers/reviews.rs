use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};

use crate::{
    auth::{AuthRouterExt, AuthUser, ROLE_ADMIN},
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, PaginationParams},
    services::reviews::{ReviewDto, ReviewRequest, ReviewVisibilityRequest},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

pub fn reviews_routes() -> Router<AppState> {
    let buyer = Router::new()
        .route("/", post(add_review))
        .route("/:id", put(update_review).delete(delete_review))
        .with_auth();

    let admin = Router::new()
        .route("/admin/reviews", get(list_all_reviews))
        .route("/admin/products/:id/reviews", get(list_product_reviews_admin))
        .route("/admin/reviews/visibility/:id", put(set_visibility))
        .route("/admin/reviews/:id", delete(delete_review_admin))
        .with_role(ROLE_ADMIN);

    Router::new()
        .route("/products/:product_id", get(list_product_reviews))
        .merge(buyer)
        .merge(admin)
}

/// Review a product bought in a completed order
#[utoipa::path(
    post,
    path = "/api/reviews",
    request_body = ReviewRequest,
    responses(
        (status = 201, description = "Review added", body = crate::ApiResponse<ReviewDto>),
        (status = 400, description = "No eligible completed order", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn add_review(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let review = state
        .services
        .reviews
        .add_review(user.user_id, payload)
        .await?;
    Ok(created_response(review))
}

#[utoipa::path(
    put,
    path = "/api/reviews/{id}",
    params(("id" = i32, Path, description = "Review id")),
    request_body = ReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = crate::ApiResponse<ReviewDto>),
        (status = 400, description = "Product or order mismatch", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the author", body = crate::errors::ErrorResponse),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult<ReviewDto> {
    let review = state
        .services
        .reviews
        .update_own(id, user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(review)))
}

#[utoipa::path(
    delete,
    path = "/api/reviews/{id}",
    params(("id" = i32, Path, description = "Review id")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 403, description = "Not the author", body = crate::errors::ErrorResponse),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.reviews.delete_own(id, user.user_id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/reviews/products/{product_id}",
    params(("product_id" = i32, Path, description = "Product id"), PaginationParams),
    responses(
        (status = 200, description = "Visible reviews, newest first", body = crate::ApiResponse<PaginatedResponse<ReviewDto>>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Reviews"
)]
pub async fn list_product_reviews(
    State(state): State<AppState>,
    Path(product_id): Path<i32>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<ReviewDto>> {
    let (page, limit) = pagination.resolve(&state.config);
    let reviews = state
        .services
        .reviews
        .list_visible(product_id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(reviews)))
}

#[utoipa::path(
    get,
    path = "/api/reviews/admin/reviews",
    params(PaginationParams),
    responses(
        (status = 200, description = "All reviews, newest first", body = crate::ApiResponse<PaginatedResponse<ReviewDto>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn list_all_reviews(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<ReviewDto>> {
    let (page, limit) = pagination.resolve(&state.config);
    let reviews = state.services.reviews.list_all(page, limit).await?;
    Ok(Json(ApiResponse::success(reviews)))
}

#[utoipa::path(
    get,
    path = "/api/reviews/admin/products/{id}/reviews",
    params(("id" = i32, Path, description = "Product id"), PaginationParams),
    responses(
        (status = 200, description = "All reviews of the product, hidden included", body = crate::ApiResponse<PaginatedResponse<ReviewDto>>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn list_product_reviews_admin(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<ReviewDto>> {
    let (page, limit) = pagination.resolve(&state.config);
    let reviews = state
        .services
        .reviews
        .list_for_product(id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(reviews)))
}

#[utoipa::path(
    put,
    path = "/api/reviews/admin/reviews/visibility/{id}",
    params(("id" = i32, Path, description = "Review id")),
    request_body = ReviewVisibilityRequest,
    responses(
        (status = 200, description = "Visibility updated; product rating recomputed", body = crate::ApiResponse<ReviewDto>),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn set_visibility(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ReviewVisibilityRequest>,
) -> ApiResult<ReviewDto> {
    let review = state
        .services
        .reviews
        .set_visibility(id, payload.visible)
        .await?;
    Ok(Json(ApiResponse::success(review)))
}

#[utoipa::path(
    delete,
    path = "/api/reviews/admin/reviews/{id}",
    params(("id" = i32, Path, description = "Review id")),
    responses(
        (status = 204, description = "Review deleted"),
        (status = 404, description = "Review not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reviews"
)]
pub async fn delete_review_admin(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.reviews.delete(id).await?;
    Ok(no_content_response())
}
