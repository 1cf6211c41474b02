use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};

use crate::{
    auth::{AuthRouterExt, ROLE_ADMIN},
    errors::ServiceError,
    handlers::common::{created_response, no_content_response},
    services::categories::{CategoryDto, CategoryRequest},
    ApiResponse, ApiResult, AppState,
};

pub fn categories_routes() -> Router<AppState> {
    let admin = Router::new()
        .route("/admin", get(list_all_categories))
        .route("/", post(create_category))
        .route("/:id", put(update_category).delete(delete_category))
        .route("/:id/toggle-visibility", put(toggle_visibility))
        .with_role(ROLE_ADMIN);

    Router::new()
        .route("/", get(list_categories))
        .route("/:id", get(get_category))
        .merge(admin)
}

#[utoipa::path(
    get,
    path = "/api/categories",
    responses(
        (status = 200, description = "Visible categories, newest first", body = crate::ApiResponse<Vec<CategoryDto>>)
    ),
    tag = "Categories"
)]
pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<CategoryDto>> {
    let categories = state.services.categories.list_visible().await?;
    Ok(Json(ApiResponse::success(categories)))
}

#[utoipa::path(
    get,
    path = "/api/categories/{id}",
    params(("id" = i32, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category", body = crate::ApiResponse<CategoryDto>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Categories"
)]
pub async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<CategoryDto> {
    let category = state.services.categories.get(id, true).await?;
    Ok(Json(ApiResponse::success(category)))
}

#[utoipa::path(
    get,
    path = "/api/categories/admin",
    responses(
        (status = 200, description = "All categories including hidden ones", body = crate::ApiResponse<Vec<CategoryDto>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Categories"
)]
pub async fn list_all_categories(State(state): State<AppState>) -> ApiResult<Vec<CategoryDto>> {
    let categories = state.services.categories.list_all().await?;
    Ok(Json(ApiResponse::success(categories)))
}

#[utoipa::path(
    post,
    path = "/api/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Category created", body = crate::ApiResponse<CategoryDto>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Categories"
)]
pub async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let category = state.services.categories.create(payload).await?;
    Ok(created_response(category))
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}",
    params(("id" = i32, Path, description = "Category id")),
    request_body = CategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = crate::ApiResponse<CategoryDto>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Categories"
)]
pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<CategoryRequest>,
) -> ApiResult<CategoryDto> {
    let category = state.services.categories.update(id, payload).await?;
    Ok(Json(ApiResponse::success(category)))
}

#[utoipa::path(
    put,
    path = "/api/categories/{id}/toggle-visibility",
    params(("id" = i32, Path, description = "Category id")),
    responses(
        (status = 200, description = "Visibility flipped", body = crate::ApiResponse<CategoryDto>),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Categories"
)]
pub async fn toggle_visibility(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<CategoryDto> {
    let category = state.services.categories.toggle_visibility(id).await?;
    Ok(Json(ApiResponse::success(category)))
}

#[utoipa::path(
    delete,
    path = "/api/categories/{id}",
    params(("id" = i32, Path, description = "Category id")),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 404, description = "Category not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Category still has products", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Categories"
)]
pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.categories.delete(id).await?;
    Ok(no_content_response())
}
