use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{AuthRouterExt, AuthUser, ROLE_ADMIN},
    entities::Role,
    errors::ServiceError,
    handlers::common::{created_response, no_content_response, PaginationParams},
    services::{
        orders::OrderDto,
        users::{AdminCreateUser, AdminUpdateUser, UserDto, UserListFilter},
    },
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub role: Option<Role>,
    /// Matches first name, last name or email
    pub search: Option<String>,
    /// id, username, email or created_at
    pub sort_by: Option<String>,
    /// asc (default) or desc
    pub sort_dir: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub fn admin_users_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/orders", get(list_user_orders))
        .with_role(ROLE_ADMIN)
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Page of users", body = crate::ApiResponse<PaginatedResponse<UserDto>>),
        (status = 400, description = "Unsupported sort field", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<PaginatedResponse<UserDto>> {
    let (page, limit) = PaginationParams {
        page: query.page,
        limit: query.limit,
    }
    .resolve(&state.config);
    let filter = UserListFilter {
        role: query.role,
        search: query.search,
        sort_by: query.sort_by,
        sort_dir: query.sort_dir,
    };
    let users = state.services.users.list_users(filter, page, limit).await?;
    Ok(Json(ApiResponse::success(users)))
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = AdminCreateUser,
    responses(
        (status = 201, description = "User created", body = crate::ApiResponse<UserDto>),
        (status = 400, description = "Invalid payload or duplicate username/email", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<AdminCreateUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.create_user(payload).await?;
    Ok(created_response(user))
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = crate::ApiResponse<UserDto>),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Users"
)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<i32>) -> ApiResult<UserDto> {
    let user = state.services.users.get_user(id).await?;
    Ok(Json(ApiResponse::success(user)))
}

/// Change a user's role and profile fields
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    request_body = AdminUpdateUser,
    responses(
        (status = 200, description = "User updated", body = crate::ApiResponse<UserDto>),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Users"
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<AdminUpdateUser>,
) -> ApiResult<UserDto> {
    let user = state.services.users.update_user(id, payload).await?;
    Ok(Json(ApiResponse::success(user)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = i32, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Attempt to delete own account", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "User has orders", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Users"
)]
pub async fn delete_user(
    State(state): State<AppState>,
    admin: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.users.delete_user(id, admin.user_id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    get,
    path = "/api/admin/users/{id}/orders",
    params(("id" = i32, Path, description = "User id"), PaginationParams),
    responses(
        (status = 200, description = "The user's orders, newest first", body = crate::ApiResponse<PaginatedResponse<OrderDto>>),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Admin Users"
)]
pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<OrderDto>> {
    state.services.users.get_user(id).await?;
    let (page, limit) = pagination.resolve(&state.config);
    let orders = state
        .services
        .orders
        .list_user_orders(id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}
