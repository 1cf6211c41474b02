use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::common::created_response,
    services::users::{
        ChangePasswordRequest, LoginRequest, LoginResponse, ProfileUpdate, RegisterUser, UserDto,
    },
    ApiResponse, ApiResult, AppState,
};

/// Account registration, login and self-service profile endpoints
pub fn users_routes() -> Router<AppState> {
    let profile = Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/profile/change-password", put(change_password))
        .with_auth();

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(profile)
}

/// Register a buyer account
#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "Account created", body = crate::ApiResponse<UserDto>),
        (status = 400, description = "Invalid payload or duplicate username/email", body = crate::errors::ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUser>,
) -> Result<impl IntoResponse, ServiceError> {
    let user = state.services.users.register(payload).await?;
    Ok(created_response(user))
}

/// Exchange credentials for a bearer token
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = crate::ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid username or password", body = crate::errors::ErrorResponse)
    ),
    tag = "Users"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let user = state
        .services
        .users
        .authenticate(&payload.username, &payload.password)
        .await?;
    let token = state.services.auth.generate_token(&user)?;

    Ok(Json(ApiResponse::success(LoginResponse {
        token,
        user: user.into(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/users/profile",
    responses(
        (status = 200, description = "Current user's profile", body = crate::ApiResponse<UserDto>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Users"
)]
pub async fn get_profile(State(state): State<AppState>, user: AuthUser) -> ApiResult<UserDto> {
    let profile = state.services.users.get_profile(user.user_id).await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    put,
    path = "/api/users/profile",
    request_body = ProfileUpdate,
    responses(
        (status = 200, description = "Profile updated", body = crate::ApiResponse<UserDto>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Users"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ProfileUpdate>,
) -> ApiResult<UserDto> {
    let profile = state
        .services
        .users
        .update_profile(user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::success(profile)))
}

#[utoipa::path(
    put,
    path = "/api/users/profile/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Wrong current password or unchanged password", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Users"
)]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    state
        .services
        .users
        .change_password(user.user_id, payload)
        .await?;
    Ok(Json(ApiResponse::with_message(
        (),
        "Password changed successfully",
    )))
}
