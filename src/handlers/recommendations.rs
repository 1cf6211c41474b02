use axum::{
    extract::{Json, State},
    routing::get,
    Router,
};

use crate::{
    auth::{AuthRouterExt, AuthUser},
    services::products::ProductDto,
    ApiResponse, ApiResult, AppState,
};

pub fn recommendations_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(my_recommendations))
        .with_auth()
}

#[utoipa::path(
    get,
    path = "/api/recommendations/me",
    responses(
        (status = 200, description = "Suggested products", body = crate::ApiResponse<Vec<ProductDto>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Recommendations"
)]
pub async fn my_recommendations(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<ProductDto>> {
    let products = state
        .services
        .recommendations
        .for_user(user.user_id)
        .await?;
    Ok(Json(ApiResponse::success(products)))
}
