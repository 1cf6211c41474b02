use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get},
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::common::{created_response, no_content_response},
    services::favorites::FavoriteDto,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AddFavoriteQuery {
    pub product_id: i32,
}

pub fn favorites_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_favorites).post(add_favorite))
        .route("/:id", delete(remove_favorite))
        .route("/product/:product_id", delete(remove_by_product))
        .with_auth()
}

#[utoipa::path(
    get,
    path = "/api/favorites",
    responses(
        (status = 200, description = "Caller's favorites, newest first", body = crate::ApiResponse<Vec<FavoriteDto>>)
    ),
    security(("Bearer" = [])),
    tag = "Favorites"
)]
pub async fn list_favorites(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<FavoriteDto>> {
    let favorites = state.services.favorites.list(user.user_id).await?;
    Ok(Json(ApiResponse::success(favorites)))
}

/// Idempotent: favoriting twice returns the existing record
#[utoipa::path(
    post,
    path = "/api/favorites",
    params(AddFavoriteQuery),
    responses(
        (status = 201, description = "Favorite recorded", body = crate::ApiResponse<FavoriteDto>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Favorites"
)]
pub async fn add_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<AddFavoriteQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let favorite = state
        .services
        .favorites
        .add(user.user_id, query.product_id)
        .await?;
    Ok(created_response(favorite))
}

#[utoipa::path(
    delete,
    path = "/api/favorites/{id}",
    params(("id" = i32, Path, description = "Favorite id")),
    responses(
        (status = 204, description = "Favorite removed"),
        (status = 400, description = "Favorite belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Favorite not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Favorites"
)]
pub async fn remove_favorite(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.favorites.remove(user.user_id, id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    delete,
    path = "/api/favorites/product/{product_id}",
    params(("product_id" = i32, Path, description = "Product id")),
    responses(
        (status = 204, description = "Favorite removed"),
        (status = 404, description = "Product was not a favorite", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Favorites"
)]
pub async fn remove_by_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<i32>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .favorites
        .remove_by_product(user.user_id, product_id)
        .await?;
    Ok(no_content_response())
}
