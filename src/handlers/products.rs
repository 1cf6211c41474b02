use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    auth::{AuthRouterExt, ROLE_ADMIN},
    errors::ServiceError,
    handlers::common::{created_response, PaginationParams},
    services::products::{ProductDto, ProductFilter, ProductRequest},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

/// Catalog filters accepted by both the storefront and the admin listing
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ProductSearchQuery {
    /// Case-insensitive substring of the product name
    pub name: Option<String>,
    pub category_id: Option<i32>,
    #[param(value_type = Option<String>)]
    pub min_price: Option<Decimal>,
    #[param(value_type = Option<String>)]
    pub max_price: Option<Decimal>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductSearchQuery {
    fn into_parts(self, visible_only: bool) -> (ProductFilter, PaginationParams) {
        (
            ProductFilter {
                name: self.name,
                category_id: self.category_id,
                min_price: self.min_price,
                max_price: self.max_price,
                visible_only,
            },
            PaginationParams {
                page: self.page,
                limit: self.limit,
            },
        )
    }
}

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    let admin = Router::new()
        .route("/admin", get(list_products_admin))
        .route("/", axum::routing::post(create_product))
        .route("/:id", put(update_product))
        .route("/admin/toggle-visibility/:id", put(toggle_visibility))
        .route("/admin/products/:id", delete(hide_product))
        .with_role(ROLE_ADMIN);

    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .merge(admin)
}

/// Storefront listing: visible products only, newest first
#[utoipa::path(
    get,
    path = "/api/products",
    params(ProductSearchQuery),
    responses(
        (status = 200, description = "Page of visible products", body = crate::ApiResponse<PaginatedResponse<ProductDto>>),
        (status = 404, description = "Unknown category", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductSearchQuery>,
) -> ApiResult<PaginatedResponse<ProductDto>> {
    let (filter, pagination) = query.into_parts(true);
    let (page, limit) = pagination.resolve(&state.config);
    let products = state.services.products.search(filter, page, limit).await?;
    Ok(Json(ApiResponse::success(products)))
}

#[utoipa::path(
    get,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product details", body = crate::ApiResponse<ProductDto>),
        (status = 404, description = "Product not found or hidden", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<ProductDto> {
    let product = state.services.products.get(id, true).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Admin listing including hidden products
#[utoipa::path(
    get,
    path = "/api/products/admin",
    params(ProductSearchQuery),
    responses(
        (status = 200, description = "Page of products", body = crate::ApiResponse<PaginatedResponse<ProductDto>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn list_products_admin(
    State(state): State<AppState>,
    Query(query): Query<ProductSearchQuery>,
) -> ApiResult<PaginatedResponse<ProductDto>> {
    let (filter, pagination) = query.into_parts(false);
    let (page, limit) = pagination.resolve(&state.config);
    let products = state.services.products.search(filter, page, limit).await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Create a new product
#[utoipa::path(
    post,
    path = "/api/products",
    request_body = ProductRequest,
    responses(
        (status = 201, description = "Product created", body = crate::ApiResponse<ProductDto>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown category", body = crate::errors::ErrorResponse),
        (status = 409, description = "Barcode already in use", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<ProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.create(payload).await?;
    Ok(created_response(product))
}

#[utoipa::path(
    put,
    path = "/api/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    request_body = ProductRequest,
    responses(
        (status = 200, description = "Product updated", body = crate::ApiResponse<ProductDto>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product or category not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<ProductRequest>,
) -> ApiResult<ProductDto> {
    let product = state.services.products.update(id, payload).await?;
    Ok(Json(ApiResponse::success(product)))
}

#[utoipa::path(
    put,
    path = "/api/products/admin/toggle-visibility/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Visibility flipped", body = crate::ApiResponse<ProductDto>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn toggle_visibility(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<ProductDto> {
    let product = state.services.products.toggle_visibility(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// Soft delete: hides the product from the storefront
#[utoipa::path(
    delete,
    path = "/api/products/admin/products/{id}",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product hidden", body = crate::ApiResponse<ProductDto>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn hide_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<ProductDto> {
    let product = state.services.products.hide(id).await?;
    Ok(Json(ApiResponse::with_message(product, "Product hidden")))
}
