use axum::{
    extract::{Json, Query, State},
    routing::get,
    Router,
};

use crate::{
    auth::{AuthRouterExt, ROLE_ADMIN},
    services::{
        products::InventoryEntry,
        statistics::{
            CategoryRevenue, CustomerOrderCount, CustomerRevenue, DailyOrderCount, DailyRevenue,
            DashboardSummary, DateRangeQuery, LimitQuery, ProductSales,
        },
    },
    ApiResponse, ApiResult, AppState,
};

/// Admin dashboard figures
pub fn statistics_routes() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/revenue/daily", get(daily_revenue))
        .route("/orders/daily", get(daily_orders))
        .route("/revenue/category", get(revenue_by_category))
        .route("/revenue/customer", get(revenue_by_customer))
        .route("/products/top-selling", get(top_selling_products))
        .route(
            "/customers/top-completed-orders",
            get(top_customers_completed),
        )
        .route("/customers/top-canceled-orders", get(top_customers_canceled))
        .route("/inventory", get(inventory))
        .with_role(ROLE_ADMIN)
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/summary",
    responses(
        (status = 200, description = "Headline counters and revenue", body = crate::ApiResponse<DashboardSummary>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn summary(State(state): State<AppState>) -> ApiResult<DashboardSummary> {
    let summary = state.services.statistics.dashboard_summary().await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/revenue/daily",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Revenue per day over paid and completed orders", body = crate::ApiResponse<Vec<DailyRevenue>>),
        (status = 400, description = "Invalid date format", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn daily_revenue(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Vec<DailyRevenue>> {
    let rows = state
        .services
        .statistics
        .daily_revenue(&range.from, &range.to)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/orders/daily",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Paid and completed orders per day", body = crate::ApiResponse<Vec<DailyOrderCount>>),
        (status = 400, description = "Invalid date format", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn daily_orders(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Vec<DailyOrderCount>> {
    let rows = state
        .services
        .statistics
        .daily_order_counts(&range.from, &range.to)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/revenue/category",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Revenue per category, highest first", body = crate::ApiResponse<Vec<CategoryRevenue>>),
        (status = 400, description = "Invalid date format", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn revenue_by_category(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Vec<CategoryRevenue>> {
    let rows = state
        .services
        .statistics
        .revenue_by_category(&range.from, &range.to)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/revenue/customer",
    params(DateRangeQuery),
    responses(
        (status = 200, description = "Top customers by revenue", body = crate::ApiResponse<Vec<CustomerRevenue>>),
        (status = 400, description = "Invalid date format", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn revenue_by_customer(
    State(state): State<AppState>,
    Query(range): Query<DateRangeQuery>,
) -> ApiResult<Vec<CustomerRevenue>> {
    let rows = state
        .services
        .statistics
        .revenue_by_customer(&range.from, &range.to, range.limit)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/products/top-selling",
    params(LimitQuery),
    responses(
        (status = 200, description = "Best sellers by quantity", body = crate::ApiResponse<Vec<ProductSales>>)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn top_selling_products(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<ProductSales>> {
    let rows = state
        .services
        .statistics
        .top_selling_products(query.limit)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/customers/top-completed-orders",
    params(LimitQuery),
    responses(
        (status = 200, description = "Customers with the most completed orders", body = crate::ApiResponse<Vec<CustomerOrderCount>>)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn top_customers_completed(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<CustomerOrderCount>> {
    let rows = state
        .services
        .statistics
        .top_customers_by_completed_orders(query.limit)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/customers/top-canceled-orders",
    params(LimitQuery),
    responses(
        (status = 200, description = "Customers with the most canceled orders", body = crate::ApiResponse<Vec<CustomerOrderCount>>)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn top_customers_canceled(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Vec<CustomerOrderCount>> {
    let rows = state
        .services
        .statistics
        .top_customers_by_canceled_orders(query.limit)
        .await?;
    Ok(Json(ApiResponse::success(rows)))
}

#[utoipa::path(
    get,
    path = "/api/admin/statistics/inventory",
    responses(
        (status = 200, description = "Stock per product, lowest first", body = crate::ApiResponse<Vec<InventoryEntry>>)
    ),
    security(("Bearer" = [])),
    tag = "Statistics"
)]
pub async fn inventory(State(state): State<AppState>) -> ApiResult<Vec<InventoryEntry>> {
    let rows = state.services.statistics.inventory().await?;
    Ok(Json(ApiResponse::success(rows)))
}
