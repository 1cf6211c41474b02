use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "TimeXpert Store API",
        version = "1.0.0",
        description = r#"
# TimeXpert Store

Backend for an online watch and jewelry shop.

## Features

- **Catalog**: Categories and products with filtering, images and ratings
- **Carts & Orders**: Checkout of selected cart items with stock reservation
- **Payments**: Cash on delivery or VNPay signed redirect
- **After-sale**: Invoices, reviews from verified buyers, favorites
- **Administration**: Users, order workflow and sales statistics

## Authentication

Log in through `POST /api/users/login` and send the returned token:

```
Authorization: Bearer <your-jwt-token>
```

## Pagination

List endpoints accept `page` (1-based, default 1) and `limit` (capped by the
server) and answer with `{items, total, page, limit, total_pages}`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Users", description = "Registration, login and profile"),
        (name = "Password", description = "Password reset by emailed OTP"),
        (name = "Products", description = "Product catalog"),
        (name = "Categories", description = "Product categories"),
        (name = "Carts", description = "Shopping cart"),
        (name = "Orders", description = "Checkout, order history and VNPay return"),
        (name = "Admin Orders", description = "Order workflow for administrators"),
        (name = "Admin Users", description = "User administration"),
        (name = "Favorites", description = "Favorite products"),
        (name = "Invoices", description = "Order invoices"),
        (name = "Reviews", description = "Product reviews and moderation"),
        (name = "Recommendations", description = "Product suggestions"),
        (name = "Statistics", description = "Admin dashboard figures")
    ),
    paths(
        // Users
        handlers::users::register,
        handlers::users::login,
        handlers::users::get_profile,
        handlers::users::update_profile,
        handlers::users::change_password,
        handlers::password::forgot_password,
        handlers::password::reset_with_otp,

        // Catalog
        handlers::products::list_products,
        handlers::products::get_product,
        handlers::products::list_products_admin,
        handlers::products::create_product,
        handlers::products::update_product,
        handlers::products::toggle_visibility,
        handlers::products::hide_product,
        handlers::categories::list_categories,
        handlers::categories::get_category,
        handlers::categories::list_all_categories,
        handlers::categories::create_category,
        handlers::categories::update_category,
        handlers::categories::toggle_visibility,
        handlers::categories::delete_category,

        // Carts
        handlers::carts::get_cart,
        handlers::carts::add_item,
        handlers::carts::update_item,
        handlers::carts::remove_item,
        handlers::carts::remove_items,
        handlers::carts::clear_cart,

        // Orders
        handlers::orders::create_order,
        handlers::orders::list_my_orders,
        handlers::orders::get_order,
        handlers::orders::cancel_order,
        handlers::orders::vnpay_return,
        handlers::admin_orders::list_orders,
        handlers::admin_orders::get_order,
        handlers::admin_orders::update_status,

        // Admin users
        handlers::admin_users::list_users,
        handlers::admin_users::create_user,
        handlers::admin_users::get_user,
        handlers::admin_users::update_user,
        handlers::admin_users::delete_user,
        handlers::admin_users::list_user_orders,

        // After-sale
        handlers::favorites::list_favorites,
        handlers::favorites::add_favorite,
        handlers::favorites::remove_favorite,
        handlers::favorites::remove_by_product,
        handlers::invoices::invoice_for_order,
        handlers::reviews::add_review,
        handlers::reviews::update_review,
        handlers::reviews::delete_review,
        handlers::reviews::list_product_reviews,
        handlers::reviews::list_all_reviews,
        handlers::reviews::list_product_reviews_admin,
        handlers::reviews::set_visibility,
        handlers::reviews::delete_review_admin,
        handlers::recommendations::my_recommendations,

        // Statistics
        handlers::statistics::summary,
        handlers::statistics::daily_revenue,
        handlers::statistics::daily_orders,
        handlers::statistics::revenue_by_category,
        handlers::statistics::revenue_by_customer,
        handlers::statistics::top_selling_products,
        handlers::statistics::top_customers_completed,
        handlers::statistics::top_customers_canceled,
        handlers::statistics::inventory
    ),
    components(
        schemas(
            crate::entities::OrderStatus,
            crate::entities::PaymentMethod,
            crate::entities::Role,
            crate::entities::AuthProvider,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerSecurity)
)]
pub struct ApiDocV1;

/// Registers the `Bearer` JWT scheme referenced by protected paths.
struct BearerSecurity;

impl Modify for BearerSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_store_paths_and_bearer_scheme() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string(&openapi).unwrap();
        assert!(json.contains("TimeXpert Store API"));
        assert!(json.contains("/api/orders/create"));
        assert!(json.contains("/api/admin/statistics/summary"));
        assert!(openapi
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("Bearer")));
    }
}
