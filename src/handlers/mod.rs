pub mod admin_orders;
pub mod admin_users;
pub mod carts;
pub mod categories;
pub mod common;
pub mod favorites;
pub mod invoices;
pub mod orders;
pub mod password;
pub mod products;
pub mod recommendations;
pub mod reviews;
pub mod statistics;
pub mod users;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    services::{
        carts::CartService,
        categories::CategoryService,
        email::Mailer,
        favorites::FavoriteService,
        invoices::InvoiceService,
        orders::OrderService,
        password_reset::PasswordResetService,
        payments::{RefundProcessor, SimulatedRefundProcessor, VnPayGateway},
        products::ProductService,
        recommendations::RecommendationService,
        reviews::ReviewService,
        statistics::StatisticsService,
        users::UserService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub users: Arc<UserService>,
    pub password_reset: Arc<PasswordResetService>,
    pub products: Arc<ProductService>,
    pub categories: Arc<CategoryService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub favorites: Arc<FavoriteService>,
    pub invoices: Arc<InvoiceService>,
    pub reviews: Arc<ReviewService>,
    pub statistics: Arc<StatisticsService>,
    pub recommendations: Arc<RecommendationService>,
}

impl AppServices {
    /// Wires every service against one connection pool. Refunds go through
    /// the simulated processor.
    pub fn new(db: Arc<DatabaseConnection>, config: &AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        let refunds: Arc<dyn RefundProcessor> = Arc::new(SimulatedRefundProcessor);
        Self::with_refunds(db, config, mailer, refunds)
    }

    pub fn with_refunds(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        mailer: Arc<dyn Mailer>,
        refunds: Arc<dyn RefundProcessor>,
    ) -> Self {
        let auth = Arc::new(AuthService::new(
            AuthConfig::from_app_config(config),
            db.clone(),
        ));
        let users = Arc::new(UserService::new(db.clone()));
        let password_reset = Arc::new(PasswordResetService::new(
            db.clone(),
            users.clone(),
            mailer,
            config.otp_expiry_minutes,
        ));
        let products = Arc::new(ProductService::new(db.clone()));
        let orders = Arc::new(OrderService::new(
            db.clone(),
            VnPayGateway::new(config.vnpay.clone()),
            refunds,
        ));

        Self {
            auth,
            users,
            password_reset,
            categories: Arc::new(CategoryService::new(db.clone())),
            carts: Arc::new(CartService::new(db.clone())),
            orders,
            favorites: Arc::new(FavoriteService::new(db.clone())),
            invoices: Arc::new(InvoiceService::new(db.clone(), config.store.clone())),
            reviews: Arc::new(ReviewService::new(db.clone())),
            statistics: Arc::new(StatisticsService::new(db)),
            recommendations: Arc::new(RecommendationService::new(products.clone())),
            products,
        }
    }
}
