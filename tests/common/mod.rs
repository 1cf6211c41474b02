#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use timexpert_store::{
    build_router,
    config::AppConfig,
    db,
    entities::{order, OrderStatus, Role},
    errors::ServiceError,
    handlers::AppServices,
    services::{
        categories::{CategoryDto, CategoryRequest},
        email::{EmailError, Mailer},
        orders::{CreateOrderRequest, OrderItemRequest},
        payments::{RefundProcessor, SimulatedRefundProcessor},
        products::{ProductDto, ProductRequest},
        users::{AdminCreateUser, RegisterUser},
    },
    AppState,
};
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "secret123";
pub const VNPAY_SECRET: &str = "VNPAYTESTHASHSECRET0123456789";
pub const PAYMENT_RESULT_URL: &str = "http://localhost:3000/payment-result";

/// Captures OTP emails instead of sending them.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn last_otp_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, otp)| otp.clone())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_otp(&self, to: &str, otp: &str, _expiry_minutes: i64) -> Result<(), EmailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), otp.to_string()));
        Ok(())
    }
}

/// Refund processor that remembers what it was asked to refund and can be
/// told to fail.
#[derive(Default)]
pub struct RecordingRefunds {
    fail: bool,
    refunded: Mutex<Vec<(i32, OrderStatus)>>,
}

impl RecordingRefunds {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// (order id, status of the order when the refund was requested)
    pub fn refunded(&self) -> Vec<(i32, OrderStatus)> {
        self.refunded.lock().unwrap().clone()
    }
}

#[async_trait]
impl RefundProcessor for RecordingRefunds {
    async fn refund(&self, order: &order::Model) -> Result<(), ServiceError> {
        if self.fail {
            return Err(ServiceError::ExternalServiceError(format!(
                "Gateway declined refund for order {}",
                order.id
            )));
        }
        self.refunded.lock().unwrap().push((order.id, order.status));
        Ok(())
    }
}

/// Application wired against a throwaway SQLite file, with one admin and
/// one buyer already registered.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub mailer: Arc<RecordingMailer>,
    pub admin_id: i32,
    pub admin_token: String,
    pub buyer_id: i32,
    pub buyer_token: String,
    _db_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_refunds(Arc::new(SimulatedRefundProcessor)).await
    }

    pub async fn with_refunds(refunds: Arc<dyn RefundProcessor>) -> Self {
        let db_dir = tempfile::tempdir().expect("temp dir for test database");
        let db_path = db_dir.path().join("timexpert_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.vnpay.tmn_code = "TESTTMN1".to_string();
        cfg.vnpay.hash_secret = VNPAY_SECRET.to_string();
        cfg.frontend_payment_result_url = PAYMENT_RESULT_URL.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let mailer = Arc::new(RecordingMailer::default());
        let services = AppServices::with_refunds(db.clone(), &cfg, mailer.clone(), refunds);
        let state = AppState {
            db,
            config: Arc::new(cfg),
            services,
        };
        let router = build_router(state.clone());

        let mut app = Self {
            router,
            state,
            mailer,
            admin_id: 0,
            admin_token: String::new(),
            buyer_id: 0,
            buyer_token: String::new(),
            _db_dir: db_dir,
        };

        let (admin_id, admin_token) = app.create_user("admin", Role::Admin).await;
        let (buyer_id, buyer_token) = app.create_user("buyer", Role::Buyer).await;
        app.admin_id = admin_id;
        app.admin_token = admin_token;
        app.buyer_id = buyer_id;
        app.buyer_token = buyer_token;
        app
    }

    /// Registers a user with [`TEST_PASSWORD`] and returns its id and a token.
    pub async fn create_user(&self, username: &str, role: Role) -> (i32, String) {
        let users = &self.state.services.users;
        let created = users
            .create_user(AdminCreateUser {
                user: RegisterUser {
                    username: username.to_string(),
                    password: TEST_PASSWORD.to_string(),
                    email: format!("{}@timexpert.test", username),
                    first_name: Some("Test".to_string()),
                    last_name: Some(username.to_string()),
                    phone: Some("0901234567".to_string()),
                    address: Some("1 Le Loi, District 1".to_string()),
                    date_of_birth: None,
                },
                role: Some(role),
            })
            .await
            .expect("create test user");

        let model = users
            .authenticate(username, TEST_PASSWORD)
            .await
            .expect("authenticate test user");
        let token = self
            .state
            .services
            .auth
            .generate_token(&model)
            .expect("token for test user");
        (created.id, token)
    }

    pub async fn seed_category(&self, name: &str) -> CategoryDto {
        self.state
            .services
            .categories
            .create(CategoryRequest {
                name: name.to_string(),
                description: Some(format!("{} collection", name)),
                visible: Some(true),
            })
            .await
            .expect("seed category")
    }

    pub async fn seed_product(
        &self,
        category_id: i32,
        name: &str,
        price: i64,
        stock: i32,
    ) -> ProductDto {
        self.state
            .services
            .products
            .create(ProductRequest {
                name: name.to_string(),
                description: Some("Seeded for integration tests".to_string()),
                price: Decimal::from(price),
                stock,
                barcode: None,
                brand: Some("Orient".to_string()),
                model: None,
                movement: Some("Automatic".to_string()),
                case_material: None,
                strap_material: None,
                dial_color: None,
                water_resistance: None,
                category_id,
                image_urls: Some(vec![format!(
                    "https://cdn.timexpert.test/{}.jpg",
                    name.to_lowercase().replace(' ', "-")
                )]),
                primary_image_url: None,
                visible: Some(true),
            })
            .await
            .expect("seed product")
    }

    /// Places a COD order for the buyer through the service layer.
    pub async fn place_cod_order(&self, user_id: i32, items: &[(i32, i32)]) -> i32 {
        let created = self
            .state
            .services
            .orders
            .create_from_selected_items(
                user_id,
                CreateOrderRequest {
                    items: items
                        .iter()
                        .map(|&(product_id, quantity)| OrderItemRequest {
                            product_id,
                            quantity,
                        })
                        .collect(),
                    full_name_shipping: Some("Test Buyer".to_string()),
                    phone_shipping: Some("0901234567".to_string()),
                    address_shipping: Some("1 Le Loi, District 1".to_string()),
                    notes: None,
                    payment_method: Some(timexpert_store::entities::PaymentMethod::Cod),
                },
                "127.0.0.1",
            )
            .await
            .expect("place order");
        created.order.order_id
    }

    /// Walks an order through PROCESSING and SHIPPED to COMPLETED.
    pub async fn complete_order(&self, order_id: i32) {
        let orders = &self.state.services.orders;
        for status in [
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Completed,
        ] {
            orders
                .update_status(order_id, status)
                .await
                .expect("advance order status");
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn as_buyer(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.buyer_token)).await
    }

    pub async fn as_admin(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        self.request(method, uri, body, Some(&self.admin_token)).await
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal serialized either as a JSON string or number.
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("expected decimal, got {other}"),
    }
}
