//! Liveness and readiness endpoints.
//!
//! - `/health` reports that the process is up.
//! - `/health/ready` additionally pings the database.

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::AppState;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<HealthStatus>,
}

pub async fn simple_health_check() -> Json<HealthInfo> {
    Json(HealthInfo {
        status: HealthStatus::Up,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        database: None,
    })
}

pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthInfo>) {
    let database = match crate::db::check_connection(&state.db).await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            error!(error = %e, "readiness check failed");
            HealthStatus::Down
        }
    };
    let status_code = if database == HealthStatus::Up {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthInfo {
            status: database.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            database: Some(database),
        }),
    )
}

pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(simple_health_check))
        .route("/health/ready", get(readiness_check))
}
