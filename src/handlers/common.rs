use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use utoipa::IntoParams;

use crate::{config::AppConfig, ApiResponse};

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Pagination parameters for list operations
#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<u64>,
    /// Items per page, capped by the server
    pub limit: Option<u64>,
}

impl PaginationParams {
    /// Resolves `(page, limit)` against the configured defaults and cap.
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        (self.page.unwrap_or(1).max(1), config.page_size(self.limit))
    }
}

/// Caller address for the payment gateway: first `X-Forwarded-For` hop,
/// then `X-Real-IP`, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        })
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn pagination_defaults_and_caps() {
        let cfg = AppConfig::new(
            "sqlite::memory:".into(),
            "unit_test_secret_with_plenty_of_entropy_42".into(),
            "127.0.0.1".into(),
            8080,
            "test".into(),
        );
        assert_eq!(
            PaginationParams::default().resolve(&cfg),
            (1, cfg.api_default_page_size)
        );
        let params = PaginationParams {
            page: Some(0),
            limit: Some(cfg.api_max_page_size + 50),
        };
        assert_eq!(params.resolve(&cfg), (1, cfg.api_max_page_size));
    }

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 9], 5000)));
        assert_eq!(client_ip(&headers, Some(&peer)), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), Some(&peer)), "192.168.1.9");
        assert_eq!(client_ip(&HeaderMap::new(), None), "127.0.0.1");
    }
}
