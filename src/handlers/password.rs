use axum::{
    extract::{Json, Query, State},
    routing::post,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{services::password_reset::ResetWithOtpRequest, ApiResponse, ApiResult, AppState};

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForgotPasswordQuery {
    /// Email of the account to reset
    pub email: String,
}

/// Password reset through an emailed one-time code
pub fn password_routes() -> Router<AppState> {
    Router::new()
        .route("/forgot", post(forgot_password))
        .route("/reset-otp", post(reset_with_otp))
}

#[utoipa::path(
    post,
    path = "/api/password/forgot",
    params(ForgotPasswordQuery),
    responses(
        (status = 200, description = "OTP issued and emailed"),
        (status = 404, description = "No account with that email", body = crate::errors::ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Query(query): Query<ForgotPasswordQuery>,
) -> ApiResult<()> {
    state
        .services
        .password_reset
        .request_reset(&query.email)
        .await?;
    Ok(Json(ApiResponse::with_message(
        (),
        "OTP has been sent to your email",
    )))
}

#[utoipa::path(
    post,
    path = "/api/password/reset-otp",
    request_body = ResetWithOtpRequest,
    responses(
        (status = 200, description = "Password reset"),
        (status = 400, description = "Missing, expired or wrong OTP", body = crate::errors::ErrorResponse)
    ),
    tag = "Password"
)]
pub async fn reset_with_otp(
    State(state): State<AppState>,
    Json(payload): Json<ResetWithOtpRequest>,
) -> ApiResult<()> {
    state.services.password_reset.reset_with_otp(payload).await?;
    Ok(Json(ApiResponse::with_message(
        (),
        "Password has been reset successfully",
    )))
}
