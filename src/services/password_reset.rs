use crate::{
    entities::reset_password_token,
    errors::ServiceError,
    services::{
        email::Mailer,
        users::{find_by_email, UserService},
    },
};
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct ResetWithOtpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub otp: String,
    #[validate(length(min = 6, max = 128))]
    pub new_password: String,
}

/// Six-digit one-time code, zero padded.
pub fn generate_otp() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Password reset through an emailed one-time code.
#[derive(Clone)]
pub struct PasswordResetService {
    db: Arc<DatabaseConnection>,
    users: Arc<UserService>,
    mailer: Arc<dyn Mailer>,
    expiry_minutes: i64,
}

impl PasswordResetService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        users: Arc<UserService>,
        mailer: Arc<dyn Mailer>,
        expiry_minutes: i64,
    ) -> Self {
        Self {
            db,
            users,
            mailer,
            expiry_minutes,
        }
    }

    /// Issues a fresh code for the account, replacing any earlier one.
    /// A failed delivery is logged, not reported to the caller.
    #[instrument(skip(self))]
    pub async fn request_reset(&self, email: &str) -> Result<(), ServiceError> {
        let email = email.trim();
        if find_by_email(&*self.db, email).await?.is_none() {
            return Err(ServiceError::NotFound(format!(
                "No account registered with email {}",
                email
            )));
        }

        let otp = generate_otp();
        let txn = self.db.begin().await?;
        reset_password_token::Entity::delete_many()
            .filter(reset_password_token::Column::Email.eq(email))
            .exec(&txn)
            .await?;
        reset_password_token::ActiveModel {
            email: Set(email.to_string()),
            token: Set(otp.clone()),
            expiry_date: Set(Utc::now() + Duration::minutes(self.expiry_minutes)),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        txn.commit().await?;
        info!("Password reset code issued");

        if let Err(e) = self
            .mailer
            .send_otp(email, &otp, self.expiry_minutes)
            .await
        {
            error!(error = %e, "Failed to deliver password reset code");
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn reset_with_otp(&self, request: ResetWithOtpRequest) -> Result<(), ServiceError> {
        request.validate()?;
        let email = request.email.trim();

        let token = reset_password_token::Entity::find()
            .filter(reset_password_token::Column::Email.eq(email))
            .order_by_desc(reset_password_token::Column::ExpiryDate)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest("No OTP found or expired. Request new one.".to_string())
            })?;

        if token.is_expired(Utc::now()) {
            reset_password_token::Entity::delete_by_id(token.id)
                .exec(&*self.db)
                .await?;
            return Err(ServiceError::BadRequest(
                "OTP has expired. Please request a new one.".to_string(),
            ));
        }
        if token.token != request.otp.trim() {
            warn!("Password reset attempted with a wrong code");
            return Err(ServiceError::BadRequest("Invalid OTP code.".to_string()));
        }

        self.users
            .update_password_by_email(email, &request.new_password)
            .await?;
        reset_password_token::Entity::delete_by_id(token.id)
            .exec(&*self.db)
            .await?;

        info!("Password reset with one-time code");
        Ok(())
    }
}
