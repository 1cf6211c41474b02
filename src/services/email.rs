use crate::config::MailConfig;
use async_trait::async_trait;
use std::sync::Arc;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info, instrument};

pub const OTP_SUBJECT: &str = "Mã OTP đặt lại mật khẩu của bạn";

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid email address: {0}")]
    Address(String),
    #[error("Failed to build email: {0}")]
    Message(String),
    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// Outbound mail used by the password reset flow.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, to: &str, otp: &str, expiry_minutes: i64) -> Result<(), EmailError>;
}

pub fn otp_body(otp: &str, expiry_minutes: i64) -> String {
    format!(
        "Xin chào,\n\n\
         Bạn đã yêu cầu đặt lại mật khẩu.\n\n\
         Mật khẩu một lần (OTP) của bạn là: {}\n\n\
         Mã này sẽ hết hạn sau {} phút.\n\
         Vui lòng nhập mã này vào trang đặt lại mật khẩu.\n\n\
         Nếu bạn không yêu cầu, vui lòng bỏ qua email này.\n\n\
         Cảm ơn,\n\
         TimeXpertStore",
        otp, expiry_minutes
    )
}

/// Plain-text mail over an authenticated STARTTLS relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, EmailError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| EmailError::Address(e.to_string()))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| EmailError::Transport(e.to_string()))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[instrument(skip(self, otp))]
    async fn send_otp(&self, to: &str, otp: &str, expiry_minutes: i64) -> Result<(), EmailError> {
        let recipient: Mailbox = to
            .parse()
            .map_err(|e: lettre::address::AddressError| EmailError::Address(e.to_string()))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(OTP_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(otp_body(otp, expiry_minutes))
            .map_err(|e| EmailError::Message(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        info!("OTP email sent");
        Ok(())
    }
}

/// Used when mail delivery is disabled; records the send in the log instead.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(&self, to: &str, otp: &str, expiry_minutes: i64) -> Result<(), EmailError> {
        info!(to, expiry_minutes, "Mail disabled; OTP email not delivered");
        debug!(to, otp, "OTP issued");
        Ok(())
    }
}

/// SMTP delivery when mail is enabled, log-only otherwise.
pub fn mailer_from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, EmailError> {
    if config.enabled {
        Ok(Arc::new(SmtpMailer::from_config(config)?))
    } else {
        Ok(Arc::new(LogMailer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_body_mentions_code_and_validity() {
        let body = otp_body("042917", 10);
        assert!(body.contains("042917"));
        assert!(body.contains("10 phút"));
        assert!(body.ends_with("TimeXpertStore"));
    }

    #[test]
    fn smtp_mailer_rejects_bad_sender() {
        let config = MailConfig {
            enabled: true,
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            username: "user".into(),
            password: "pass".into(),
            from_address: "not an address".into(),
        };
        assert!(matches!(
            SmtpMailer::from_config(&config),
            Err(EmailError::Address(_))
        ));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        assert!(LogMailer.send_otp("a@b.vn", "123456", 10).await.is_ok());
    }
}
