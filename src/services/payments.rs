//! VNPay signed redirects and refunds.
//!
//! The gateway never talks to VNPay directly: it builds the signed URL the
//! buyer is redirected to, and verifies the signature on the parameters
//! VNPay sends back to the return URL.

use crate::{config::VnPayConfig, entities::order, errors::ServiceError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::{prelude::ToPrimitive, Decimal};
use sha2::Sha512;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, instrument, warn};
use url::form_urlencoded::byte_serialize;

type HmacSha512 = Hmac<Sha512>;

pub const VNP_SECURE_HASH: &str = "vnp_SecureHash";
pub const VNP_SECURE_HASH_TYPE: &str = "vnp_SecureHashType";
/// Response code VNPay uses for a successful payment.
pub const VNP_SUCCESS_CODE: &str = "00";

const VNP_VERSION: &str = "2.1.0";
const VNP_COMMAND: &str = "pay";
const VNP_CURRENCY: &str = "VND";
const VNP_ORDER_TYPE: &str = "other";
const VNP_LOCALE: &str = "vn";
const VNP_DATE_FORMAT: &str = "%Y%m%d%H%M%S";
const PAYMENT_WINDOW_MINUTES: i64 = 15;
const VIETNAM_UTC_OFFSET_SECS: i32 = 7 * 3600;

#[derive(Debug, Clone)]
pub struct VnPayGateway {
    config: VnPayConfig,
}

impl VnPayGateway {
    pub fn new(config: VnPayConfig) -> Self {
        Self { config }
    }

    /// Builds the signed payment URL for an order.
    #[instrument(skip(self))]
    pub fn create_payment_url(
        &self,
        order_id: i32,
        amount: Decimal,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let minor_units = (amount * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .ok_or_else(|| {
                ServiceError::InternalError(format!("Order amount {} out of range", amount))
            })?;
        let tz = FixedOffset::east_opt(VIETNAM_UTC_OFFSET_SECS)
            .ok_or_else(|| ServiceError::InternalError("invalid VNPay time zone".into()))?;
        let created = now.with_timezone(&tz);
        let expires = created + Duration::minutes(PAYMENT_WINDOW_MINUTES);

        let mut params = BTreeMap::new();
        params.insert("vnp_Version", VNP_VERSION.to_string());
        params.insert("vnp_Command", VNP_COMMAND.to_string());
        params.insert("vnp_TmnCode", self.config.tmn_code.clone());
        params.insert("vnp_Amount", minor_units.to_string());
        params.insert("vnp_CurrCode", VNP_CURRENCY.to_string());
        params.insert("vnp_TxnRef", order_id.to_string());
        params.insert("vnp_OrderInfo", format!("Thanh toan don hang {}", order_id));
        params.insert("vnp_OrderType", VNP_ORDER_TYPE.to_string());
        params.insert("vnp_Locale", VNP_LOCALE.to_string());
        params.insert("vnp_ReturnUrl", self.config.return_url.clone());
        params.insert("vnp_IpAddr", client_ip.to_string());
        params.insert("vnp_CreateDate", created.format(VNP_DATE_FORMAT).to_string());
        params.insert("vnp_ExpireDate", expires.format(VNP_DATE_FORMAT).to_string());

        let query = canonical_query(params.iter().map(|(k, v)| (*k, v.as_str())));
        let signature = self.sign(&query)?;

        info!(order_id, amount = minor_units, "VNPay payment URL created");
        Ok(format!(
            "{}?{}&{}={}",
            self.config.pay_url, query, VNP_SECURE_HASH, signature
        ))
    }

    /// Checks the signature VNPay attached to the return parameters.
    pub fn verify_return(&self, params: &HashMap<String, String>) -> bool {
        let Some(received) = params.get(VNP_SECURE_HASH).filter(|h| !h.is_empty()) else {
            return false;
        };

        match self.sign_params(params) {
            Ok(expected) => expected.eq_ignore_ascii_case(received),
            Err(e) => {
                warn!(error = %e, "Could not compute VNPay signature");
                false
            }
        }
    }

    /// Signature over every `vnp_` parameter except the hash fields themselves.
    pub fn sign_params(&self, params: &HashMap<String, String>) -> Result<String, ServiceError> {
        let sorted: BTreeMap<&str, &str> = params
            .iter()
            .filter(|(k, _)| k.as_str() != VNP_SECURE_HASH && k.as_str() != VNP_SECURE_HASH_TYPE)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.sign(&canonical_query(sorted.into_iter()))
    }

    fn sign(&self, data: &str) -> Result<String, ServiceError> {
        let mut mac = HmacSha512::new_from_slice(self.config.hash_secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("VNPay HMAC key: {}", e)))?;
        mac.update(data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// `key=value` pairs joined by `&`, skipping empty values, with values
/// form-urlencoded (space becomes `+`). Input must already be sorted.
fn canonical_query<'a>(params: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    params
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| {
            format!(
                "{}={}",
                byte_serialize(k.as_bytes()).collect::<String>(),
                byte_serialize(v.as_bytes()).collect::<String>()
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Issues refunds for paid orders that get canceled.
#[async_trait]
pub trait RefundProcessor: Send + Sync {
    async fn refund(&self, order: &order::Model) -> Result<(), ServiceError>;
}

/// Stand-in for the gateway refund API: accepts any order that carries a
/// transaction reference.
#[derive(Debug, Default, Clone)]
pub struct SimulatedRefundProcessor;

#[async_trait]
impl RefundProcessor for SimulatedRefundProcessor {
    async fn refund(&self, order: &order::Model) -> Result<(), ServiceError> {
        let has_txn = order
            .vnpay_transaction_id
            .as_deref()
            .is_some_and(|t| !t.is_empty());
        if !has_txn && order.id <= 0 {
            return Err(ServiceError::ExternalServiceError(format!(
                "Refund failed for order {}",
                order.id
            )));
        }

        info!(
            order_id = order.id,
            amount = %order.total_amount,
            transaction = order.vnpay_transaction_id.as_deref().unwrap_or("-"),
            "Refund issued"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn gateway() -> VnPayGateway {
        VnPayGateway::new(VnPayConfig {
            tmn_code: "TESTTMN1".into(),
            hash_secret: "SECRETKEYSECRETKEY".into(),
            pay_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
            return_url: "http://localhost:8080/api/orders/vnpay_return".into(),
        })
    }

    fn query_params(url: &str) -> HashMap<String, String> {
        let parsed = url::Url::parse(url).unwrap();
        parsed.query_pairs().into_owned().collect()
    }

    #[test]
    fn payment_url_carries_signed_parameters() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 3, 0, 0).unwrap();
        let url = gateway()
            .create_payment_url(42, dec!(1500000), "127.0.0.1", now)
            .unwrap();

        assert!(url.starts_with("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?"));
        assert!(url.contains("vnp_OrderInfo=Thanh+toan+don+hang+42"));

        let params = query_params(&url);
        assert_eq!(params["vnp_Amount"], "150000000");
        assert_eq!(params["vnp_TxnRef"], "42");
        // 03:00 UTC is 10:00 in Vietnam
        assert_eq!(params["vnp_CreateDate"], "20240501100000");
        assert_eq!(params["vnp_ExpireDate"], "20240501101500");
        assert_eq!(params[VNP_SECURE_HASH].len(), 128);

        assert!(gateway().verify_return(&params));
    }

    #[test]
    fn tampered_return_is_rejected() {
        let now = Utc::now();
        let url = gateway()
            .create_payment_url(7, dec!(200000), "10.0.0.1", now)
            .unwrap();
        let mut params = query_params(&url);
        params.insert("vnp_Amount".into(), "1".into());
        assert!(!gateway().verify_return(&params));

        params.remove(VNP_SECURE_HASH);
        assert!(!gateway().verify_return(&params));
    }

    #[test]
    fn signature_ignores_hash_type_and_case() {
        let mut params = HashMap::new();
        params.insert("vnp_TxnRef".to_string(), "5".to_string());
        params.insert("vnp_ResponseCode".to_string(), "00".to_string());
        params.insert("vnp_TransactionNo".to_string(), "14000001".to_string());
        let signature = gateway().sign_params(&params).unwrap();

        params.insert(VNP_SECURE_HASH.to_string(), signature.to_uppercase());
        params.insert(VNP_SECURE_HASH_TYPE.to_string(), "HmacSHA512".to_string());
        assert!(gateway().verify_return(&params));
    }

    #[test]
    fn canonical_query_skips_empty_values() {
        let q = canonical_query(
            vec![("a", "x y"), ("b", ""), ("c", "1/2")].into_iter(),
        );
        assert_eq!(q, "a=x+y&c=1%2F2");
    }

    #[tokio::test]
    async fn simulated_refund_accepts_real_orders() {
        let now = Utc::now();
        let order = order::Model {
            id: 3,
            user_id: 1,
            total_amount: dec!(100000),
            status: order::OrderStatus::Paid,
            payment_method: order::PaymentMethod::VnPay,
            vnpay_transaction_id: Some("14000001".into()),
            cancellation_reason: None,
            full_name_shipping: None,
            phone_shipping: None,
            address_shipping: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        assert!(SimulatedRefundProcessor.refund(&order).await.is_ok());
    }
}
