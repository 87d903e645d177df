//! Outbound gateway to the VNPay payment provider.
//!
//! The gateway never decides payment outcomes on its own: it builds the
//! signed redirect URL and, for stale pending payments, asks the provider
//! for the transaction status. Timeouts and provider errors leave the
//! payment pending.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use vigil_core::payment::{build_payment_url, sign_data};
use vigil_shared::config::VnpayConfig;
use vigil_shared::{AppError, Money};

/// Client for the hosted payment page and the querydr status API.
#[derive(Debug, Clone)]
pub struct VnpayGateway {
    config: VnpayConfig,
    client: reqwest::Client,
}

impl VnpayGateway {
    /// Creates a gateway with a bounded request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: VnpayConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Builds the signed hosted-payment-page URL for a pending payment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the URL cannot be signed or the
    /// amount does not fit the provider encoding.
    pub fn redirect_url(
        &self,
        txn_ref: &str,
        amount: Money,
        order_info: &str,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        build_payment_url(
            &self.config.payment_url,
            &self.config.tmn_code,
            &self.config.hash_secret,
            &self.config.return_url,
            txn_ref,
            amount,
            order_info,
            client_ip,
            now,
        )
        .map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Age after which a pending payment is actively reconciled.
    #[must_use]
    pub fn reconcile_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.config.reconcile_after_secs).unwrap_or(900))
    }

    /// Queries the provider for a transaction's status (querydr).
    ///
    /// Returns `Some(transaction_status)` when the provider answered
    /// definitively (`"00"` means paid) and `None` when it could not
    /// resolve the transaction, in which case the payment stays pending.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ProviderUnavailable` on timeout, connection
    /// failure or a non-success HTTP status.
    pub async fn query_transaction(
        &self,
        txn_ref: &str,
        payment_created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError> {
        let request_id = Uuid::new_v4().simple().to_string();
        let txn_date = payment_created_at.format("%Y%m%d%H%M%S").to_string();
        let create_date = now.format("%Y%m%d%H%M%S").to_string();
        let order_info = format!("Query transaction {txn_ref}");
        let ip_addr = "127.0.0.1";

        // querydr signs a pipe-joined field list, not the sorted query
        // string used by the payment page.
        let data = format!(
            "{request_id}|2.1.0|querydr|{tmn}|{txn_ref}|{txn_date}|{create_date}|{ip_addr}|{order_info}",
            tmn = self.config.tmn_code
        );
        let secure_hash = sign_data(&data, &self.config.hash_secret)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let body = json!({
            "vnp_RequestId": request_id,
            "vnp_Version": "2.1.0",
            "vnp_Command": "querydr",
            "vnp_TmnCode": self.config.tmn_code,
            "vnp_TxnRef": txn_ref,
            "vnp_OrderInfo": order_info,
            "vnp_TransactionDate": txn_date,
            "vnp_CreateDate": create_date,
            "vnp_IpAddr": ip_addr,
            "vnp_SecureHash": secure_hash,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::ProviderUnavailable(format!(
                "provider returned HTTP {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::ProviderUnavailable(e.to_string()))?;

        let response_code = payload
            .get("vnp_ResponseCode")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if response_code != "00" {
            tracing::warn!(
                txn_ref,
                response_code,
                "provider could not resolve transaction"
            );
            return Ok(None);
        }

        Ok(payload
            .get("vnp_TransactionStatus")
            .and_then(|v| v.as_str())
            .map(ToString::to_string))
    }
}

#[cfg(test)]
mod tests {
    use vigil_shared::Currency;

    use super::*;

    fn test_config() -> VnpayConfig {
        VnpayConfig {
            tmn_code: "VIGIL01".to_string(),
            hash_secret: "VNPAYSECRETKEY123".to_string(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            api_url: "https://sandbox.vnpayment.vn/merchant_webapi/api/transaction".to_string(),
            return_url: "https://vigil.example/api/v1/payments/return".to_string(),
            timeout_secs: 15,
            reconcile_after_secs: 900,
        }
    }

    #[test]
    fn test_redirect_url_carries_txn_ref_and_amount() {
        let gateway = VnpayGateway::new(test_config()).unwrap();
        let url = gateway
            .redirect_url(
                "ref-1",
                Money::new(200_000, Currency::Vnd),
                "Upgrade to premium",
                "203.0.113.10",
                Utc::now(),
            )
            .unwrap();

        assert!(url.starts_with("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?"));
        assert!(url.contains("vnp_TxnRef=ref-1"));
        assert!(url.contains("vnp_Amount=20000000"));
        assert!(url.contains("vnp_SecureHash="));
    }

    #[test]
    fn test_reconcile_after_uses_configured_window() {
        let gateway = VnpayGateway::new(test_config()).unwrap();
        assert_eq!(gateway.reconcile_after(), chrono::Duration::seconds(900));
    }
}
