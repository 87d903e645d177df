//! VNPay canonical signing, callback verification and acknowledgement codes.
//!
//! The provider signs the sorted, form-urlencoded parameter string with
//! HMAC-SHA512 over a shared secret. Both the browser-redirect "return"
//! endpoint and the server-to-server IPN carry the same scheme.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;
use vigil_shared::Money;

type HmacSha512 = Hmac<Sha512>;

/// Parameter keys excluded from the signed canonical string.
const HASH_KEY: &str = "vnp_SecureHash";
const HASH_TYPE_KEY: &str = "vnp_SecureHashType";

/// VNPay wire-format errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VnpayError {
    /// Payload signature did not verify against the shared secret.
    #[error("callback signature verification failed")]
    SignatureInvalid,

    /// A required parameter was absent.
    #[error("missing parameter: {0}")]
    MissingField(&'static str),

    /// A parameter failed to parse.
    #[error("malformed parameter: {0}")]
    MalformedField(&'static str),

    /// The MAC rejected the signing key.
    #[error("signing key rejected")]
    InvalidKey,

    /// Amount does not fit the provider's x100 encoding.
    #[error("amount out of range for provider encoding")]
    AmountOverflow,
}

/// Form-urlencodes a value the way the provider canonicalizes it
/// (unreserved bytes pass through, space becomes `+`, the rest `%XX`).
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'*' => {
                out.push(byte as char);
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Builds the canonical string: parameters sorted by key, empty values and
/// the signature fields themselves excluded.
fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(k, v)| k.as_str() != HASH_KEY && k.as_str() != HASH_TYPE_KEY && !v.is_empty())
        .map(|(k, v)| format!("{k}={}", urlencode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA512 over raw bytes, returning lowercase hex. The querydr API
/// signs a `|`-joined field list with the same primitive.
///
/// # Errors
///
/// Returns `VnpayError::InvalidKey` if the MAC rejects the key. HMAC
/// accepts keys of any length, so this does not happen in practice.
pub fn sign_data(data: &str, secret: &str) -> Result<String, VnpayError> {
    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| VnpayError::InvalidKey)?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Signs the canonicalized parameters, returning lowercase hex.
///
/// # Errors
///
/// Returns `VnpayError::InvalidKey` if the MAC rejects the key.
pub fn sign(params: &BTreeMap<String, String>, secret: &str) -> Result<String, VnpayError> {
    sign_data(&canonical_query(params), secret)
}

/// Verifies the `vnp_SecureHash` carried in a callback payload.
///
/// Never partially trust an unverified payload: callers must bail before
/// reading any business field when this fails.
///
/// # Errors
///
/// `VnpayError::MissingField` when no hash is present,
/// `VnpayError::SignatureInvalid` on mismatch.
pub fn verify_signature(
    params: &BTreeMap<String, String>,
    secret: &str,
) -> Result<(), VnpayError> {
    let provided = params
        .get(HASH_KEY)
        .ok_or(VnpayError::MissingField(HASH_KEY))?;
    let expected = sign(params, secret)?;

    if constant_time_eq(provided.to_lowercase().as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(VnpayError::SignatureInvalid)
    }
}

/// Constant-time comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Builds the signed hosted-payment-page redirect URL.
///
/// `vnp_Amount` follows the provider convention of minor units ×100.
///
/// # Errors
///
/// Returns `VnpayError::AmountOverflow` if the amount does not fit the
/// x100 encoding, `VnpayError::InvalidKey` if signing fails.
#[allow(clippy::too_many_arguments)]
pub fn build_payment_url(
    payment_url: &str,
    tmn_code: &str,
    secret: &str,
    return_url: &str,
    txn_ref: &str,
    amount: Money,
    order_info: &str,
    client_ip: &str,
    created_at: DateTime<Utc>,
) -> Result<String, VnpayError> {
    let mut params = BTreeMap::new();
    params.insert("vnp_Version".to_string(), "2.1.0".to_string());
    params.insert("vnp_Command".to_string(), "pay".to_string());
    params.insert("vnp_TmnCode".to_string(), tmn_code.to_string());
    params.insert(
        "vnp_Amount".to_string(),
        to_provider_amount(amount)?.to_string(),
    );
    params.insert("vnp_CurrCode".to_string(), amount.currency.to_string());
    params.insert("vnp_TxnRef".to_string(), txn_ref.to_string());
    params.insert("vnp_OrderInfo".to_string(), order_info.to_string());
    params.insert("vnp_OrderType".to_string(), "other".to_string());
    params.insert("vnp_Locale".to_string(), "vn".to_string());
    params.insert("vnp_ReturnUrl".to_string(), return_url.to_string());
    params.insert("vnp_IpAddr".to_string(), client_ip.to_string());
    params.insert(
        "vnp_CreateDate".to_string(),
        created_at.format("%Y%m%d%H%M%S").to_string(),
    );

    let signature = sign(&params, secret)?;
    let query = canonical_query(&params);

    Ok(format!("{payment_url}?{query}&{HASH_KEY}={signature}"))
}

/// Converts a minor-unit amount to the provider's ×100 representation.
///
/// # Errors
///
/// Returns `VnpayError::AmountOverflow` when the multiplication would
/// wrap.
pub const fn to_provider_amount(amount: Money) -> Result<i64, VnpayError> {
    match amount.amount_minor.checked_mul(100) {
        Some(v) => Ok(v),
        None => Err(VnpayError::AmountOverflow),
    }
}

/// Business fields of a verified callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// Our transaction reference (`vnp_TxnRef`).
    pub txn_ref: String,
    /// Amount in minor units (provider value ÷ 100).
    pub amount_minor: i64,
    /// Provider response code (`"00"` = success).
    pub response_code: String,
    /// Provider-side transaction number, when present.
    pub transaction_no: Option<String>,
}

impl CallbackParams {
    /// Extracts business fields from a payload. Call `verify_signature`
    /// first; this does no authenticity checking.
    ///
    /// # Errors
    ///
    /// Returns `VnpayError::MissingField`/`MalformedField` on absent or
    /// unparseable parameters.
    pub fn from_params(params: &BTreeMap<String, String>) -> Result<Self, VnpayError> {
        let txn_ref = params
            .get("vnp_TxnRef")
            .ok_or(VnpayError::MissingField("vnp_TxnRef"))?
            .clone();
        let raw_amount = params
            .get("vnp_Amount")
            .ok_or(VnpayError::MissingField("vnp_Amount"))?;
        let provider_amount: i64 = raw_amount
            .parse()
            .map_err(|_| VnpayError::MalformedField("vnp_Amount"))?;
        if provider_amount < 0 || provider_amount % 100 != 0 {
            return Err(VnpayError::MalformedField("vnp_Amount"));
        }
        let response_code = params
            .get("vnp_ResponseCode")
            .ok_or(VnpayError::MissingField("vnp_ResponseCode"))?
            .clone();

        Ok(Self {
            txn_ref,
            amount_minor: provider_amount / 100,
            response_code,
            transaction_no: params.get("vnp_TransactionNo").cloned(),
        })
    }

    /// Whether the provider reports the payment as successful.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.response_code == "00"
    }
}

/// IPN acknowledgement body. The provider keys retries off `RspCode`,
/// so benign duplicates must answer `"02"`, never an HTTP error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpnAck {
    /// Provider-defined acknowledgement code.
    #[serde(rename = "RspCode")]
    pub rsp_code: String,
    /// Human-readable message.
    #[serde(rename = "Message")]
    pub message: String,
}

impl IpnAck {
    /// Callback accepted and applied.
    #[must_use]
    pub fn accepted() -> Self {
        Self {
            rsp_code: "00".to_string(),
            message: "Confirm Success".to_string(),
        }
    }

    /// No payment matches the transaction reference.
    #[must_use]
    pub fn order_not_found() -> Self {
        Self {
            rsp_code: "01".to_string(),
            message: "Order not found".to_string(),
        }
    }

    /// Payment already in a terminal state; delivery was a duplicate.
    #[must_use]
    pub fn already_processed() -> Self {
        Self {
            rsp_code: "02".to_string(),
            message: "Order already confirmed".to_string(),
        }
    }

    /// Callback amount does not match the recorded payment.
    #[must_use]
    pub fn amount_mismatch() -> Self {
        Self {
            rsp_code: "04".to_string(),
            message: "Invalid amount".to_string(),
        }
    }

    /// Signature verification failed.
    #[must_use]
    pub fn signature_invalid() -> Self {
        Self {
            rsp_code: "97".to_string(),
            message: "Invalid checksum".to_string(),
        }
    }

    /// Unexpected internal error; the provider should retry.
    #[must_use]
    pub fn internal_error() -> Self {
        Self {
            rsp_code: "99".to_string(),
            message: "Unknown error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use vigil_shared::Currency;

    use super::*;

    const SECRET: &str = "VNPAYSECRETKEY123";

    fn sample_params() -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("vnp_TmnCode".to_string(), "VIGIL01".to_string());
        params.insert("vnp_TxnRef".to_string(), "abc123".to_string());
        params.insert("vnp_Amount".to_string(), "20000000".to_string());
        params.insert("vnp_ResponseCode".to_string(), "00".to_string());
        params.insert("vnp_TransactionNo".to_string(), "14400996".to_string());
        params.insert(
            "vnp_OrderInfo".to_string(),
            "Nang cap goi premium".to_string(),
        );
        params
    }

    fn signed_params() -> BTreeMap<String, String> {
        let mut params = sample_params();
        let sig = sign(&params, SECRET).unwrap();
        params.insert("vnp_SecureHash".to_string(), sig);
        params
    }

    #[test]
    fn test_urlencode_matches_form_encoding() {
        assert_eq!(urlencode("Nang cap goi"), "Nang+cap+goi");
        assert_eq!(urlencode("a&b=c"), "a%26b%3Dc");
        assert_eq!(urlencode("plain-1.2_3*"), "plain-1.2_3*");
    }

    #[test]
    fn test_canonical_query_sorted_and_filtered() {
        let mut params = BTreeMap::new();
        params.insert("vnp_TxnRef".to_string(), "r1".to_string());
        params.insert("vnp_Amount".to_string(), "100".to_string());
        params.insert("vnp_SecureHash".to_string(), "deadbeef".to_string());
        params.insert("vnp_Empty".to_string(), String::new());

        assert_eq!(canonical_query(&params), "vnp_Amount=100&vnp_TxnRef=r1");
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let params = signed_params();
        assert_eq!(verify_signature(&params, SECRET), Ok(()));
    }

    #[test]
    fn test_verify_rejects_tampered_amount() {
        let mut params = signed_params();
        params.insert("vnp_Amount".to_string(), "1".to_string());
        assert_eq!(
            verify_signature(&params, SECRET),
            Err(VnpayError::SignatureInvalid)
        );
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let params = signed_params();
        assert_eq!(
            verify_signature(&params, "other-secret"),
            Err(VnpayError::SignatureInvalid)
        );
    }

    #[test]
    fn test_verify_requires_hash() {
        let params = sample_params();
        assert_eq!(
            verify_signature(&params, SECRET),
            Err(VnpayError::MissingField("vnp_SecureHash"))
        );
    }

    #[test]
    fn test_callback_params_amount_conversion() {
        let parsed = CallbackParams::from_params(&sample_params()).unwrap();
        assert_eq!(parsed.txn_ref, "abc123");
        assert_eq!(parsed.amount_minor, 200_000);
        assert!(parsed.is_success());
    }

    #[test]
    fn test_callback_params_rejects_bad_amount() {
        let mut params = sample_params();
        params.insert("vnp_Amount".to_string(), "123".to_string());
        assert_eq!(
            CallbackParams::from_params(&params),
            Err(VnpayError::MalformedField("vnp_Amount"))
        );

        params.insert("vnp_Amount".to_string(), "not-a-number".to_string());
        assert_eq!(
            CallbackParams::from_params(&params),
            Err(VnpayError::MalformedField("vnp_Amount"))
        );
    }

    #[test]
    fn test_failure_response_code() {
        let mut params = sample_params();
        params.insert("vnp_ResponseCode".to_string(), "24".to_string());
        let parsed = CallbackParams::from_params(&params).unwrap();
        assert!(!parsed.is_success());
    }

    #[test]
    fn test_build_payment_url_is_signed_and_verifiable() {
        let created = Utc.with_ymd_and_hms(2025, 5, 1, 9, 30, 0).unwrap();
        let url = build_payment_url(
            "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
            "VIGIL01",
            SECRET,
            "https://vigil.example/payments/return",
            "pay-42",
            Money::new(200_000, Currency::Vnd),
            "Nang cap goi premium",
            "203.0.113.10",
            created,
        )
        .unwrap();

        assert!(url.starts_with("https://sandbox.vnpayment.vn/paymentv2/vpcpay.html?"));
        assert!(url.contains("vnp_Amount=20000000"));
        assert!(url.contains("vnp_TxnRef=pay-42"));
        assert!(url.contains("vnp_CreateDate=20250501093000"));

        // Parse the query back and check the signature chain end to end
        let query = url.split_once('?').unwrap().1;
        let mut params = BTreeMap::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            // Values were form-encoded when the URL was built
            let decoded = v.replace('+', " ").replace("%26", "&").replace("%3D", "=");
            params.insert(k.to_string(), decoded);
        }
        assert_eq!(verify_signature(&params, SECRET), Ok(()));
    }

    #[test]
    fn test_sign_accepts_any_key_length() {
        assert!(sign_data("payload", "").is_ok());
        assert!(sign_data("payload", &"k".repeat(4096)).is_ok());
    }

    #[test]
    fn test_provider_amount_rejects_overflow() {
        assert_eq!(
            to_provider_amount(Money::new(i64::MAX, Currency::Vnd)),
            Err(VnpayError::AmountOverflow)
        );
        assert_eq!(
            to_provider_amount(Money::new(200_000, Currency::Vnd)),
            Ok(20_000_000)
        );
    }

    #[test]
    fn test_build_payment_url_rejects_overflowing_amount() {
        let err = build_payment_url(
            "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html",
            "VIGIL01",
            SECRET,
            "https://vigil.example/payments/return",
            "pay-43",
            Money::new(i64::MAX / 10, Currency::Vnd),
            "Nang cap goi premium",
            "203.0.113.10",
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, VnpayError::AmountOverflow);
    }

    #[test]
    fn test_ipn_ack_codes() {
        assert_eq!(IpnAck::accepted().rsp_code, "00");
        assert_eq!(IpnAck::order_not_found().rsp_code, "01");
        assert_eq!(IpnAck::already_processed().rsp_code, "02");
        assert_eq!(IpnAck::amount_mismatch().rsp_code, "04");
        assert_eq!(IpnAck::signature_invalid().rsp_code, "97");
        assert_eq!(IpnAck::internal_error().rsp_code, "99");
    }

    #[test]
    fn test_ipn_ack_wire_shape() {
        let json = serde_json::to_value(IpnAck::already_processed()).unwrap();
        assert_eq!(json["RspCode"], "02");
        assert!(json["Message"].is_string());
    }
}
