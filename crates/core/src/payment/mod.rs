//! Payment provider wire formats and verification.

pub mod vnpay;

pub use vnpay::{
    CallbackParams, IpnAck, VnpayError, build_payment_url, sign, sign_data, verify_signature,
};
