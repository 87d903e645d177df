//! Core business logic for the Vigil subscription & entitlement engine.
//!
//! This crate is pure: no web framework, no database. It owns:
//! - Plan catalog rules (version lifecycle, tier comparison)
//! - Proration math in minor integer units
//! - Quota & entitlement evaluation (soft cap / grace / hard cap)
//! - Subscription state machine rules and payment delivery payloads
//! - VNPay canonical signing and callback verification

pub mod lifecycle;
pub mod payment;
pub mod plan;
pub mod proration;
pub mod quota;
