//! Unit tests for the Money type.

use std::str::FromStr;

use super::money::{Currency, Money};

#[test]
fn test_money_new() {
    let money = Money::new(200_000, Currency::Vnd);
    assert_eq!(money.amount_minor, 200_000);
    assert_eq!(money.currency, Currency::Vnd);
}

#[test]
fn test_money_zero() {
    let money = Money::zero(Currency::Vnd);
    assert!(money.is_zero());
    assert!(!money.is_negative());
}

#[test]
fn test_money_checked_add() {
    let a = Money::new(100, Currency::Vnd);
    let b = Money::new(50, Currency::Vnd);
    assert_eq!(a.checked_add(b), Some(Money::new(150, Currency::Vnd)));

    // Currency mismatch is never silently coerced
    let c = Money::new(50, Currency::Usd);
    assert_eq!(a.checked_add(c), None);

    // Overflow is surfaced, not wrapped
    let max = Money::new(i64::MAX, Currency::Vnd);
    assert_eq!(max.checked_add(Money::new(1, Currency::Vnd)), None);
}

#[test]
fn test_money_sub_floors_at_zero() {
    let charge = Money::new(100, Currency::Vnd);
    let credit = Money::new(250, Currency::Vnd);
    let net = charge.saturating_sub_floor_zero(credit).unwrap();
    assert!(net.is_zero());

    let net = credit.saturating_sub_floor_zero(charge).unwrap();
    assert_eq!(net.amount_minor, 150);
}

#[test]
fn test_currency_display_and_parse() {
    assert_eq!(Currency::Vnd.to_string(), "VND");
    assert_eq!(Currency::Usd.to_string(), "USD");
    assert_eq!(Currency::from_str("vnd").unwrap(), Currency::Vnd);
    assert_eq!(Currency::from_str("USD").unwrap(), Currency::Usd);
    assert!(Currency::from_str("XXX").is_err());
    assert!(Currency::from_str("").is_err());
}

#[test]
fn test_money_display() {
    assert_eq!(Money::new(200_000, Currency::Vnd).to_string(), "200000 VND");
}
