//! Money type in minor integer units with currency.
//!
//! CRITICAL: Never use floating-point for money calculations.
//! All amounts are integers in the smallest currency unit; fractional
//! arithmetic (proration) goes through i128 intermediates.

use serde::{Deserialize, Serialize};

/// Represents a monetary amount with currency.
///
/// `amount_minor` is the amount in the smallest currency unit
/// (e.g., cents for USD; VND has no subunit so 1 minor unit = 1 dong).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    /// The amount in the smallest currency unit.
    pub amount_minor: i64,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

/// ISO 4217 currency codes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Vietnamese Dong
    Vnd,
    /// US Dollar
    Usd,
}

impl Money {
    /// Creates a new Money instance.
    #[must_use]
    pub const fn new(amount_minor: i64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    /// Creates a zero amount in the specified currency.
    #[must_use]
    pub const fn zero(currency: Currency) -> Self {
        Self {
            amount_minor: 0,
            currency,
        }
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.amount_minor == 0
    }

    /// Returns true if the amount is negative.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.amount_minor < 0
    }

    /// Checked addition. Currencies must match.
    #[must_use]
    pub fn checked_add(&self, other: Self) -> Option<Self> {
        if self.currency != other.currency {
            return None;
        }
        let amount_minor = self.amount_minor.checked_add(other.amount_minor)?;
        Some(Self {
            amount_minor,
            currency: self.currency,
        })
    }

    /// Saturating subtraction floored at zero. Currencies must match.
    ///
    /// Billing never produces negative amounts due; overshoot is credit
    /// that is simply not charged (refunds are a manual admin path).
    #[must_use]
    pub fn saturating_sub_floor_zero(&self, other: Self) -> Option<Self> {
        if self.currency != other.currency {
            return None;
        }
        let amount_minor = self.amount_minor.saturating_sub(other.amount_minor).max(0);
        Some(Self {
            amount_minor,
            currency: self.currency,
        })
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.amount_minor, self.currency)
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vnd => write!(f, "VND"),
            Self::Usd => write!(f, "USD"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "VND" => Ok(Self::Vnd),
            "USD" => Ok(Self::Usd),
            _ => Err(format!("Unknown currency: {s}")),
        }
    }
}
