//! Pure proration calculator.
//!
//! All math is done on minor integer units with i128 intermediates;
//! floating-point is forbidden in this crate.

use chrono::{DateTime, Utc};
use vigil_shared::Money;

/// Result of a proration calculation, in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proration {
    /// Unused value of the current plan for the remaining time.
    pub credit: Money,
    /// Cost of the new plan for the same remaining time.
    pub charge: Money,
    /// `max(0, charge - credit)`. A surplus credit is never auto-refunded;
    /// refunds are a manual admin path.
    pub net_due: Money,
    /// Remaining milliseconds in the period (after clamping).
    pub remaining_ms: i64,
    /// Total milliseconds in the period.
    pub total_ms: i64,
}

impl Proration {
    /// True when the period had already lapsed: nothing is due now and
    /// the plan change takes effect at renewal instead of immediately.
    #[must_use]
    pub const fn is_deferred_to_renewal(&self) -> bool {
        self.remaining_ms == 0
    }

    /// Proration for a subscription with no live period: the full new
    /// plan price is due immediately.
    #[must_use]
    pub const fn full_price(new_price: Money) -> Self {
        Self {
            credit: Money::new(0, new_price.currency),
            charge: new_price,
            net_due: new_price,
            remaining_ms: 0,
            total_ms: 0,
        }
    }
}

/// Calculates the prorated credit/charge for switching plans at `now`
/// within `[period_start, period_end)`.
///
/// `remaining_fraction = (period_end - now) / (period_end - period_start)`
/// clamped to `[0, 1]`. A degenerate period (`period_end <= period_start`)
/// is treated as already expired: remaining fraction 0, nothing due now.
#[must_use]
pub fn calculate(
    old_price: Money,
    new_price: Money,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Proration {
    debug_assert_eq!(old_price.currency, new_price.currency);
    let currency = new_price.currency;

    let total_ms = (period_end - period_start).num_milliseconds().max(0);
    let remaining_ms = (period_end - now).num_milliseconds().clamp(0, total_ms);

    if total_ms == 0 || remaining_ms == 0 {
        return Proration {
            credit: Money::zero(currency),
            charge: Money::zero(currency),
            net_due: Money::zero(currency),
            remaining_ms: 0,
            total_ms,
        };
    }

    let credit = prorate_minor(old_price.amount_minor, remaining_ms, total_ms);
    let charge = prorate_minor(new_price.amount_minor, remaining_ms, total_ms);
    let net_due = (charge - credit).max(0);

    Proration {
        credit: Money::new(credit, currency),
        charge: Money::new(charge, currency),
        net_due: Money::new(net_due, currency),
        remaining_ms,
        total_ms,
    }
}

/// `amount * remaining / total` with an i128 intermediate, floored.
fn prorate_minor(amount_minor: i64, remaining_ms: i64, total_ms: i64) -> i64 {
    let scaled = i128::from(amount_minor) * i128::from(remaining_ms) / i128::from(total_ms);
    // amount * remaining / total <= amount, so this always fits in i64
    i64::try_from(scaled).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use vigil_shared::Currency;

    use super::*;

    fn vnd(amount: i64) -> Money {
        Money::new(amount, Currency::Vnd)
    }

    #[test]
    fn test_half_period_upgrade() {
        // Jan 1 -> Feb 1, changed at the midpoint of Jan 16
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 16, 12, 0, 0).unwrap();

        let result = calculate(vnd(200_000), vnd(400_000), start, end, now);

        assert_eq!(result.credit, vnd(100_000));
        assert_eq!(result.charge, vnd(200_000));
        assert_eq!(result.net_due, vnd(100_000));
        assert!(!result.is_deferred_to_renewal());
    }

    #[test]
    fn test_change_to_cheaper_plan_is_free_never_refunded() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 16, 12, 0, 0).unwrap();

        let result = calculate(vnd(400_000), vnd(200_000), start, end, now);

        assert_eq!(result.credit, vnd(200_000));
        assert_eq!(result.charge, vnd(100_000));
        assert!(result.net_due.is_zero());
    }

    #[test]
    fn test_past_period_end_defers_to_renewal() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 2, 15, 0, 0, 0).unwrap();

        let result = calculate(vnd(200_000), vnd(400_000), start, end, now);

        assert!(result.net_due.is_zero());
        assert!(result.is_deferred_to_renewal());
    }

    #[test]
    fn test_before_period_start_clamps_to_full_fraction() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 12, 25, 0, 0, 0).unwrap();

        let result = calculate(vnd(200_000), vnd(400_000), start, end, now);

        assert_eq!(result.credit, vnd(200_000));
        assert_eq!(result.charge, vnd(400_000));
        assert_eq!(result.net_due, vnd(200_000));
    }

    #[test]
    fn test_degenerate_period_is_expired() {
        let start = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();

        let result = calculate(vnd(200_000), vnd(400_000), start, end, now);

        assert!(result.net_due.is_zero());
        assert!(result.is_deferred_to_renewal());
    }

    #[test]
    fn test_full_price_for_missing_period() {
        let result = Proration::full_price(vnd(400_000));
        assert_eq!(result.net_due, vnd(400_000));
        assert!(result.credit.is_zero());
    }

    #[test]
    fn test_no_rounding_drift_on_odd_fractions() {
        // 7-day period, 2 days remaining: 100 * 2/7 = 28 (floored)
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 8, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 6, 0, 0, 0).unwrap();

        let result = calculate(vnd(100), vnd(700), start, end, now);

        assert_eq!(result.credit, vnd(28));
        assert_eq!(result.charge, vnd(200));
        assert_eq!(result.net_due, vnd(172));
    }
}
