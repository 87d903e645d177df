//! Property-based tests for proration.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use vigil_shared::{Currency, Money};

use super::calculator::calculate;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

/// Strategy for plan prices in minor units (0 to 10M VND).
fn price() -> impl Strategy<Value = i64> {
    0i64..10_000_000
}

/// Strategy for period length in hours (1 hour to ~3 months).
fn period_hours() -> impl Strategy<Value = i64> {
    1i64..2200
}

/// Strategy for an offset of `now` relative to the period, in hours.
/// May fall before the start or after the end to exercise clamping.
fn now_offset_hours() -> impl Strategy<Value = i64> {
    -500i64..2700
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Net amount due is never negative: a cheaper plan mid-cycle is a
    /// free change, never an automatic refund.
    #[test]
    fn prop_net_due_never_negative(
        old in price(),
        new in price(),
        hours in period_hours(),
        offset in now_offset_hours(),
    ) {
        let start = epoch();
        let end = start + Duration::hours(hours);
        let now = start + Duration::hours(offset);

        let result = calculate(
            Money::new(old, Currency::Vnd),
            Money::new(new, Currency::Vnd),
            start,
            end,
            now,
        );

        prop_assert!(result.net_due.amount_minor >= 0);
    }

    /// Credit never exceeds the old plan price; charge never exceeds the
    /// new plan price (remaining fraction is clamped to [0, 1]).
    #[test]
    fn prop_amounts_bounded_by_full_price(
        old in price(),
        new in price(),
        hours in period_hours(),
        offset in now_offset_hours(),
    ) {
        let start = epoch();
        let end = start + Duration::hours(hours);
        let now = start + Duration::hours(offset);

        let result = calculate(
            Money::new(old, Currency::Vnd),
            Money::new(new, Currency::Vnd),
            start,
            end,
            now,
        );

        prop_assert!(result.credit.amount_minor <= old);
        prop_assert!(result.charge.amount_minor <= new);
        prop_assert!(result.net_due.amount_minor <= new);
    }

    /// A later change date never owes more: net due is monotonically
    /// non-increasing as the period elapses.
    #[test]
    fn prop_net_due_monotone_in_elapsed_time(
        old in price(),
        new in price(),
        hours in 2i64..2200,
        split in 1u8..100,
    ) {
        let start = epoch();
        let end = start + Duration::hours(hours);
        let earlier = start + Duration::hours(hours * i64::from(split) / 200);
        let later = start + Duration::hours(hours * i64::from(split) / 100);

        let old = Money::new(old, Currency::Vnd);
        let new = Money::new(new, Currency::Vnd);

        let at_earlier = calculate(old, new, start, end, earlier);
        let at_later = calculate(old, new, start, end, later);

        prop_assert!(at_later.net_due.amount_minor <= at_earlier.net_due.amount_minor);
    }

    /// Same plan both ways is always a zero-amount change.
    #[test]
    fn prop_identity_change_is_free(
        amount in price(),
        hours in period_hours(),
        offset in now_offset_hours(),
    ) {
        let start = epoch();
        let end = start + Duration::hours(hours);
        let now = start + Duration::hours(offset);
        let m = Money::new(amount, Currency::Vnd);

        let result = calculate(m, m, start, end, now);

        prop_assert_eq!(result.net_due.amount_minor, 0);
    }

    /// After the period end nothing is due and the change is deferred.
    #[test]
    fn prop_expired_period_defers(
        old in price(),
        new in price(),
        hours in period_hours(),
        after in 1i64..1000,
    ) {
        let start = epoch();
        let end = start + Duration::hours(hours);
        let now = end + Duration::hours(after);

        let result = calculate(
            Money::new(old, Currency::Vnd),
            Money::new(new, Currency::Vnd),
            start,
            end,
            now,
        );

        prop_assert!(result.is_deferred_to_renewal());
        prop_assert_eq!(result.net_due.amount_minor, 0);
    }
}
