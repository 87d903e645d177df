//! Unit tests for subscription lifecycle rules.

use chrono::{TimeZone, Utc};
use rstest::rstest;

use super::*;

#[test]
fn test_active_loops_back_to_active() {
    // Upgrade/renewal applies new plan + period while staying active
    assert!(
        SubscriptionStatus::Active
            .transition_to(SubscriptionStatus::Active)
            .is_ok()
    );
}

#[rstest]
#[case(SubscriptionStatus::Trialing)]
#[case(SubscriptionStatus::Active)]
#[case(SubscriptionStatus::Paused)]
#[case(SubscriptionStatus::PastDue)]
#[case(SubscriptionStatus::Cancelled)]
fn test_cancelled_is_terminal(#[case] target: SubscriptionStatus) {
    assert!(
        SubscriptionStatus::Cancelled
            .transition_to(target)
            .is_err()
    );
}

#[test]
fn test_past_due_can_reactivate() {
    assert!(
        SubscriptionStatus::PastDue
            .transition_to(SubscriptionStatus::Active)
            .is_ok()
    );
}

#[test]
fn test_trialing_cannot_pause() {
    assert_eq!(
        SubscriptionStatus::Trialing.transition_to(SubscriptionStatus::Paused),
        Err(LifecycleError::InvalidTransition {
            from: SubscriptionStatus::Trialing,
            to: SubscriptionStatus::Paused,
        })
    );
}

#[test]
fn test_live_statuses() {
    assert!(SubscriptionStatus::Active.is_live());
    assert!(SubscriptionStatus::PastDue.is_live());
    assert!(SubscriptionStatus::Paused.is_live());
    assert!(!SubscriptionStatus::Cancelled.is_live());
}

#[test]
fn test_monthly_period_end() {
    let start = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
    let end = period_end_after(start, BillingPeriod::Monthly);
    assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 15, 10, 0, 0).unwrap());
}

#[test]
fn test_monthly_period_end_clamps_to_month_length() {
    let start = Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap();
    let end = period_end_after(start, BillingPeriod::Monthly);
    assert_eq!(end, Utc.with_ymd_and_hms(2025, 2, 28, 0, 0, 0).unwrap());
}

#[test]
fn test_free_period_end_is_far_future() {
    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let end = period_end_after(start, BillingPeriod::None);
    assert!(end > Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap());
}

#[rstest]
#[case(1, 2, true)]
#[case(2, 2, false)]
#[case(3, 1, false)]
fn test_upgrade_guard_requires_strictly_higher_tier(
    #[case] current: i32,
    #[case] target: i32,
    #[case] allowed: bool,
) {
    assert_eq!(require_upgrade(current, target).is_ok(), allowed);
}

#[test]
fn test_upgrade_guard_error_carries_tiers() {
    assert_eq!(
        require_upgrade(2, 2),
        Err(LifecycleError::NotAnUpgrade {
            current_tier: 2,
            target_tier: 2,
        })
    );
}

#[rstest]
#[case(3, 1, true)]
#[case(1, 1, false)]
#[case(1, 3, false)]
fn test_downgrade_guard_requires_strictly_lower_tier(
    #[case] current: i32,
    #[case] target: i32,
    #[case] allowed: bool,
) {
    assert_eq!(require_downgrade(current, target).is_ok(), allowed);
}

#[test]
fn test_delivery_data_canonical_json() {
    let data = DeliveryData::NewPlan {
        plan_code: "premium".to_string(),
    };
    let json = serde_json::to_value(&data).unwrap();
    assert_eq!(json["kind"], "new_plan");
    assert_eq!(json["plan_code"], "premium");

    let back: DeliveryData = serde_json::from_value(json).unwrap();
    assert_eq!(back, data);
}

#[test]
fn test_delivery_data_renewal_json() {
    let data = DeliveryData::Renewal {
        billing_period: BillingPeriod::Monthly,
        billing_type: BillingType::Prepaid,
    };
    let json = serde_json::to_value(&data).unwrap();
    assert_eq!(json["kind"], "renewal");
    assert_eq!(json["billing_period"], "monthly");
    assert_eq!(json["billing_type"], "prepaid");
}
