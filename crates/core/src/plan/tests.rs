//! Unit tests for plan catalog rules.

use super::*;

#[test]
fn test_version_lifecycle_happy_path() {
    let state = VersionState::Draft;
    let state = state.transition_to(VersionState::Active).unwrap();
    let state = state.transition_to(VersionState::Deprecated).unwrap();
    let state = state.transition_to(VersionState::Archived).unwrap();
    assert_eq!(state, VersionState::Archived);
}

#[test]
fn test_active_can_be_archived_directly() {
    assert_eq!(
        VersionState::Active.transition_to(VersionState::Archived),
        Ok(VersionState::Archived)
    );
}

#[test]
fn test_archived_is_terminal() {
    for target in [
        VersionState::Draft,
        VersionState::Active,
        VersionState::Deprecated,
    ] {
        assert!(VersionState::Archived.transition_to(target).is_err());
    }
}

#[test]
fn test_no_unpublish() {
    assert_eq!(
        VersionState::Active.transition_to(VersionState::Draft),
        Err(PlanError::InvalidStateTransition {
            from: VersionState::Active,
            to: VersionState::Draft,
        })
    );
}

#[test]
fn test_signup_visibility() {
    assert!(VersionState::Active.visible_to_signups());
    assert!(!VersionState::Draft.visible_to_signups());
    assert!(!VersionState::Deprecated.visible_to_signups());
    assert!(!VersionState::Archived.visible_to_signups());
}

#[test]
fn test_compare_tier_ignores_price() {
    // Promotional plan: tier 3 but cheap - still "higher" than tier 2
    assert_eq!(compare_tier(3, 2), TierOrdering::Higher);
    assert_eq!(compare_tier(1, 2), TierOrdering::Lower);
    assert_eq!(compare_tier(2, 2), TierOrdering::Equal);
}
