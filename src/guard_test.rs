//! Tests for deny/allow list guard computation.

use crate::guard::{AllowList, DenyList, SYSTEM_FIELDS, effective_guard, is_system_field};

#[test]
fn system_fields_always_guarded() {
    let guard = effective_guard(&DenyList::new(), &AllowList::Empty);
    for field in SYSTEM_FIELDS {
        assert!(guard.contains(field), "missing system field {}", field);
    }
}

#[test]
fn deny_list_fields_are_added_to_system_fields() {
    let deny = DenyList::from(["status", "message"]);
    let guard = effective_guard(&deny, &AllowList::Empty);

    assert!(guard.contains("status"));
    assert!(guard.contains("message"));
    assert!(guard.contains("id"));
}

#[test]
fn allow_list_subtracts_from_guard() {
    let deny = DenyList::from(["a", "b"]);
    let allow = AllowList::fields(["a"]);
    let guard = effective_guard(&deny, &allow);

    assert!(!guard.contains("a"));
    assert!(guard.contains("b"));
}

#[test]
fn allow_list_can_expose_system_fields() {
    let allow = AllowList::fields(["created_at"]);
    let guard = effective_guard(&DenyList::new(), &allow);

    assert!(!guard.contains("created_at"));
    assert!(guard.contains("id"));
}

#[test]
fn allow_all_empties_the_guard() {
    let deny = DenyList::from(["status"]);
    let guard = effective_guard(&deny, &AllowList::All);
    assert!(guard.is_empty());
}

#[test]
fn is_system_field_matches_the_builtin_list() {
    assert!(is_system_field("id"));
    assert!(is_system_field("version"));
    assert!(!is_system_field("title"));
}
