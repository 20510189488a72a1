//! Tests for DbError display formatting.

use crate::error::DbError;

#[test]
fn not_found_display_includes_entity_and_id() {
    let err = DbError::NotFound {
        entity_type: "Article".to_string(),
        id: "abc12345".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("Article"));
    assert!(msg.contains("abc12345"));
}

#[test]
fn validation_display_names_the_field() {
    let err = DbError::validation("email", "invalid email format");
    assert_eq!(
        err.to_string(),
        "Validation error on 'email': invalid email format"
    );
}

#[test]
fn foreign_key_exists_display_names_the_referencing_model() {
    let err = DbError::ForeignKeyExists {
        entity_type: "Category".to_string(),
        id: "cat1".to_string(),
        referenced_by: "Article".to_string(),
    };
    assert!(err.to_string().contains("still referenced by 'Article'"));
}

#[test]
fn database_shorthand_wraps_message() {
    let err = DbError::database("disk I/O error");
    assert_eq!(err.to_string(), "Database error: disk I/O error");
}
