//! Error types for the data-access layer.
//!
//! This module provides abstracted error types for database operations.
//! It uses miette for diagnostic output and thiserror for derive macros.
//! The error types are storage-backend agnostic.

use miette::Diagnostic;
use thiserror::Error;

/// Database operation errors.
#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Entity not found: {entity_type} with id '{id}'")]
    #[diagnostic(code(datalayer::db::not_found))]
    NotFound { entity_type: String, id: String },

    #[error("Entity already exists: {entity_type} with id '{id}'")]
    #[diagnostic(code(datalayer::db::already_exists))]
    AlreadyExists { entity_type: String, id: String },

    #[error("Invalid data: {message}")]
    #[diagnostic(code(datalayer::db::invalid_data))]
    InvalidData { message: String },

    #[error("Validation error on '{field}': {message}")]
    #[diagnostic(code(datalayer::db::validation_error))]
    Validation { field: String, message: String },

    #[error("Database error: {message}")]
    #[diagnostic(code(datalayer::db::database_error))]
    Database { message: String },

    #[error("Connection error: {message}")]
    #[diagnostic(code(datalayer::db::connection_error))]
    Connection { message: String },

    #[error("Migration error: {message}")]
    #[diagnostic(code(datalayer::db::migration_error))]
    Migration { message: String },

    #[error("Constraint violation: {message}")]
    #[diagnostic(code(datalayer::db::constraint))]
    Constraint { message: String },

    #[error("Cannot delete: {entity_type} '{id}' is still referenced by '{referenced_by}'")]
    #[diagnostic(code(datalayer::db::foreign_key_exists))]
    ForeignKeyExists {
        entity_type: String,
        id: String,
        referenced_by: String,
    },

    #[error("Operation not supported by this backend: {operation}")]
    #[diagnostic(code(datalayer::db::unsupported))]
    Unsupported { operation: String },

    #[error("Cache error: {message}")]
    #[diagnostic(code(datalayer::db::cache_error))]
    Cache { message: String },
}

impl DbError {
    /// Shorthand for a backend error wrapping a driver message.
    pub fn database(message: impl Into<String>) -> Self {
        DbError::Database {
            message: message.into(),
        }
    }

    /// Shorthand for a validation failure on a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
