//! Storage backends.
//!
//! The [`Database`] trait is the contract between the model layer and a
//! concrete driver, allowing different storage backends (SQLite, in-memory,
//! etc.) to be swapped without changing the layers above. Backends work on
//! dynamic records; schema knowledge travels with the [`ModelDef`] passed
//! into every call.

use std::collections::BTreeMap;

use crate::error::DbResult;
use crate::query::QueryOptions;
use crate::record::Record;
use crate::schema::ModelDef;
use crate::value::FieldValue;

pub mod memory;
pub mod sqlite;

#[cfg(test)]
mod memory_test;

pub use memory::MemoryDatabase;
pub use sqlite::SqliteDatabase;

/// Driver-level operations on one logical database.
///
/// Implementations receive fully scoped queries; soft-delete filtering and
/// sort-field validation happen in the model layer above.
#[allow(async_fn_in_trait)]
pub trait Database: Send + Sync + 'static {
    /// Make sure backing storage for the model exists. Relational backends
    /// issue DDL here; schemaless backends need not do anything.
    async fn ensure_schema(&self, model: &ModelDef) -> DbResult<()>;

    /// Insert a new record. The record carries its id.
    async fn insert(&self, model: &ModelDef, record: &Record) -> DbResult<()>;

    /// Apply `changes` to the record with the given id. Returns the number
    /// of affected rows (0 or 1).
    async fn update(
        &self,
        model: &ModelDef,
        id: &FieldValue,
        changes: &BTreeMap<String, FieldValue>,
    ) -> DbResult<u64>;

    /// Apply `changes` to every record matching `filter`. No lifecycle
    /// stamps are touched. Returns the number of affected rows.
    async fn update_where(
        &self,
        model: &ModelDef,
        changes: &BTreeMap<String, FieldValue>,
        filter: Option<&crate::query::Filter>,
    ) -> DbResult<u64>;

    async fn find_one(&self, model: &ModelDef, options: &QueryOptions)
    -> DbResult<Option<Record>>;

    async fn find_all(&self, model: &ModelDef, options: &QueryOptions) -> DbResult<Vec<Record>>;

    /// Count matching records; pagination options are ignored.
    async fn count(&self, model: &ModelDef, options: &QueryOptions) -> DbResult<u64>;

    /// Remove the record with the given id. Returns affected rows (0 or 1).
    async fn delete(&self, model: &ModelDef, id: &FieldValue) -> DbResult<u64>;

    /// Release driver resources.
    async fn close(&self);
}
