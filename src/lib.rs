//! Thin data-access layer over pluggable storage backends.
//!
//! The crate offers three pieces of glue and one piece of policy:
//!
//! - [`Provider`]: lazily-created, name-keyed connections per logical
//!   database, plus model registration.
//! - [`ModelHandle`]: a queryable handle binding column attributes to a
//!   connection, owning the save lifecycle (timestamps, version, id
//!   generation, validation).
//! - [`DataRepository`]: generic CRUD helpers with reference-checked
//!   deletes, update-or-create and read-through caching.
//! - The attribute-assignment guard ([`Record::load_data`] with
//!   [`DenyList`]/[`AllowList`]): field-by-field control over what an
//!   untrusted payload may overwrite before a save.
//!
//! Storage is behind the [`store::Database`] trait; SQLite (via sqlx) and
//! an in-memory document-style backend ship in-tree.

pub mod cache;
pub mod error;
pub mod guard;
pub mod model;
pub mod provider;
pub mod query;
pub mod record;
pub mod repository;
pub mod schema;
pub mod store;
pub mod value;

mod util;

#[cfg(test)]
mod error_test;
#[cfg(test)]
mod guard_test;
#[cfg(test)]
mod model_test;

pub use cache::{CacheStore, MemoryCache, cache_key};
pub use error::{DbError, DbResult};
pub use guard::{AllowList, DenyList, SYSTEM_FIELDS};
pub use model::ModelHandle;
pub use provider::{Backend, DatabaseConfig, MemoryBackend, Provider, SqliteBackend};
pub use query::{Filter, MAX_LIMIT, Page, QueryOptions, SortOrder};
pub use record::Record;
pub use repository::{DataRepository, ForeignKeyRef, PayloadHook, apply_metadata_defaults};
pub use schema::{Attributes, ColumnDef, ColumnType, ModelDef, Validator};
pub use store::{Database, MemoryDatabase, SqliteDatabase};
pub use value::{FieldValue, Payload};
