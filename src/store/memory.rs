//! In-memory document-style backend.
//!
//! Schemaless: records are stored as raw field maps keyed by id, the way a
//! document store keeps them. Backs the test suite and small embedded
//! use cases; transactions are snapshot/restore over the whole store.

use std::collections::BTreeMap;
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::query::{Filter, QueryOptions, SortOrder};
use crate::record::Record;
use crate::schema::ModelDef;
use crate::store::Database;
use crate::value::{FieldValue, id_key};

type Document = BTreeMap<String, FieldValue>;
type Table = BTreeMap<String, Document>;

/// Document-style in-process store.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<BTreeMap<String, Table>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DbResult<std::sync::MutexGuard<'_, BTreeMap<String, Table>>> {
        self.tables.lock().map_err(|e| DbError::Database {
            message: format!("Failed to acquire store lock: {}", e),
        })
    }

    /// Run `f` atomically against this store: on error the whole store is
    /// restored to its prior state and `Ok(false)` is returned.
    ///
    /// Not isolated from concurrent writers; intended for the in-process,
    /// single-writer scenarios this backend serves.
    pub async fn run_transaction<F>(&self, f: F) -> DbResult<bool>
    where
        F: for<'c> FnOnce(&'c MemoryDatabase) -> BoxFuture<'c, DbResult<()>> + Send,
    {
        let snapshot = self.lock()?.clone();
        match f(self).await {
            Ok(()) => Ok(true),
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                *self.lock()? = snapshot;
                Ok(false)
            }
        }
    }
}

fn record_id(model: &ModelDef, record: &Record) -> DbResult<String> {
    record
        .id()
        .map(id_key)
        .ok_or_else(|| DbError::InvalidData {
            message: format!("{} record has no id", model.name),
        })
}

fn matching<'t>(
    table: &'t Table,
    filter: Option<&'t Filter>,
) -> impl Iterator<Item = (&'t String, &'t Document)> {
    table.iter().filter(move |(_, fields)| match filter {
        Some(filter) => filter.matches_fields(fields),
        None => true,
    })
}

fn sort_records(records: &mut [Record], options: &QueryOptions) {
    let Some(field) = options.sort_by.clone() else {
        return;
    };
    let order = options.sort_order.unwrap_or_default();
    records.sort_by(|a, b| {
        let null = FieldValue::Null;
        let left = a.get(&field).unwrap_or(&null);
        let right = b.get(&field).unwrap_or(&null);
        let ordering = left.compare(right).unwrap_or(std::cmp::Ordering::Equal);
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

impl Database for MemoryDatabase {
    async fn ensure_schema(&self, model: &ModelDef) -> DbResult<()> {
        self.lock()?.entry(model.table.clone()).or_default();
        Ok(())
    }

    async fn insert(&self, model: &ModelDef, record: &Record) -> DbResult<()> {
        let key = record_id(model, record)?;
        let mut tables = self.lock()?;
        let table = tables.entry(model.table.clone()).or_default();
        if table.contains_key(&key) {
            return Err(DbError::AlreadyExists {
                entity_type: model.name.clone(),
                id: key,
            });
        }
        table.insert(key, record.fields().clone());
        Ok(())
    }

    async fn update(
        &self,
        model: &ModelDef,
        id: &FieldValue,
        changes: &BTreeMap<String, FieldValue>,
    ) -> DbResult<u64> {
        let key = id_key(id);
        let mut tables = self.lock()?;
        let table = tables.entry(model.table.clone()).or_default();
        match table.get_mut(&key) {
            Some(fields) => {
                for (field, value) in changes {
                    fields.insert(field.clone(), value.clone());
                }
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_where(
        &self,
        model: &ModelDef,
        changes: &BTreeMap<String, FieldValue>,
        filter: Option<&Filter>,
    ) -> DbResult<u64> {
        let mut tables = self.lock()?;
        let table = tables.entry(model.table.clone()).or_default();
        let keys: Vec<String> = matching(table, filter)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            if let Some(fields) = table.get_mut(key) {
                for (field, value) in changes {
                    fields.insert(field.clone(), value.clone());
                }
            }
        }
        Ok(keys.len() as u64)
    }

    async fn find_one(
        &self,
        model: &ModelDef,
        options: &QueryOptions,
    ) -> DbResult<Option<Record>> {
        let mut narrowed = options.clone();
        narrowed.limit = Some(1);
        narrowed.offset = None;
        narrowed.page = None;
        Ok(self.find_all(model, &narrowed).await?.into_iter().next())
    }

    async fn find_all(&self, model: &ModelDef, options: &QueryOptions) -> DbResult<Vec<Record>> {
        let tables = self.lock()?;
        let mut records: Vec<Record> = match tables.get(&model.table) {
            Some(table) => matching(table, options.filter.as_ref())
                .map(|(_, fields)| Record::from_fields(fields.clone()))
                .collect(),
            None => Vec::new(),
        };
        drop(tables);

        sort_records(&mut records, options);
        Ok(records
            .into_iter()
            .skip(options.effective_offset())
            .take(options.effective_limit())
            .collect())
    }

    async fn count(&self, model: &ModelDef, options: &QueryOptions) -> DbResult<u64> {
        let tables = self.lock()?;
        Ok(match tables.get(&model.table) {
            Some(table) => matching(table, options.filter.as_ref()).count() as u64,
            None => 0,
        })
    }

    async fn delete(&self, model: &ModelDef, id: &FieldValue) -> DbResult<u64> {
        let mut tables = self.lock()?;
        let table = tables.entry(model.table.clone()).or_default();
        Ok(match table.remove(&id_key(id)) {
            Some(_) => 1,
            None => 0,
        })
    }

    async fn close(&self) {
        if let Ok(mut tables) = self.tables.lock() {
            tables.clear();
        }
    }
}
