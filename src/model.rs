//! Queryable model handles.
//!
//! Binding a [`ModelDef`] to a database yields a [`ModelHandle`], the
//! object every query and save goes through. The handle owns the
//! lifecycle: scoping queries to live records for soft-delete models,
//! validating sort fields, stamping timestamps and versions on save and
//! generating ids for new records.

use std::sync::Arc;

use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::query::{Filter, Page, QueryOptions};
use crate::record::Record;
use crate::schema::ModelDef;
use crate::store::Database;
use crate::util::{generate_entity_id, unix_now};
use crate::value::{FieldValue, id_key};

/// A model bound to a database connection.
pub struct ModelHandle<D: Database> {
    def: ModelDef,
    db: Arc<D>,
}

// Manual Debug impl - we don't require D: Debug, matching the Clone impl below.
impl<D: Database> std::fmt::Debug for ModelHandle<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").field("def", &self.def).finish()
    }
}

// Manual Clone impl - we only need the Arc to be cloneable, not D.
impl<D: Database> Clone for ModelHandle<D> {
    fn clone(&self) -> Self {
        Self {
            def: self.def.clone(),
            db: Arc::clone(&self.db),
        }
    }
}

impl<D: Database> ModelHandle<D> {
    /// Bind a model definition to a database, making sure backing storage
    /// exists.
    pub async fn bind(def: ModelDef, db: Arc<D>) -> DbResult<Self> {
        db.ensure_schema(&def).await?;
        Ok(Self { def, db })
    }

    pub fn def(&self) -> &ModelDef {
        &self.def
    }

    /// The underlying database, for backend-specific operations such as
    /// transactions.
    pub fn database(&self) -> &Arc<D> {
        &self.db
    }

    /// Scope options before they reach the backend: exclude soft-deleted
    /// records unless asked otherwise and drop sort fields the model does
    /// not know.
    fn scoped(&self, options: &QueryOptions) -> QueryOptions {
        let mut options = options.clone();
        if self.def.soft_delete && !options.with_deleted {
            options = options.and_filter(Filter::IsNull("deleted_at".to_string()));
        }
        let unknown_sort = options
            .sort_by
            .as_deref()
            .is_some_and(|field| !self.def.knows_field(field));
        if unknown_sort {
            options.sort_by = None;
            options.sort_order = None;
        }
        options
    }

    /// First record matching the options.
    pub async fn first(&self, options: &QueryOptions) -> DbResult<Option<Record>> {
        self.db.find_one(&self.def, &self.scoped(options)).await
    }

    /// First record with `field == value`.
    pub async fn first_by_attr(
        &self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> DbResult<Option<Record>> {
        self.first(&QueryOptions::new().filter(Filter::Eq(field.into(), value.into())))
            .await
    }

    /// All records matching the options, capped and offset per the query.
    pub async fn get(&self, options: &QueryOptions) -> DbResult<Vec<Record>> {
        self.db.find_all(&self.def, &self.scoped(options)).await
    }

    /// All records with `field == value`.
    pub async fn get_by_attr(
        &self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> DbResult<Vec<Record>> {
        self.get(&QueryOptions::new().filter(Filter::Eq(field.into(), value.into())))
            .await
    }

    /// One page of records plus the total count of matches.
    pub async fn get_page(&self, options: &QueryOptions) -> DbResult<Page<Record>> {
        let scoped = self.scoped(options);
        let items = self.db.find_all(&self.def, &scoped).await?;
        let total = self.db.count(&self.def, &scoped).await?;
        Ok(Page {
            items,
            total,
            page: scoped.page.unwrap_or(1),
            limit: scoped.effective_limit(),
        })
    }

    /// Count matching records; pagination options are ignored.
    pub async fn count(&self, options: &QueryOptions) -> DbResult<u64> {
        self.db.count(&self.def, &self.scoped(options)).await
    }

    /// Persist a record.
    ///
    /// New records get defaults, a generated id when none is set, and
    /// their creation stamps. Existing records persist their changed
    /// fields only; saving a clean record is a no-op. Validation runs
    /// against the model's attributes before anything is written.
    pub async fn save(&self, record: &mut Record) -> DbResult<()> {
        if record.is_new() {
            self.def.attributes.apply_defaults(record);
            if record.id().is_none() {
                record.set("id", generate_entity_id());
            }
            record.touch(unix_now());
            self.def.attributes.validate(record)?;
            self.db.insert(&self.def, record).await?;
            debug!(model = %self.def.name, "record created");
        } else {
            if !record.is_dirty() {
                return Ok(());
            }
            record.touch(unix_now());
            self.def.attributes.validate(record)?;
            let id = record.id().cloned().ok_or_else(|| DbError::InvalidData {
                message: format!("{} record has no id", self.def.name),
            })?;
            let changes = record.changes();
            let affected = self.db.update(&self.def, &id, &changes).await?;
            if affected == 0 {
                return Err(DbError::NotFound {
                    entity_type: self.def.name.clone(),
                    id: id_key(&id),
                });
            }
            debug!(model = %self.def.name, id = %id_key(&id), "record updated");
        }
        record.mark_persisted();
        Ok(())
    }

    /// Remove the record with the given id. Returns whether a row went
    /// away. Soft-delete policy lives a level up; this always removes.
    pub async fn destroy(&self, id: &FieldValue) -> DbResult<bool> {
        let affected = self.db.delete(&self.def, id).await?;
        if affected > 0 {
            debug!(model = %self.def.name, id = %id_key(id), "record destroyed");
        }
        Ok(affected > 0)
    }

    /// Bulk update without lifecycle stamps.
    pub async fn update_where(
        &self,
        changes: &std::collections::BTreeMap<String, FieldValue>,
        filter: Option<&Filter>,
    ) -> DbResult<u64> {
        self.db.update_where(&self.def, changes, filter).await
    }
}
