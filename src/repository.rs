//! Generic CRUD helpers over a bound model.
//!
//! A [`DataRepository`] wraps a [`ModelHandle`] with the conveniences the
//! calling code wants: guarded create/update funneling through one save
//! path, reference-checked deletes, update-or-create, bulk updates and
//! optional read-through caching of list and lookup queries.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::{debug, instrument};

use crate::cache::{CacheStore, cache_key};
use crate::error::{DbError, DbResult};
use crate::guard::{AllowList, DenyList};
use crate::model::ModelHandle;
use crate::query::{Filter, Page, QueryOptions};
use crate::record::Record;
use crate::store::{Database, MemoryDatabase, SqliteDatabase};
use crate::util::unix_now;
use crate::value::{FieldValue, Payload, id_key};

/// Payload hook applied before guard-merge on every create/update.
pub type PayloadHook = Box<dyn Fn(Payload) -> DbResult<Payload> + Send + Sync>;

/// A foreign-key reference protecting deletes: rows of `model` pointing at
/// the deleted id through `foreign_key` block the delete.
pub struct ForeignKeyRef<D: Database> {
    pub model: ModelHandle<D>,
    pub foreign_key: String,
}

impl<D: Database> ForeignKeyRef<D> {
    pub fn new(model: ModelHandle<D>, foreign_key: impl Into<String>) -> Self {
        Self {
            model,
            foreign_key: foreign_key.into(),
        }
    }
}

/// CRUD helpers over one model.
pub struct DataRepository<D: Database> {
    model: ModelHandle<D>,
    foreign_keys: Vec<ForeignKeyRef<D>>,
    cache: Option<Arc<dyn CacheStore>>,
    before_load: Option<PayloadHook>,
}

impl<D: Database> DataRepository<D> {
    pub fn new(model: ModelHandle<D>) -> Self {
        Self {
            model,
            foreign_keys: Vec::new(),
            cache: None,
            before_load: None,
        }
    }

    /// Protect deletes against rows still referencing this model.
    pub fn with_foreign_key(mut self, reference: ForeignKeyRef<D>) -> Self {
        self.foreign_keys.push(reference);
        self
    }

    /// Attach a cache store for read-through caching of queries.
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Install a payload hook running before every guard-merge.
    pub fn with_before_load_data(mut self, hook: PayloadHook) -> Self {
        self.before_load = Some(hook);
        self
    }

    pub fn model(&self) -> &ModelHandle<D> {
        &self.model
    }

    fn table(&self) -> &str {
        &self.model.def().table
    }

    fn cache_read<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let cache = self.cache.as_ref()?;
        let hit = cache.get(key)?;
        match serde_json::from_str(&hit) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(_) => None,
        }
    }

    fn cache_write<T: serde::Serialize>(&self, key: &str, value: &T, options: &QueryOptions) {
        if let Some(cache) = &self.cache
            && let Ok(encoded) = serde_json::to_string(value)
        {
            cache.set(key, encoded, options.cache_ttl.map(Duration::from_secs));
        }
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.remove_prefix(&format!("{}_", self.table()));
        }
    }

    /// All records matching the options.
    pub async fn get_all(&self, options: QueryOptions) -> DbResult<Vec<Record>> {
        let key = cache_key(&format!("{}_all_", self.table()), &options);
        if let Some(records) = self.cache_read::<Vec<Record>>(&key) {
            return Ok(records);
        }
        let records = self.model.get(&options).await?;
        self.cache_write(&key, &records, &options);
        Ok(records)
    }

    /// One page of records plus the total count.
    pub async fn get_page(&self, options: QueryOptions) -> DbResult<Page<Record>> {
        let key = cache_key(&format!("{}_page_", self.table()), &options);
        if let Some(page) = self.cache_read::<Page<Record>>(&key) {
            return Ok(page);
        }
        let page = self.model.get_page(&options).await?;
        self.cache_write(&key, &page, &options);
        Ok(page)
    }

    /// First record matching the options.
    pub async fn get_one(&self, options: QueryOptions) -> DbResult<Option<Record>> {
        let key = cache_key(&format!("{}_one_", self.table()), &options);
        if let Some(record) = self.cache_read::<Option<Record>>(&key) {
            return Ok(record);
        }
        let record = self.model.first(&options).await?;
        self.cache_write(&key, &record, &options);
        Ok(record)
    }

    /// First record with `field == value`.
    pub async fn get_one_by(
        &self,
        field: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> DbResult<Option<Record>> {
        self.get_one(QueryOptions::new().filter(Filter::Eq(field.into(), value.into())))
            .await
    }

    /// First record whose `slug` or `key` equals the value.
    pub async fn get_one_by_slug_or_key(
        &self,
        value: impl Into<FieldValue>,
    ) -> DbResult<Option<Record>> {
        let value = value.into();
        self.get_one(QueryOptions::new().filter(Filter::Or(vec![
            Filter::Eq("slug".to_string(), value.clone()),
            Filter::Eq("key".to_string(), value),
        ])))
        .await
    }

    /// Count matching records.
    pub async fn total(&self, options: QueryOptions) -> DbResult<u64> {
        self.model.count(&options).await
    }

    /// Create a record from a payload, guard-merged, and persist it.
    #[instrument(skip_all, fields(model = %self.model.def().name))]
    pub async fn create(
        &self,
        payload: Payload,
        deny: &DenyList,
        allow: &AllowList,
    ) -> DbResult<Record> {
        let payload = self.apply_before_load(payload)?;
        let mut record = Record::new();
        record.load_data(&payload, deny, allow);
        self.model.save(&mut record).await?;
        self.invalidate_cache();
        Ok(record)
    }

    /// Create with publication-metadata defaults applied to the payload
    /// first (see [`apply_metadata_defaults`]).
    pub async fn create_with_metadata(
        &self,
        mut payload: Payload,
        deny: &DenyList,
        allow: &AllowList,
    ) -> DbResult<Record> {
        apply_metadata_defaults(&mut payload);
        self.create(payload, deny, allow).await
    }

    /// Guard-merge a payload onto the record with the given id and persist
    /// the changes.
    #[instrument(skip_all, fields(model = %self.model.def().name))]
    pub async fn update(
        &self,
        id: impl Into<FieldValue>,
        payload: Payload,
        deny: &DenyList,
        allow: &AllowList,
    ) -> DbResult<Record> {
        let id = id.into();
        let payload = self.apply_before_load(payload)?;
        // Read through the model, not the cache: stale reads must never
        // feed a save.
        let mut record = self
            .model
            .first_by_attr("id", id.clone())
            .await?
            .ok_or_else(|| DbError::NotFound {
                entity_type: self.model.def().name.clone(),
                id: id_key(&id),
            })?;
        record.load_data(&payload, deny, allow);
        self.model.save(&mut record).await?;
        self.invalidate_cache();
        Ok(record)
    }

    /// Bulk update matching rows without lifecycle stamps.
    pub async fn update_all(
        &self,
        changes: &std::collections::BTreeMap<String, FieldValue>,
        filter: Option<&Filter>,
    ) -> DbResult<u64> {
        let affected = self.model.update_where(changes, filter).await?;
        if affected > 0 {
            self.invalidate_cache();
        }
        Ok(affected)
    }

    /// Update the record whose `field` matches the payload's value, or
    /// create it when none exists.
    pub async fn add_unique(
        &self,
        field: &str,
        payload: Payload,
        deny: &DenyList,
        allow: &AllowList,
    ) -> DbResult<Record> {
        let probe = payload
            .get(field)
            .cloned()
            .ok_or_else(|| DbError::InvalidData {
                message: format!("payload is missing '{}'", field),
            })?;
        match self.model.first_by_attr(field, probe).await? {
            Some(existing) => {
                let id = existing.id().cloned().ok_or_else(|| DbError::InvalidData {
                    message: format!("{} record has no id", self.model.def().name),
                })?;
                self.update(id, payload, deny, allow).await
            }
            None => self.create(payload, deny, allow).await,
        }
    }

    /// Delete the record with the given id.
    ///
    /// Unless forced, referencing rows block the delete and soft-delete
    /// models stamp `deleted_at` instead of removing the row. Returns
    /// whether a record went away; deleting an unknown id is a no-op.
    #[instrument(skip_all, fields(model = %self.model.def().name))]
    pub async fn delete(&self, id: impl Into<FieldValue>, force: bool) -> DbResult<bool> {
        let id = id.into();
        // Include soft-deleted rows so a force delete can finish the job.
        let lookup = QueryOptions::new()
            .filter(Filter::Eq("id".to_string(), id.clone()))
            .with_deleted();
        let Some(mut record) = self.model.first(&lookup).await? else {
            return Ok(false);
        };

        if !force {
            for reference in &self.foreign_keys {
                let options = QueryOptions::new()
                    .filter(Filter::Eq(reference.foreign_key.clone(), id.clone()));
                let count = reference.model.count(&options).await?;
                if count > 0 {
                    return Err(DbError::ForeignKeyExists {
                        entity_type: self.model.def().name.clone(),
                        id: id_key(&id),
                        referenced_by: reference.model.def().name.clone(),
                    });
                }
            }
        }

        let deleted = if self.model.def().soft_delete && !force {
            record.mark_deleted(unix_now());
            self.model.save(&mut record).await?;
            true
        } else {
            self.model.destroy(&id).await?
        };

        if deleted {
            self.invalidate_cache();
        }
        Ok(deleted)
    }

    fn apply_before_load(&self, payload: Payload) -> DbResult<Payload> {
        match &self.before_load {
            Some(hook) => hook(payload),
            None => Ok(payload),
        }
    }
}

impl DataRepository<SqliteDatabase> {
    /// Run `f` inside a driver transaction (see
    /// [`SqliteDatabase::run_transaction`]).
    pub async fn run_transaction<F>(&self, f: F) -> DbResult<bool>
    where
        F: for<'c> FnOnce(&'c mut sqlx::SqliteConnection) -> BoxFuture<'c, DbResult<()>> + Send,
    {
        self.model.database().run_transaction(f).await
    }
}

impl DataRepository<MemoryDatabase> {
    /// Run `f` atomically against the store (see
    /// [`MemoryDatabase::run_transaction`]).
    pub async fn run_transaction<F>(&self, f: F) -> DbResult<bool>
    where
        F: for<'c> FnOnce(&'c MemoryDatabase) -> BoxFuture<'c, DbResult<()>> + Send,
    {
        self.model.database().run_transaction(f).await
    }
}

fn is_blank(value: Option<&FieldValue>) -> bool {
    match value {
        None => true,
        Some(FieldValue::Null) => true,
        Some(FieldValue::Text(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn set_if_blank(payload: &mut Payload, field: &str, value: Option<FieldValue>) {
    if is_blank(payload.get(field))
        && let Some(value) = value
        && !value.is_null()
    {
        payload.set(field, value);
    }
}

/// Fill publication metadata defaults on a payload.
///
/// Stringified `images`/`thumb` JSON is parsed; `metadata_title` and
/// `metadata_keywords` default to the title, `metadata_description` to the
/// intro text falling back to the title, and `metadata_image_url` to the
/// thumbnail's original URL.
pub fn apply_metadata_defaults(payload: &mut Payload) {
    if let Some(FieldValue::Text(raw)) = payload.get("images").cloned()
        && let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw)
    {
        if let Some(thumb) = parsed.get("thumb").filter(|t| !t.is_null()).cloned() {
            payload.set("thumb", FieldValue::from_json(thumb));
        }
        payload.set("images", FieldValue::from_json(parsed));
    }

    if let Some(FieldValue::Text(raw)) = payload.get("thumb").cloned()
        && let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw)
    {
        payload.set("thumb", FieldValue::from_json(parsed));
    }

    let title = payload.get("title").cloned();
    set_if_blank(payload, "metadata_title", title.clone());
    set_if_blank(payload, "metadata_keywords", title.clone());

    let description = payload
        .get("text_intro")
        .filter(|intro| !is_blank(Some(intro)))
        .cloned()
        .or(title);
    set_if_blank(payload, "metadata_description", description);

    let image_url = payload
        .get("thumb")
        .and_then(FieldValue::as_json)
        .and_then(|thumb| thumb.get("original"))
        .and_then(|original| original.as_str())
        .map(|url| FieldValue::Text(url.to_string()))
        .unwrap_or_else(|| FieldValue::Text(String::new()));
    set_if_blank(payload, "metadata_image_url", Some(image_url));
}
