//! In-memory representation of one persisted entity.
//!
//! A [`Record`] tracks which fields changed since it was loaded, whether it
//! has been persisted yet, and carries the system-managed lifecycle fields
//! (identity, timestamps, version). Payload data only enters through
//! [`Record::load_data`], which applies the deny/allow guard.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};

use crate::guard::{AllowList, DenyList, effective_guard};
use crate::value::{FieldValue, Payload};

/// One entity instance, in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
    dirty: BTreeSet<String>,
    new: bool,
}

impl Record {
    /// A fresh, unsaved record.
    pub fn new() -> Self {
        Record {
            fields: BTreeMap::new(),
            dirty: BTreeSet::new(),
            new: true,
        }
    }

    /// Rebuild a record from stored fields. The record is clean and counts
    /// as persisted.
    pub fn from_fields(fields: BTreeMap<String, FieldValue>) -> Self {
        Record {
            fields,
            dirty: BTreeSet::new(),
            new: false,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Assign a field, marking it dirty. Assigning a value equal to the
    /// current one is a no-op so dirty tracking stays accurate.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        let field = field.into();
        let value = value.into();
        if self.fields.get(&field) != Some(&value) {
            self.fields.insert(field.clone(), value);
            self.dirty.insert(field);
        }
        self
    }

    /// Copy permitted payload entries onto this record.
    ///
    /// The effective guard is `deny` plus the built-in system fields, minus
    /// the allow-list (see [`crate::guard::effective_guard`]). Null payload
    /// values are never assigned; absent keys are left untouched. Unknown
    /// keys pass through when unguarded.
    ///
    /// Returns `&mut self` for chaining. Never fails and never persists.
    pub fn load_data(&mut self, payload: &Payload, deny: &DenyList, allow: &AllowList) -> &mut Self {
        let guard = effective_guard(deny, allow);
        for (field, value) in payload.iter() {
            if guard.contains(field.as_str()) || value.is_null() {
                continue;
            }
            self.set(field.clone(), value.clone());
        }
        self
    }

    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn dirty_fields(&self) -> impl Iterator<Item = &String> {
        self.dirty.iter()
    }

    /// The changed fields with their current values, as sent to storage on
    /// update.
    pub fn changes(&self) -> BTreeMap<String, FieldValue> {
        self.dirty
            .iter()
            .filter_map(|field| {
                self.fields
                    .get(field)
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect()
    }

    /// Mark the record persisted: clears dirty state and the new flag.
    pub fn mark_persisted(&mut self) {
        self.new = false;
        self.dirty.clear();
    }

    pub fn id(&self) -> Option<&FieldValue> {
        self.fields.get("id")
    }

    pub fn created_at(&self) -> Option<i64> {
        self.fields.get("created_at").and_then(FieldValue::as_i64)
    }

    pub fn updated_at(&self) -> Option<i64> {
        self.fields.get("updated_at").and_then(FieldValue::as_i64)
    }

    pub fn version(&self) -> Option<i64> {
        self.fields.get("version").and_then(FieldValue::as_i64)
    }

    pub fn deleted_at(&self) -> Option<i64> {
        self.fields.get("deleted_at").and_then(FieldValue::as_i64)
    }

    /// Soft-deleted records carry a deletion timestamp.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    /// Stamp the soft-delete timestamp.
    pub fn mark_deleted(&mut self, now: i64) -> &mut Self {
        self.set("deleted_at", now)
    }

    /// Apply the save lifecycle stamps. Called by the persistence path,
    /// never by payload handling.
    ///
    /// `updated_at` is set on every save; `created_at` and an initial
    /// version on first save; the version increments when any field
    /// changed since the last save.
    pub fn touch(&mut self, now: i64) -> &mut Self {
        let changed = self.is_dirty();
        self.set("updated_at", now);
        if self.new {
            self.set("created_at", now);
            self.set("version", 0i64);
        } else if changed {
            let version = self.version().unwrap_or(0);
            self.set("version", version + 1);
        }
        self
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }
}

// Records serialize as their field map; dirty state and the new flag are
// in-memory bookkeeping only. Deserialized records count as stored.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = BTreeMap::<String, FieldValue>::deserialize(deserializer)?;
        Ok(Record::from_fields(fields))
    }
}
