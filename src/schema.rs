//! Column attribute definitions and model descriptions.
//!
//! A [`ModelDef`] carries everything registration needs: the model name,
//! the backing table (or collection), the logical database it lives in and
//! the column attributes. Attribute normalization fills type-appropriate
//! defaults and attaches conventional validators by field name, mirroring
//! how the save path expects records to look.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};
use crate::record::Record;
use crate::value::FieldValue;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Id,
    Integer,
    Double,
    Boolean,
    Text,
    Json,
}

/// Field-level validation rules, checked on save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validator {
    NotEmpty,
    Email,
    Slug,
    Integer,
}

/// Definition of a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub column_type: ColumnType,
    pub default: Option<FieldValue>,
    pub allow_empty: bool,
    pub validators: Vec<Validator>,
}

impl ColumnDef {
    pub fn new(column_type: ColumnType) -> Self {
        ColumnDef {
            column_type,
            default: None,
            allow_empty: true,
            validators: Vec::new(),
        }
    }

    pub fn with_default(mut self, default: impl Into<FieldValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Reject empty values for this column.
    pub fn not_empty(mut self) -> Self {
        self.allow_empty = false;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        if !self.validators.contains(&validator) {
            self.validators.push(validator);
        }
        self
    }
}

/// Ordered set of column definitions for a model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, ColumnDef>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, def: ColumnDef) -> Self {
        self.0.insert(name.into(), def);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ColumnDef)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Fill in defaults and conventional validators.
    ///
    /// Every non-id column without an explicit default gets a
    /// type-appropriate one. Columns named `email` and `slug` get their
    /// matching format validator; columns that reject empty values get
    /// `NotEmpty`.
    pub fn normalized(&self) -> Self {
        let mut out = BTreeMap::new();
        for (name, def) in &self.0 {
            let mut def = def.clone();
            if def.column_type != ColumnType::Id {
                if def.default.is_none() {
                    def.default = type_default(def.column_type);
                }
                match name.as_str() {
                    "email" => def = def.with_validator(Validator::Email),
                    "slug" => def = def.with_validator(Validator::Slug),
                    _ => {}
                }
                if !def.allow_empty {
                    def = def.with_validator(Validator::NotEmpty);
                }
            }
            out.insert(name.clone(), def);
        }
        Attributes(out)
    }

    /// Fill missing record fields with column defaults. Used for new
    /// records just before their first save.
    pub fn apply_defaults(&self, record: &mut Record) {
        for (name, def) in &self.0 {
            if record.get(name).is_none()
                && let Some(default) = &def.default
                && !default.is_null()
            {
                record.set(name.clone(), default.clone());
            }
        }
    }

    /// Validate a record against the column rules.
    ///
    /// Empty values pass format validators when the column allows empty;
    /// `NotEmpty` always rejects them.
    pub fn validate(&self, record: &Record) -> DbResult<()> {
        for (name, def) in &self.0 {
            let value = record.get(name);
            for validator in &def.validators {
                check(*validator, name, value, def.allow_empty)?;
            }
        }
        Ok(())
    }
}

impl FromIterator<(String, ColumnDef)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (String, ColumnDef)>>(iter: T) -> Self {
        Attributes(iter.into_iter().collect())
    }
}

// Ids and composite columns have no sensible implicit default.
fn type_default(column_type: ColumnType) -> Option<FieldValue> {
    match column_type {
        ColumnType::Id | ColumnType::Json => None,
        ColumnType::Integer => Some(FieldValue::Int(0)),
        ColumnType::Double => Some(FieldValue::Float(0.0)),
        ColumnType::Boolean => Some(FieldValue::Bool(false)),
        ColumnType::Text => Some(FieldValue::Text(String::new())),
    }
}

fn is_empty_value(value: Option<&FieldValue>) -> bool {
    match value {
        None => true,
        Some(FieldValue::Null) => true,
        Some(FieldValue::Text(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn check(
    validator: Validator,
    field: &str,
    value: Option<&FieldValue>,
    allow_empty: bool,
) -> DbResult<()> {
    let empty = is_empty_value(value);
    match validator {
        Validator::NotEmpty => {
            if empty {
                return Err(DbError::validation(field, "must not be empty"));
            }
        }
        Validator::Email => {
            if empty && allow_empty {
                return Ok(());
            }
            let ok = value
                .and_then(FieldValue::as_str)
                .is_some_and(is_valid_email);
            if !ok {
                return Err(DbError::validation(field, "invalid email format"));
            }
        }
        Validator::Slug => {
            if empty && allow_empty {
                return Ok(());
            }
            let ok = value.and_then(FieldValue::as_str).is_some_and(is_valid_slug);
            if !ok {
                return Err(DbError::validation(
                    field,
                    "only letters, digits, '-' and '_' allowed",
                ));
            }
        }
        Validator::Integer => {
            if empty && allow_empty {
                return Ok(());
            }
            if value.and_then(FieldValue::as_i64).is_none() {
                return Err(DbError::validation(field, "must be an integer"));
            }
        }
    }
    Ok(())
}

fn is_valid_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !text.chars().any(char::is_whitespace)
}

fn is_valid_slug(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Description of a model: what it is called, where it lives and what its
/// columns look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Registry key; unique per provider.
    pub name: String,
    /// Backing table or collection name.
    pub table: String,
    /// Logical database this model belongs to.
    pub database: String,
    pub attributes: Attributes,
    /// Soft-delete models stamp `deleted_at` instead of removing rows.
    pub soft_delete: bool,
}

impl ModelDef {
    /// Create a model definition; attributes are normalized on the way in.
    pub fn new(
        name: impl Into<String>,
        table: impl Into<String>,
        database: impl Into<String>,
        attributes: Attributes,
    ) -> Self {
        ModelDef {
            name: name.into(),
            table: table.into(),
            database: database.into(),
            attributes: attributes.normalized(),
            soft_delete: false,
        }
    }

    pub fn with_soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// True when `field` is a column of this model or a system field.
    pub fn knows_field(&self, field: &str) -> bool {
        self.attributes.contains(field) || crate::guard::is_system_field(field)
    }
}
