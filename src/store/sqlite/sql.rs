//! SQL generation helpers for the SQLite backend.
//!
//! Field names are checked against the model before they are interpolated;
//! values always go through bound parameters.

use crate::error::{DbError, DbResult};
use crate::query::{Filter, QueryOptions, SortOrder};
use crate::schema::{ColumnType, ModelDef};
use crate::value::FieldValue;

/// System columns appended to every table, in select order.
pub(crate) const SYSTEM_COLUMNS: [&str; 4] = ["created_at", "updated_at", "deleted_at", "version"];

fn is_valid_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reject field names that are not columns of the model or that would not
/// survive interpolation.
pub(crate) fn ensure_column<'a>(model: &ModelDef, field: &'a str) -> DbResult<&'a str> {
    if !model.knows_field(field) {
        return Err(DbError::InvalidData {
            message: format!("unknown field '{}' for model {}", field, model.name),
        });
    }
    if !is_valid_ident(field) {
        return Err(DbError::InvalidData {
            message: format!("invalid field name '{}'", field),
        });
    }
    Ok(field)
}

/// All columns of the model's table: id, attributes, system columns.
pub(crate) fn column_list(model: &ModelDef) -> Vec<String> {
    let mut columns = vec!["id".to_string()];
    for (name, _) in model.attributes.iter() {
        if name != "id" && !SYSTEM_COLUMNS.contains(&name.as_str()) {
            columns.push(name.clone());
        }
    }
    columns.extend(SYSTEM_COLUMNS.iter().map(|name| name.to_string()));
    columns
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Id | ColumnType::Text | ColumnType::Json => "TEXT",
        ColumnType::Integer | ColumnType::Boolean => "INTEGER",
        ColumnType::Double => "REAL",
    }
}

/// DDL for the model's table. Safe to run repeatedly.
pub(crate) fn create_table_sql(model: &ModelDef) -> String {
    let mut columns = vec!["id TEXT PRIMARY KEY".to_string()];
    for (name, def) in model.attributes.iter() {
        if name == "id" || SYSTEM_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        columns.push(format!("{} {}", name, sql_type(def.column_type)));
    }
    columns.push("created_at INTEGER NOT NULL DEFAULT 0".to_string());
    columns.push("updated_at INTEGER NOT NULL DEFAULT 0".to_string());
    columns.push("deleted_at INTEGER".to_string());
    columns.push("version INTEGER NOT NULL DEFAULT 0".to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        model.table,
        columns.join(", ")
    )
}

/// Render a filter tree to a SQL predicate plus its bind values.
pub(crate) fn render_filter(
    model: &ModelDef,
    filter: &Filter,
    binds: &mut Vec<FieldValue>,
) -> DbResult<String> {
    Ok(match filter {
        Filter::Eq(field, value) => {
            let column = ensure_column(model, field)?;
            if value.is_null() {
                format!("{} IS NULL", column)
            } else {
                binds.push(value.clone());
                format!("{} = ?", column)
            }
        }
        Filter::Ne(field, value) => {
            let column = ensure_column(model, field)?;
            if value.is_null() {
                format!("{} IS NOT NULL", column)
            } else {
                binds.push(value.clone());
                format!("{} <> ?", column)
            }
        }
        Filter::Gt(field, value) => comparison(model, field, ">", value, binds)?,
        Filter::Gte(field, value) => comparison(model, field, ">=", value, binds)?,
        Filter::Lt(field, value) => comparison(model, field, "<", value, binds)?,
        Filter::Lte(field, value) => comparison(model, field, "<=", value, binds)?,
        Filter::In(field, values) => {
            let column = ensure_column(model, field)?;
            if values.is_empty() {
                // Nothing can match an empty set.
                "1 = 0".to_string()
            } else {
                let placeholders: Vec<&str> = values.iter().map(|_| "?").collect();
                binds.extend(values.iter().cloned());
                format!("{} IN ({})", column, placeholders.join(", "))
            }
        }
        Filter::Like(field, pattern) => {
            let column = ensure_column(model, field)?;
            binds.push(FieldValue::Text(pattern.clone()));
            format!("{} LIKE ?", column)
        }
        Filter::IsNull(field) => format!("{} IS NULL", ensure_column(model, field)?),
        Filter::NotNull(field) => format!("{} IS NOT NULL", ensure_column(model, field)?),
        Filter::And(filters) => combine(model, filters, " AND ", binds)?,
        Filter::Or(filters) => combine(model, filters, " OR ", binds)?,
    })
}

fn comparison(
    model: &ModelDef,
    field: &str,
    op: &str,
    value: &FieldValue,
    binds: &mut Vec<FieldValue>,
) -> DbResult<String> {
    let column = ensure_column(model, field)?;
    binds.push(value.clone());
    Ok(format!("{} {} ?", column, op))
}

fn combine(
    model: &ModelDef,
    filters: &[Filter],
    separator: &str,
    binds: &mut Vec<FieldValue>,
) -> DbResult<String> {
    if filters.is_empty() {
        return Ok("1 = 1".to_string());
    }
    let parts = filters
        .iter()
        .map(|filter| render_filter(model, filter, binds))
        .collect::<DbResult<Vec<String>>>()?;
    Ok(format!("({})", parts.join(separator)))
}

/// Build the `WHERE` clause, empty when there is no filter.
pub(crate) fn build_where_clause(
    model: &ModelDef,
    filter: Option<&Filter>,
) -> DbResult<(String, Vec<FieldValue>)> {
    match filter {
        Some(filter) => {
            let mut binds = Vec::new();
            let predicate = render_filter(model, filter, &mut binds)?;
            Ok((format!(" WHERE {}", predicate), binds))
        }
        None => Ok((String::new(), Vec::new())),
    }
}

/// Build the `ORDER BY` clause from validated sort options.
pub(crate) fn build_order_clause(model: &ModelDef, options: &QueryOptions) -> DbResult<String> {
    let Some(field) = options.sort_by.as_deref() else {
        return Ok(String::new());
    };
    let column = ensure_column(model, field)?;
    let order = match options.sort_order.unwrap_or_default() {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    Ok(format!(" ORDER BY {} {}", column, order))
}

/// Build the `LIMIT`/`OFFSET` clause. The limit is always present and
/// capped; the offset is omitted when zero.
pub(crate) fn build_limit_offset_clause(options: &QueryOptions) -> String {
    let mut clause = format!(" LIMIT {}", options.effective_limit());
    let offset = options.effective_offset();
    if offset > 0 {
        clause.push_str(&format!(" OFFSET {}", offset));
    }
    clause
}
