//! SQLite database connection and pooling.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use futures_util::future::BoxFuture;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use super::sql;
use crate::error::{DbError, DbResult};
use crate::query::{Filter, QueryOptions};
use crate::record::Record;
use crate::schema::{ColumnType, ModelDef};
use crate::store::Database;
use crate::value::{FieldValue, id_key};

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// SQLx-backed SQLite database.
#[derive(Debug)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open a database at the given path, creating the file if missing.
    pub async fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .min_connections(0)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// Pinned to a single pooled connection: every pooled connection would
    /// otherwise get its own private in-memory database.
    pub async fn in_memory() -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// The underlying connection pool, for advanced operations.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run `f` inside a database transaction.
    ///
    /// The callback receives the transaction's connection and issues its
    /// statements directly against the driver. Returns `Ok(true)` when the
    /// transaction committed, `Ok(false)` when the callback failed and the
    /// transaction was rolled back.
    pub async fn run_transaction<F>(&self, f: F) -> DbResult<bool>
    where
        F: for<'c> FnOnce(&'c mut sqlx::SqliteConnection) -> BoxFuture<'c, DbResult<()>> + Send,
    {
        let mut tx = self.pool.begin().await.map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;
        match f(&mut *tx).await {
            Ok(()) => {
                tx.commit().await.map_err(|e| DbError::Database {
                    message: e.to_string(),
                })?;
                Ok(true)
            }
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                tx.rollback().await.map_err(|e| DbError::Database {
                    message: e.to_string(),
                })?;
                Ok(false)
            }
        }
    }
}

fn bind_field<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Null => query.bind(None::<String>),
        FieldValue::Bool(b) => query.bind(*b),
        FieldValue::Int(i) => query.bind(*i),
        FieldValue::Float(f) => query.bind(*f),
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::Json(v) => query.bind(v.to_string()),
    }
}

fn db_err(e: sqlx::Error) -> DbError {
    DbError::Database {
        message: e.to_string(),
    }
}

fn record_from_row(model: &ModelDef, row: &SqliteRow) -> DbResult<Record> {
    let mut fields = BTreeMap::new();

    if let Some(id) = row.try_get::<Option<String>, _>("id").map_err(db_err)? {
        fields.insert("id".to_string(), FieldValue::Text(id));
    }

    for (name, def) in model.attributes.iter() {
        if name == "id" || sql::SYSTEM_COLUMNS.contains(&name.as_str()) {
            continue;
        }
        let column = name.as_str();
        let value = match def.column_type {
            ColumnType::Integer => row
                .try_get::<Option<i64>, _>(column)
                .map_err(db_err)?
                .map(FieldValue::Int),
            ColumnType::Double => row
                .try_get::<Option<f64>, _>(column)
                .map_err(db_err)?
                .map(FieldValue::Float),
            ColumnType::Boolean => row
                .try_get::<Option<bool>, _>(column)
                .map_err(db_err)?
                .map(FieldValue::Bool),
            ColumnType::Id | ColumnType::Text => row
                .try_get::<Option<String>, _>(column)
                .map_err(db_err)?
                .map(FieldValue::Text),
            ColumnType::Json => row
                .try_get::<Option<String>, _>(column)
                .map_err(db_err)?
                .map(|raw| match serde_json::from_str::<serde_json::Value>(&raw) {
                    Ok(parsed) => FieldValue::from_json(parsed),
                    Err(_) => FieldValue::Text(raw),
                }),
        };
        if let Some(value) = value {
            fields.insert(name.clone(), value);
        }
    }

    for column in sql::SYSTEM_COLUMNS {
        if let Some(stamp) = row.try_get::<Option<i64>, _>(column).map_err(db_err)? {
            fields.insert(column.to_string(), FieldValue::Int(stamp));
        }
    }

    Ok(Record::from_fields(fields))
}

impl Database for SqliteDatabase {
    async fn ensure_schema(&self, model: &ModelDef) -> DbResult<()> {
        let ddl = sql::create_table_sql(model);
        debug!(table = %model.table, "ensuring schema");
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::Migration {
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn insert(&self, model: &ModelDef, record: &Record) -> DbResult<()> {
        let columns = sql::column_list(model);
        let placeholders: Vec<&str> = columns.iter().map(|_| "?").collect();
        let statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            model.table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut query = sqlx::query(&statement);
        for column in &columns {
            let value = record.get(column).cloned().unwrap_or(FieldValue::Null);
            query = bind_field(query, &value);
        }

        query.execute(&self.pool).await.map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => DbError::AlreadyExists {
                entity_type: model.name.clone(),
                id: record.id().map(|id| id_key(id)).unwrap_or_default(),
            },
            _ => db_err(e),
        })?;
        Ok(())
    }

    async fn update(
        &self,
        model: &ModelDef,
        id: &FieldValue,
        changes: &BTreeMap<String, FieldValue>,
    ) -> DbResult<u64> {
        // Only columns the schema knows can be persisted; payload-only
        // fields are dropped here, matching the schemaless/relational split.
        let known: Vec<(&String, &FieldValue)> = changes
            .iter()
            .filter(|(field, _)| model.knows_field(field))
            .collect();
        if known.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = known
            .iter()
            .map(|(field, _)| {
                sql::ensure_column(model, field).map(|column| format!("{} = ?", column))
            })
            .collect::<DbResult<_>>()?;
        let statement = format!(
            "UPDATE {} SET {} WHERE id = ?",
            model.table,
            assignments.join(", ")
        );

        let mut query = sqlx::query(&statement);
        for (_, value) in &known {
            query = bind_field(query, value);
        }
        query = bind_field(query, id);

        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn update_where(
        &self,
        model: &ModelDef,
        changes: &BTreeMap<String, FieldValue>,
        filter: Option<&Filter>,
    ) -> DbResult<u64> {
        let known: Vec<(&String, &FieldValue)> = changes
            .iter()
            .filter(|(field, _)| model.knows_field(field))
            .collect();
        if known.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = known
            .iter()
            .map(|(field, _)| {
                sql::ensure_column(model, field).map(|column| format!("{} = ?", column))
            })
            .collect::<DbResult<_>>()?;
        let (where_clause, binds) = sql::build_where_clause(model, filter)?;
        let statement = format!(
            "UPDATE {} SET {}{}",
            model.table,
            assignments.join(", "),
            where_clause
        );

        let mut query = sqlx::query(&statement);
        for (_, value) in &known {
            query = bind_field(query, value);
        }
        for value in &binds {
            query = bind_field(query, value);
        }

        let result = query.execute(&self.pool).await.map_err(db_err)?;
        Ok(result.rows_affected())
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
        let (where_clause, binds) = sql::build_where_clause(model, options.filter.as_ref())?;
        let order_clause = sql::build_order_clause(model, options)?;
        let limit_clause = sql::build_limit_offset_clause(options);
        let statement = format!(
            "SELECT {} FROM {}{}{}{}",
            sql::column_list(model).join(", "),
            model.table,
            where_clause,
            order_clause,
            limit_clause
        );

        let mut query = sqlx::query(&statement);
        for value in &binds {
            query = bind_field(query, value);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(|row| record_from_row(model, row)).collect()
    }

    async fn count(&self, model: &ModelDef, options: &QueryOptions) -> DbResult<u64> {
        let (where_clause, binds) = sql::build_where_clause(model, options.filter.as_ref())?;
        let statement = format!("SELECT COUNT(*) FROM {}{}", model.table, where_clause);

        let mut query = sqlx::query(&statement);
        for value in &binds {
            query = bind_field(query, value);
        }

        let row = query.fetch_one(&self.pool).await.map_err(db_err)?;
        let total: i64 = row.try_get(0).map_err(db_err)?;
        Ok(total as u64)
    }

    async fn delete(&self, model: &ModelDef, id: &FieldValue) -> DbResult<u64> {
        let statement = format!("DELETE FROM {} WHERE id = ?", model.table);
        let result = bind_field(sqlx::query(&statement), id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
