//! Connection provider and model registration.
//!
//! A [`Provider`] owns the configuration for every logical database and
//! hands out lazily-created, name-keyed connections. Binding a model
//! definition through the provider memoizes the resulting handle, so the
//! same model resolves to the same handle everywhere.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::model::ModelHandle;
use crate::schema::ModelDef;
use crate::store::{Database, MemoryDatabase, SqliteDatabase};

/// Configuration for one logical database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Storage file path; in-memory when absent.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        Self { path: None }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }
}

/// Factory for database connections of one driver.
#[allow(async_fn_in_trait)]
pub trait Backend: Send + Sync + 'static {
    type Db: Database;

    async fn connect(name: &str, config: &DatabaseConfig) -> DbResult<Self::Db>;
}

/// SQLite driver backend.
pub struct SqliteBackend;

impl Backend for SqliteBackend {
    type Db = SqliteDatabase;

    async fn connect(_name: &str, config: &DatabaseConfig) -> DbResult<Self::Db> {
        match &config.path {
            Some(path) => SqliteDatabase::open(path).await,
            None => SqliteDatabase::in_memory().await,
        }
    }
}

/// In-memory document-style backend.
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    type Db = MemoryDatabase;

    async fn connect(_name: &str, _config: &DatabaseConfig) -> DbResult<Self::Db> {
        Ok(MemoryDatabase::new())
    }
}

/// Name-keyed, lazily-connecting database provider.
pub struct Provider<B: Backend> {
    configs: HashMap<String, DatabaseConfig>,
    connections: Mutex<HashMap<String, Arc<B::Db>>>,
    models: Mutex<HashMap<String, ModelHandle<B::Db>>>,
}

impl<B: Backend> Provider<B> {
    pub fn new(configs: HashMap<String, DatabaseConfig>) -> Self {
        Self {
            configs,
            connections: Mutex::new(HashMap::new()),
            models: Mutex::new(HashMap::new()),
        }
    }

    /// Provider with a single configured database.
    pub fn single(name: impl Into<String>, config: DatabaseConfig) -> Self {
        let mut configs = HashMap::new();
        configs.insert(name.into(), config);
        Self::new(configs)
    }

    /// The connection for a logical database, created on first use.
    pub async fn connection(&self, name: &str) -> DbResult<Arc<B::Db>> {
        let mut connections = self.connections.lock().await;
        if let Some(db) = connections.get(name) {
            return Ok(Arc::clone(db));
        }
        let config = self.configs.get(name).ok_or_else(|| DbError::Connection {
            message: format!("no configuration for database '{}'", name),
        })?;
        debug!(database = name, "creating connection");
        let db = Arc::new(B::connect(name, config).await?);
        connections.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Bind a model to its configured database, reusing an existing handle
    /// when the model was bound before.
    pub async fn bind_model(&self, def: ModelDef) -> DbResult<ModelHandle<B::Db>> {
        let mut models = self.models.lock().await;
        if let Some(handle) = models.get(&def.name) {
            return Ok(handle.clone());
        }
        let db = self.connection(&def.database).await?;
        let handle = ModelHandle::bind(def.clone(), db).await?;
        models.insert(def.name, handle.clone());
        Ok(handle)
    }

    /// Close every open connection and forget all bindings.
    pub async fn close_all(&self) {
        let mut models = self.models.lock().await;
        models.clear();
        drop(models);

        let mut connections = self.connections.lock().await;
        for (name, db) in connections.drain() {
            debug!(database = %name, "closing connection");
            db.close().await;
        }
        info!("all database connections closed");
    }
}
