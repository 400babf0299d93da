//! # Tenant Connection Manager
//!
//! Owns every store connection in the process: the singleton control
//! store pool and one cached pool per tenant, keyed by derived storage
//! id. No other component constructs pools. The manager is an explicit,
//! injectable object so tests can build isolated instances.
//!
//! Concurrency: the cache is read-mostly behind an async `RwLock`. Two
//! callers racing on the same cold key may both connect; the last writer
//! wins the cache slot and the loser's pool is dropped when its handle
//! goes out of scope. Failures are never cached, so the next call
//! retries from scratch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use opsly_core::{AppConfigSnapshot, OpslyError};

use crate::schema;
use crate::storage_id::derive_storage_id;

/// File name of the shared control store under the base directory.
pub const CONTROL_STORE_FILE: &str = "opsly_control.db";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Upper bound on a full shutdown drain.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The seam between the manager and the actual connect call. Production
/// uses [`SqliteConnector`]; tests wrap it to count or fail connects.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, path: &Path) -> Result<SqlitePool>;
}

/// Pooled SQLite connector with bounded establishment and idle timeouts.
pub struct SqliteConnector {
    connect_timeout: Duration,
    idle_timeout: Duration,
    max_connections: u32,
}

impl SqliteConnector {
    pub fn new(connect_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            idle_timeout,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Default for SqliteConnector {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        )
    }
}

#[async_trait]
impl StoreConnector for SqliteConnector {
    async fn connect(&self, path: &Path) -> Result<SqlitePool> {
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(self.connect_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(Some(self.idle_timeout))
            .connect_with(opts)
            .await?;

        Ok(pool)
    }
}

/// Liveness + cache report, served by the health endpoint. Building it
/// never mutates the cache.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub control: bool,
    pub tenants: Vec<String>,
}

pub struct ConnectionManager {
    base_dir: PathBuf,
    connector: Arc<dyn StoreConnector>,
    control: RwLock<Option<SqlitePool>>,
    tenants: RwLock<HashMap<String, SqlitePool>>,
}

impl ConnectionManager {
    /// Build from configuration. `store.base_url` is the directory all
    /// store files live under; it is created if missing.
    pub fn from_config(config: &AppConfigSnapshot) -> Result<Self> {
        let base_dir = PathBuf::from(config.require("store.base_url")?);
        let connect_timeout = Duration::from_secs(
            config
                .get_u64("store.connect_timeout_secs")
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        );
        let idle_timeout = Duration::from_secs(
            config
                .get_u64("store.idle_timeout_secs")
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
        );
        Ok(Self::with_connector(
            base_dir,
            Arc::new(SqliteConnector::new(connect_timeout, idle_timeout)),
        ))
    }

    pub fn with_connector(base_dir: PathBuf, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            base_dir,
            connector,
            control: RwLock::new(None),
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn store_path(&self, file: &str) -> PathBuf {
        self.base_dir.join(file)
    }

    async fn connect_store(&self, storage_id: &str, file: &str, schema_sql: &str) -> Result<SqlitePool> {
        std::fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("creating store directory {}", self.base_dir.display()))?;
        let pool = self
            .connector
            .connect(&self.store_path(file))
            .await
            .map_err(|err| {
                tracing::warn!(storage_id, error = %err, "store connection failed");
                OpslyError::connection_failure().with_source(err).into_anyhow()
            })?;
        schema::migrate(&pool, schema_sql).await?;
        Ok(pool)
    }

    /// The process-wide control store pool. Re-established when the
    /// cached pool fails its liveness probe.
    pub async fn control_pool(&self) -> Result<SqlitePool> {
        {
            let guard = self.control.read().await;
            if let Some(pool) = guard.as_ref() {
                if !pool.is_closed() && sqlx::query("SELECT 1").execute(pool).await.is_ok() {
                    return Ok(pool.clone());
                }
            }
        }

        let pool = self
            .connect_store("control", CONTROL_STORE_FILE, schema::CONTROL_SCHEMA)
            .await?;
        *self.control.write().await = Some(pool.clone());
        Ok(pool)
    }

    /// Pool for a tenant's isolated store, by display name.
    pub async fn tenant_pool(&self, display_name: &str) -> Result<SqlitePool> {
        self.tenant_pool_by_storage_id(&derive_storage_id(display_name))
            .await
    }

    /// Pool for a tenant's isolated store, by already-derived storage id.
    /// Cache hit returns without I/O; a miss connects, migrates and
    /// caches. Connection failure is surfaced, never cached.
    pub async fn tenant_pool_by_storage_id(&self, storage_id: &str) -> Result<SqlitePool> {
        {
            let guard = self.tenants.read().await;
            if let Some(pool) = guard.get(storage_id) {
                if !pool.is_closed() {
                    return Ok(pool.clone());
                }
            }
        }

        let pool = self
            .connect_store(storage_id, storage_id, schema::TENANT_SCHEMA)
            .await?;

        // Last writer wins on a racing miss.
        self.tenants
            .write()
            .await
            .insert(storage_id.to_string(), pool.clone());
        Ok(pool)
    }

    /// Close and evict one tenant's cached pool. No-op when absent.
    pub async fn close_tenant(&self, display_name: &str) {
        let storage_id = derive_storage_id(display_name);
        let evicted = self.tenants.write().await.remove(&storage_id);
        if let Some(pool) = evicted {
            pool.close().await;
            tracing::info!(storage_id, "tenant store connection closed");
        }
    }

    /// Shutdown drain: close every cached tenant pool and the control
    /// pool, waiting for all of them, then leave the cache empty.
    pub async fn close_all(&self) -> Result<()> {
        let mut pools: Vec<SqlitePool> = self
            .tenants
            .write()
            .await
            .drain()
            .map(|(_, pool)| pool)
            .collect();
        if let Some(control) = self.control.write().await.take() {
            pools.push(control);
        }

        let drain = futures::future::join_all(pools.iter().map(|pool| pool.close()));
        tokio::time::timeout(DRAIN_TIMEOUT, drain)
            .await
            .map_err(|_| OpslyError::timeout("Connection drain timed out").into_anyhow())?;
        Ok(())
    }

    /// Report liveness of the control pool and the set of cached tenant
    /// storage ids, without establishing or evicting anything.
    pub async fn health_check(&self) -> HealthReport {
        let control = {
            let guard = self.control.read().await;
            match guard.as_ref() {
                Some(pool) if !pool.is_closed() => {
                    sqlx::query("SELECT 1").execute(pool).await.is_ok()
                }
                _ => false,
            }
        };

        let mut tenants: Vec<String> = self.tenants.read().await.keys().cloned().collect();
        tenants.sort();

        HealthReport { control, tenants }
    }
}
