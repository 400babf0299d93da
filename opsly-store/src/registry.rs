//! # Tenant Registry
//!
//! Control-store access: registering tenants, looking them up for login
//! and gate re-validation, and flipping the active flag. The O(n) login
//! scan sits behind the [`TenantLocator`] trait so the credential
//! resolver never touches SQL and an index can replace the scan later
//! without changing its contract.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use opsly_core::tenant::new_record_id;
use opsly_core::{NewTenant, OpslyError, Role, Tenant};

use crate::connection::ConnectionManager;
use crate::storage_id::derive_storage_id;
use crate::users;

/// Read seam used by the credential resolver.
///
/// `active_tenants` enumerates in tenant creation order. That order is
/// the documented tie-break when two tenants chose the same shared
/// secret: the earliest-registered match wins.
#[async_trait]
pub trait TenantLocator: Send + Sync {
    async fn find_by_admin_email(&self, email: &str) -> Result<Option<Tenant>>;
    async fn active_tenants(&self) -> Result<Vec<Tenant>>;
}

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: String,
    display_name: String,
    admin_email: String,
    admin_secret_hash: String,
    shared_secret_hash: String,
    storage_id: String,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            display_name: row.display_name,
            admin_email: row.admin_email,
            admin_secret_hash: row.admin_secret_hash,
            shared_secret_hash: row.shared_secret_hash,
            storage_id: row.storage_id,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const SELECT_TENANT: &str = "SELECT id, display_name, admin_email, admin_secret_hash, \
     shared_secret_hash, storage_id, active, created_at, updated_at FROM tenants";

pub struct TenantRegistry {
    connections: Arc<ConnectionManager>,
}

impl TenantRegistry {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self { connections }
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    async fn control(&self) -> Result<SqlitePool> {
        self.connections.control_pool().await
    }

    /// Register a tenant: insert the control record, then create and
    /// seed its isolated store (admin user, default role, default
    /// office). Secrets arrive pre-hashed; the registry never sees
    /// plaintext.
    ///
    /// Collisions on display name, admin email or the derived storage
    /// id are re-checked before insert and reported as Conflict; the
    /// uniqueness constraints catch the remaining race window.
    pub async fn register(
        &self,
        input: &NewTenant,
        admin_secret_hash: String,
        shared_secret_hash: String,
    ) -> Result<Tenant> {
        let display_name = input.display_name.trim();
        let admin_email = input.admin_email.trim().to_lowercase();
        if display_name.is_empty() {
            return Err(OpslyError::bad_request("displayName is required").into_anyhow());
        }
        if admin_email.is_empty() || !admin_email.contains('@') {
            return Err(OpslyError::bad_request("adminEmail is required").into_anyhow());
        }

        let storage_id = derive_storage_id(display_name);
        let pool = self.control().await?;

        let clash = sqlx::query_as::<_, TenantRow>(&format!(
            "{SELECT_TENANT} WHERE display_name = ? OR admin_email = ? OR storage_id = ? LIMIT 1"
        ))
        .bind(display_name)
        .bind(&admin_email)
        .bind(&storage_id)
        .fetch_optional(&pool)
        .await?;

        if let Some(existing) = clash {
            let message = if existing.display_name == display_name {
                "Display name already registered"
            } else if existing.admin_email == admin_email {
                "Admin email already registered"
            } else {
                "Display name conflicts with an existing tenant store"
            };
            return Err(OpslyError::conflict(message).into_anyhow());
        }

        let now = Utc::now();
        let tenant = Tenant {
            id: new_record_id(),
            display_name: display_name.to_string(),
            admin_email: admin_email.clone(),
            admin_secret_hash,
            shared_secret_hash,
            storage_id: storage_id.clone(),
            active: true,
            created_at: now,
            updated_at: now,
        };

        let inserted = sqlx::query(
            "INSERT INTO tenants (id, display_name, admin_email, admin_secret_hash, \
             shared_secret_hash, storage_id, active, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&tenant.id)
        .bind(&tenant.display_name)
        .bind(&tenant.admin_email)
        .bind(&tenant.admin_secret_hash)
        .bind(&tenant.shared_secret_hash)
        .bind(&tenant.storage_id)
        .bind(tenant.active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&pool)
        .await;

        if let Err(err) = inserted {
            if let sqlx::Error::Database(db) = &err {
                if db.is_unique_violation() {
                    return Err(OpslyError::conflict("Tenant already registered").into_anyhow());
                }
            }
            return Err(err.into());
        }

        // The control row is already committed; if the fresh store
        // cannot be connected and seeded, roll the row back so a retry
        // starts clean instead of hitting the duplicate pre-check with
        // a half-provisioned tenant.
        if let Err(err) = self.seed_tenant_store(&tenant).await {
            if let Err(cleanup) = sqlx::query("DELETE FROM tenants WHERE id = ?")
                .bind(&tenant.id)
                .execute(&pool)
                .await
            {
                tracing::error!(
                    tenant_id = %tenant.id,
                    error = %cleanup,
                    "failed to roll back tenant record after seed failure"
                );
            }
            return Err(err);
        }
        tracing::info!(
            tenant_id = %tenant.id,
            storage_id = %tenant.storage_id,
            "tenant registered"
        );
        Ok(tenant)
    }

    async fn seed_tenant_store(&self, tenant: &Tenant) -> Result<()> {
        let pool = self
            .connections
            .tenant_pool_by_storage_id(&tenant.storage_id)
            .await?;

        let admin = users::new_user(
            &tenant.admin_email,
            &tenant.id,
            &tenant.display_name,
            Role::Admin,
        );
        users::try_insert(&pool, &admin).await?;

        let now = Utc::now();
        sqlx::query("INSERT OR IGNORE INTO roles (id, name, created_at) VALUES (?, ?, ?)")
            .bind(new_record_id())
            .bind(Role::User.as_str())
            .bind(now)
            .execute(&pool)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO offices (id, name, created_at) VALUES (?, ?, ?)")
            .bind(new_record_id())
            .bind("Head Office")
            .bind(now)
            .execute(&pool)
            .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>> {
        let pool = self.control().await?;
        let row = sqlx::query_as::<_, TenantRow>(&format!("{SELECT_TENANT} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&pool)
            .await?;
        Ok(row.map(Tenant::from))
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let pool = self.control().await?;
        sqlx::query("UPDATE tenants SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&pool)
            .await?;
        Ok(())
    }

    /// Tenant offboarding: deactivate the control record and close the
    /// cached store connection. The store file itself is kept.
    pub async fn offboard(&self, id: &str) -> Result<()> {
        let tenant = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| OpslyError::not_found("No such tenant").into_anyhow())?;
        self.set_active(id, false).await?;
        self.connections.close_tenant(&tenant.display_name).await;
        Ok(())
    }
}

#[async_trait]
impl TenantLocator for TenantRegistry {
    async fn find_by_admin_email(&self, email: &str) -> Result<Option<Tenant>> {
        let pool = self.control().await?;
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "{SELECT_TENANT} WHERE admin_email = ? AND active = 1"
        ))
        .bind(email)
        .fetch_optional(&pool)
        .await?;
        Ok(row.map(Tenant::from))
    }

    async fn active_tenants(&self) -> Result<Vec<Tenant>> {
        let pool = self.control().await?;
        let rows = sqlx::query_as::<_, TenantRow>(&format!(
            "{SELECT_TENANT} WHERE active = 1 ORDER BY created_at, id"
        ))
        .fetch_all(&pool)
        .await?;
        Ok(rows.into_iter().map(Tenant::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};

    use opsly_core::ErrorKind;

    use crate::connection::SqliteConnector;

    use super::*;

    fn test_registry() -> TenantRegistry {
        let base =
            std::env::temp_dir().join(format!("opsly-registry-test-{}", uuid::Uuid::new_v4()));
        let manager = ConnectionManager::with_connector(
            PathBuf::from(base),
            Arc::new(SqliteConnector::default()),
        );
        TenantRegistry::new(Arc::new(manager))
    }

    fn acme() -> NewTenant {
        NewTenant {
            display_name: "Acme Corp".to_string(),
            admin_email: "A@Acme.com".to_string(),
            admin_secret: "Sup3rSecret!".to_string(),
            shared_secret: "Gen3ral1".to_string(),
        }
    }

    #[tokio::test]
    async fn register_creates_tenant_and_seeds_admin() {
        let registry = test_registry();
        let tenant = registry
            .register(&acme(), "ahash".into(), "shash".into())
            .await
            .unwrap();

        assert_eq!(tenant.storage_id, "acme_corp_db");
        assert_eq!(tenant.admin_email, "a@acme.com");
        assert!(tenant.active);

        let pool = registry
            .connections()
            .tenant_pool_by_storage_id(&tenant.storage_id)
            .await
            .unwrap();
        let admin = users::find_by_email(&pool, "a@acme.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.tenant_id, tenant.id);

        let roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles")
            .fetch_one(&pool)
            .await
            .unwrap();
        let offices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(roles, 1);
        assert_eq!(offices, 1);
    }

    #[tokio::test]
    async fn duplicate_display_name_is_a_conflict() {
        let registry = test_registry();
        registry
            .register(&acme(), "h1".into(), "h2".into())
            .await
            .unwrap();

        let mut again = acme();
        again.admin_email = "other@acme.com".to_string();
        let err = registry
            .register(&again, "h1".into(), "h2".into())
            .await
            .unwrap_err();
        let err = OpslyError::normalize(err);
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.message, "Display name already registered");
    }

    #[tokio::test]
    async fn colliding_storage_ids_are_rejected() {
        let registry = test_registry();
        registry
            .register(&acme(), "h1".into(), "h2".into())
            .await
            .unwrap();

        // Normalizes to the same storage id as "Acme Corp".
        let clash = NewTenant {
            display_name: "Acme-Corp".to_string(),
            admin_email: "boss@acme-corp.com".to_string(),
            admin_secret: "s".to_string(),
            shared_secret: "s".to_string(),
        };
        let err = registry
            .register(&clash, "h1".into(), "h2".into())
            .await
            .unwrap_err();
        let err = OpslyError::normalize(err);
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.message, "Display name conflicts with an existing tenant store");
    }

    struct FailTenantStoreOnce {
        inner: SqliteConnector,
        tripped: AtomicBool,
    }

    #[async_trait]
    impl crate::connection::StoreConnector for FailTenantStoreOnce {
        async fn connect(&self, path: &std::path::Path) -> Result<SqlitePool> {
            let is_control = path.ends_with(crate::connection::CONTROL_STORE_FILE);
            if !is_control && !self.tripped.swap(true, Ordering::SeqCst) {
                anyhow::bail!("simulated connect failure");
            }
            self.inner.connect(path).await
        }
    }

    #[tokio::test]
    async fn seed_failure_rolls_back_the_control_record() {
        let base =
            std::env::temp_dir().join(format!("opsly-registry-test-{}", uuid::Uuid::new_v4()));
        let manager = ConnectionManager::with_connector(
            base,
            Arc::new(FailTenantStoreOnce {
                inner: SqliteConnector::default(),
                tripped: AtomicBool::new(false),
            }),
        );
        let registry = TenantRegistry::new(Arc::new(manager));

        let err = registry
            .register(&acme(), "h1".into(), "h2".into())
            .await
            .unwrap_err();
        assert_eq!(OpslyError::normalize(err).kind, ErrorKind::GeneralError);

        // The failed attempt left nothing behind, so the retry passes
        // the duplicate pre-check and provisions the store fully.
        let tenant = registry
            .register(&acme(), "h1".into(), "h2".into())
            .await
            .unwrap();
        assert_eq!(tenant.storage_id, "acme_corp_db");

        let pool = registry
            .connections()
            .tenant_pool_by_storage_id(&tenant.storage_id)
            .await
            .unwrap();
        assert!(users::find_by_email(&pool, "a@acme.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn offboard_deactivates_and_evicts_the_store_connection() {
        let registry = test_registry();
        let tenant = registry
            .register(&acme(), "h1".into(), "h2".into())
            .await
            .unwrap();
        let pool = registry
            .connections()
            .tenant_pool_by_storage_id(&tenant.storage_id)
            .await
            .unwrap();

        registry.offboard(&tenant.id).await.unwrap();

        let reloaded = registry.find_by_id(&tenant.id).await.unwrap().unwrap();
        assert!(!reloaded.active);
        assert!(pool.is_closed());
        let report = registry.connections().health_check().await;
        assert!(report.tenants.is_empty());
    }

    #[tokio::test]
    async fn locator_respects_active_flag_and_creation_order() {
        let registry = test_registry();
        let first = registry
            .register(&acme(), "h1".into(), "h2".into())
            .await
            .unwrap();
        let second = registry
            .register(
                &NewTenant {
                    display_name: "Beta LLC".to_string(),
                    admin_email: "b@beta.com".to_string(),
                    admin_secret: "s".to_string(),
                    shared_secret: "s".to_string(),
                },
                "h1".into(),
                "h2".into(),
            )
            .await
            .unwrap();

        let active = registry.active_tenants().await.unwrap();
        assert_eq!(
            active.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
            vec![first.id.as_str(), second.id.as_str()]
        );

        registry.set_active(&first.id, false).await.unwrap();
        assert!(registry
            .find_by_admin_email("a@acme.com")
            .await
            .unwrap()
            .is_none());
        let active = registry.active_tenants().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);
    }
}
