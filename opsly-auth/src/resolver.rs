//! # Credential Resolver
//!
//! Maps `(email, password)` to `(tenant, user, role)` with no tenant
//! hint in the request. Ordered algorithm, first match wins:
//!
//! 1. A tenant whose admin email equals the normalized email: verify
//!    against its admin secret hash. Match resolves as admin.
//! 2. Scan active tenants in creation order, verifying against each
//!    shared secret hash. A tenant whose secret matches AND already
//!    holds an active user with this email resolves immediately.
//! 3. Otherwise fall back to the first tenant whose shared secret
//!    matched and auto-provision a `user`-role record there.
//! 4. Nothing matched: one opaque InvalidCredentials error.
//!
//! Steps 2/3 cost O(active tenants) bcrypt verifications per miss.
//! That is the price of hint-free login and a timing side channel on
//! tenant count; an index would go behind `TenantLocator`, which is
//! the only view of the registry this module has.
//!
//! Concurrent shared-secret logins for the same fresh email may both
//! reach step 3; the (email, tenant_id) uniqueness constraint makes the
//! loser's insert report a duplicate, which is handled by re-fetching
//! the winner's record.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;

use opsly_core::{OpslyError, Role, Tenant, User};
use opsly_store::users::{self, InsertOutcome};
use opsly_store::{ConnectionManager, TenantLocator};

use crate::secrets;

/// Which branch of the login algorithm fired. Callers and tests assert
/// on this instead of inferring it from side effects.
#[derive(Debug)]
pub enum LoginOutcome {
    AdminMatch { tenant: Tenant, user: User },
    ExistingUserMatch { tenant: Tenant, user: User },
    AutoProvisioned { tenant: Tenant, user: User },
}

impl LoginOutcome {
    pub fn tenant(&self) -> &Tenant {
        match self {
            LoginOutcome::AdminMatch { tenant, .. }
            | LoginOutcome::ExistingUserMatch { tenant, .. }
            | LoginOutcome::AutoProvisioned { tenant, .. } => tenant,
        }
    }

    pub fn user(&self) -> &User {
        match self {
            LoginOutcome::AdminMatch { user, .. }
            | LoginOutcome::ExistingUserMatch { user, .. }
            | LoginOutcome::AutoProvisioned { user, .. } => user,
        }
    }
}

pub struct CredentialResolver {
    locator: Arc<dyn TenantLocator>,
    connections: Arc<ConnectionManager>,
}

impl CredentialResolver {
    pub fn new(locator: Arc<dyn TenantLocator>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            locator,
            connections,
        }
    }

    pub async fn resolve(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || password.is_empty() {
            return Err(OpslyError::invalid_credentials().into_anyhow());
        }

        if let Some(tenant) = self.locator.find_by_admin_email(&email).await? {
            if secrets::verify_secret(password, &tenant.admin_secret_hash) {
                return self.resolve_admin(tenant, &email).await;
            }
            // Wrong admin secret falls through to the shared-secret scan.
        }

        let tenants = self.locator.active_tenants().await?;
        let mut provision_in: Option<&Tenant> = None;

        for tenant in &tenants {
            if !secrets::verify_secret(password, &tenant.shared_secret_hash) {
                continue;
            }
            let pool = self
                .connections
                .tenant_pool_by_storage_id(&tenant.storage_id)
                .await?;
            match users::find_by_email(&pool, &email).await? {
                Some(user) if user.active => {
                    let user = self.record_login(&pool, user).await?;
                    return Ok(LoginOutcome::ExistingUserMatch {
                        tenant: tenant.clone(),
                        user,
                    });
                }
                // A deactivated record blocks this tenant entirely: no
                // match here, and no re-provisioning over it.
                Some(_) => continue,
                None => {
                    if provision_in.is_none() {
                        provision_in = Some(tenant);
                    }
                }
            }
        }

        if let Some(tenant) = provision_in {
            let pool = self
                .connections
                .tenant_pool_by_storage_id(&tenant.storage_id)
                .await?;
            let user = self.provision(&pool, &email, tenant, Role::User).await?;
            let user = self.record_login(&pool, user).await?;
            tracing::info!(tenant_id = %tenant.id, "user auto-provisioned on first login");
            return Ok(LoginOutcome::AutoProvisioned {
                tenant: tenant.clone(),
                user,
            });
        }

        Err(OpslyError::invalid_credentials().into_anyhow())
    }

    async fn resolve_admin(&self, tenant: Tenant, email: &str) -> Result<LoginOutcome> {
        let pool = self
            .connections
            .tenant_pool_by_storage_id(&tenant.storage_id)
            .await?;
        let user = match users::find_by_email(&pool, email).await? {
            Some(user) if user.active => user,
            Some(_) => return Err(OpslyError::invalid_credentials().into_anyhow()),
            // Registration seeds the admin record; restore it if the
            // tenant store predates that or was rebuilt.
            None => self.provision(&pool, email, &tenant, Role::Admin).await?,
        };
        let user = self.record_login(&pool, user).await?;
        Ok(LoginOutcome::AdminMatch { tenant, user })
    }

    async fn provision(
        &self,
        pool: &sqlx::SqlitePool,
        email: &str,
        tenant: &Tenant,
        role: Role,
    ) -> Result<User> {
        let user = users::new_user(email, &tenant.id, &tenant.display_name, role);
        match users::try_insert(pool, &user).await? {
            InsertOutcome::Created => Ok(user),
            // Lost the race; the concurrent writer's record wins.
            InsertOutcome::DuplicateEmail => users::find_by_email(pool, email)
                .await?
                .ok_or_else(|| {
                    OpslyError::general_error("User record missing after duplicate insert")
                        .into_anyhow()
                }),
        }
    }

    async fn record_login(&self, pool: &sqlx::SqlitePool, mut user: User) -> Result<User> {
        let now = Utc::now();
        users::touch_last_login(pool, &user.id, now).await?;
        user.last_login = Some(now);
        user.updated_at = now;
        Ok(user)
    }
}
