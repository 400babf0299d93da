//! Per-tenant user repository.
//!
//! Every function takes the tenant store pool it should operate on; the
//! caller resolves the pool through the connection manager first. Emails
//! are expected pre-normalized (lowercased, trimmed) by the caller.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use opsly_core::tenant::new_record_id;
use opsly_core::{OpslyError, Role, User};

/// Insert result. A duplicate on (email, tenant_id) is an expected
/// outcome under concurrent auto-provisioning, not an error.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Created,
    DuplicateEmail,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    tenant_id: String,
    tenant_display_name: String,
    role: String,
    active: bool,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> Result<User> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            OpslyError::general_error(format!("Unknown role in store: {}", self.role)).into_anyhow()
        })?;
        Ok(User {
            id: self.id,
            email: self.email,
            tenant_id: self.tenant_id,
            tenant_display_name: self.tenant_display_name,
            role,
            active: self.active,
            last_login: self.last_login,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_USER: &str = "SELECT id, email, tenant_id, tenant_display_name, role, active, \
     last_login, created_at, updated_at FROM users";

/// Build a fresh user record; not yet persisted.
pub fn new_user(email: &str, tenant_id: &str, tenant_display_name: &str, role: Role) -> User {
    let now = Utc::now();
    User {
        id: new_record_id(),
        email: email.to_string(),
        tenant_id: tenant_id.to_string(),
        tenant_display_name: tenant_display_name.to_string(),
        role,
        active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE email = ?"))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    row.map(UserRow::into_user).transpose()
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(UserRow::into_user).transpose()
}

/// Insert a user, reporting a (email, tenant_id) uniqueness violation as
/// [`InsertOutcome::DuplicateEmail`] so racing writers can re-fetch.
pub async fn try_insert(pool: &SqlitePool, user: &User) -> Result<InsertOutcome> {
    let result = sqlx::query(
        "INSERT INTO users (id, email, tenant_id, tenant_display_name, role, active, \
         last_login, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&user.id)
    .bind(&user.email)
    .bind(&user.tenant_id)
    .bind(&user.tenant_display_name)
    .bind(user.role.as_str())
    .bind(user.active)
    .bind(user.last_login)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(InsertOutcome::Created),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Ok(InsertOutcome::DuplicateEmail)
        }
        Err(err) => Err(err.into()),
    }
}

/// Record a successful login.
pub async fn touch_last_login(pool: &SqlitePool, user_id: &str, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = ?, updated_at = ? WHERE id = ?")
        .bind(at)
        .bind(at)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_active(pool: &SqlitePool, user_id: &str, active: bool) -> Result<()> {
    sqlx::query("UPDATE users SET active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}
