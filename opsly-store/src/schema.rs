//! Store schemas and migration.
//!
//! Both the control store and every tenant store are migrated with
//! idempotent `CREATE TABLE IF NOT EXISTS` statements the first time a
//! pool is established. There is no versioned migration history; the
//! schemas here are the whole contract.

use anyhow::Result;
use sqlx::SqlitePool;

/// Control store: one row per registered tenant.
pub const CONTROL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tenants (
    id                 TEXT PRIMARY KEY,
    display_name       TEXT NOT NULL UNIQUE,
    admin_email        TEXT NOT NULL UNIQUE,
    admin_secret_hash  TEXT NOT NULL,
    shared_secret_hash TEXT NOT NULL,
    storage_id         TEXT NOT NULL UNIQUE,
    active             INTEGER NOT NULL DEFAULT 1,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tenants_admin_email ON tenants (admin_email);
"#;

/// Tenant store: members of one tenant plus the seed tables every fresh
/// tenant starts with. (email, tenant_id) is the compound uniqueness the
/// auto-provisioning race resolves against.
pub const TENANT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id                  TEXT PRIMARY KEY,
    email               TEXT NOT NULL,
    tenant_id           TEXT NOT NULL,
    tenant_display_name TEXT NOT NULL,
    role                TEXT NOT NULL,
    active              INTEGER NOT NULL DEFAULT 1,
    last_login          TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE (email, tenant_id)
);

CREATE TABLE IF NOT EXISTS roles (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS offices (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
"#;

/// Apply a schema to a freshly opened pool. Safe to run repeatedly.
pub async fn migrate(pool: &SqlitePool, schema: &str) -> Result<()> {
    sqlx::raw_sql(schema).execute(pool).await?;
    Ok(())
}
