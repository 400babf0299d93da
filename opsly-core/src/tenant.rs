//! Tenant model shared across the workspace.
//!
//! One tenant = one customer company with its own isolated data store.
//! The control store holds one `Tenant` record per company; everything
//! else about a company lives in its isolated store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Control-store record for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    /// Human-chosen, unique.
    pub display_name: String,
    /// Unique across tenants; the admin-login fast path keys on this.
    pub admin_email: String,
    /// bcrypt hash of the tenant administrator's secret.
    #[serde(skip_serializing)]
    pub admin_secret_hash: String,
    /// bcrypt hash of the tenant-wide shared secret used by members.
    #[serde(skip_serializing)]
    pub shared_secret_hash: String,
    /// Derived, unique; names the tenant's isolated store.
    pub storage_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn summary(&self) -> TenantSummary {
        TenantSummary {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            active: self.active,
        }
    }
}

/// The slice of a tenant record handed to clients and token consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub id: String,
    pub display_name: String,
    pub active: bool,
}

/// Registration input for a new tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTenant {
    pub display_name: String,
    pub admin_email: String,
    pub admin_secret: String,
    pub shared_secret: String,
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}
