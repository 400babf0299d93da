//! opsly-core: shared errors, configuration and domain model for the
//! Opsly back-office service.

pub mod config;
pub mod errors;
pub mod identity;
pub mod tenant;
pub mod user;

pub use config::{AppConfig, AppConfigSnapshot};
pub use errors::{ErrorKind, OpslyError, OpslyResult};
pub use identity::Identity;
pub use tenant::{NewTenant, Tenant, TenantSummary};
pub use user::{Role, User};
