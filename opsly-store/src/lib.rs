//! opsly-store: storage-id derivation, the tenant connection manager,
//! the tenant registry and the per-tenant user repository.

pub mod connection;
pub mod registry;
pub mod schema;
pub mod storage_id;
pub mod users;

pub use connection::{ConnectionManager, HealthReport, SqliteConnector, StoreConnector};
pub use registry::{TenantLocator, TenantRegistry};
pub use storage_id::derive_storage_id;
