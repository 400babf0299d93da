use std::sync::Arc;

use anyhow::Result;

use opsly_auth::{CredentialResolver, SessionIssuer};
use opsly_core::AppConfigSnapshot;
use opsly_store::{ConnectionManager, TenantRegistry};

/// Shared handles for every request handler. Cheap to clone; all the
/// long-lived components are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfigSnapshot,
    pub connections: Arc<ConnectionManager>,
    pub registry: Arc<TenantRegistry>,
    pub resolver: Arc<CredentialResolver>,
    pub sessions: Arc<SessionIssuer>,
}

impl AppState {
    pub fn from_config(config: AppConfigSnapshot) -> Result<Self> {
        let connections = Arc::new(ConnectionManager::from_config(&config)?);
        let registry = Arc::new(TenantRegistry::new(connections.clone()));
        let resolver = Arc::new(CredentialResolver::new(
            registry.clone(),
            connections.clone(),
        ));
        let sessions = Arc::new(SessionIssuer::from_config(&config)?);
        Ok(Self {
            config,
            connections,
            registry,
            resolver,
            sessions,
        })
    }

    /// bcrypt cost override, used by tests to keep hashing fast.
    pub fn hash_cost(&self) -> Option<u32> {
        self.config.get_u32("auth.hash_cost")
    }
}
