//! Maps a verified identity to the partition that namespaces its counters

use std::sync::Arc;

use crate::domain::auth::{AuthError, Identity};
use crate::domain::tenant::{TenantKey, TenantRegistry};

/// Resolves the tenant claim of an identity against the active registry
#[derive(Clone)]
pub struct TenantResolver {
    registry: Arc<dyn TenantRegistry>,
}

impl TenantResolver {
    pub fn new(registry: Arc<dyn TenantRegistry>) -> Self {
        Self { registry }
    }

    /// Empty or unregistered tenants are rejected; there is no shared fallback bucket
    pub fn resolve(&self, identity: &Identity) -> Result<TenantKey, AuthError> {
        let unknown = || AuthError::UnknownTenant {
            tenant: identity.tenant.to_string(),
        };

        if identity.tenant.is_empty() {
            return Err(unknown());
        }

        self.registry
            .lookup(&identity.tenant)
            .map(TenantKey::for_tenant)
            .ok_or_else(unknown)
    }
}
