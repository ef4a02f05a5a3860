//! Tenant registry port

use super::value_objects::{TenantId, TenantRecord};

/// Registry of active tenants
///
/// Implemented outside the admission layer (household service, config file).
/// Lookups are expected to be served from memory; the admission path calls
/// this once per authenticated request.
pub trait TenantRegistry: Send + Sync {
    /// Look up an active tenant. `None` means the tenant is unknown or disabled.
    fn lookup(&self, id: &TenantId) -> Option<TenantRecord>;
}
