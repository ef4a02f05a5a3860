//! Tenant domain: identifiers, tiers, partitions and the registry port

pub mod repositories;
pub mod value_objects;

pub use repositories::TenantRegistry;
pub use value_objects::{Partition, TenantId, TenantKey, TenantRecord, TenantTier};
