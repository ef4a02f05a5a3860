//! Tenant registry and resolver

pub mod registry;
pub mod resolver;

pub use registry::ConfiguredTenantRegistry;
pub use resolver::TenantResolver;
