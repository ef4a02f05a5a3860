//! Domain Layer - identities, tenants and their invariants
//!
//! Nothing in here performs I/O. Ports that infrastructure implements
//! (such as [`tenant::TenantRegistry`]) are declared next to the types they serve.

pub mod auth;
pub mod tenant;

pub use auth::{AuthError, Identity, Role, SessionClaims, SubjectId, TokenId};
pub use tenant::{Partition, TenantId, TenantKey, TenantRecord, TenantRegistry, TenantTier};
