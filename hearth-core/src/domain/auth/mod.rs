//! Authentication domain: session claims, verified identities and auth errors

pub mod errors;
pub mod value_objects;

pub use errors::AuthError;
pub use value_objects::{Identity, Role, SessionClaims, SubjectId, TokenId};
