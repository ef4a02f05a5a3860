//! Identity extractor for handlers behind the admission middleware

use axum::{extract::FromRequestParts, http::request::Parts, response::Response};

use hearth_core::application::AdmissionRejection;
use hearth_core::domain::auth::Identity;

use crate::presentation::middleware::rejection_response;

/// The identity the admission middleware verified for this request
///
/// Handlers take this instead of re-verifying the token. On a public route
/// there is no identity and extraction fails with `missing_token`.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Identity);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(|| rejection_response(&AdmissionRejection::MissingToken))
    }
}

impl std::ops::Deref for Authenticated {
    type Target = Identity;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
