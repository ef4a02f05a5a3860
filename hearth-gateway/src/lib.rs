//! Hearth Gateway - axum admission layer for the Hearth household API
//!
//! Every request passes through [`presentation::admission_middleware`], which
//! runs the `hearth-core` admission pipeline (token verification, tenant
//! resolution, rate limiting) before any handler sees it.
//!
//! # Architecture
//!
//! ```text
//! hearth-gateway/
//! └── presentation/
//!     ├── auth/          # Authenticated extractor
//!     ├── controllers.rs # health, whoami, logout
//!     ├── middleware.rs  # admission, request logging
//!     ├── models.rs      # response bodies
//!     └── routes.rs      # route classification and router
//! ```
//!
//! # Responses
//!
//! | Rejection | Status | Extra headers |
//! |-----------|--------|---------------|
//! | `missing_token`, `invalid_token`, `expired_token`, `revoked_token` | 401 | `WWW-Authenticate` |
//! | `unknown_tenant` | 403 | |
//! | `rate_limited` | 429 | `Retry-After`, `RateLimit-*` |
//! | `store_unavailable` | 503 | |

pub mod presentation;

pub use presentation::{AdmissionState, Authenticated, RouteClassifier, create_router};
