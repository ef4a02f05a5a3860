//! Gateway presentation layer

pub mod auth;
pub mod controllers;
pub mod middleware;
pub mod models;
pub mod routes;

pub use auth::Authenticated;
pub use middleware::{
    AdmissionState, admission_middleware, extract_source_addr, logging_middleware,
    rejection_response,
};
pub use models::*;
pub use routes::{RouteClassifier, RouteDisposition, create_router};
