//! Hearth - request-admission gateway
//!
//! Wires `hearth-core` (token codec, tenant resolution, rate limiting) into the
//! `hearth-gateway` router.

mod app;

pub use app::{AppHandle, create_app, create_app_with_clock};
pub use hearth_core::{Config, init_tracing};

pub use hearth_core;
pub use hearth_gateway;
