//! Hearth Core - request admission for the Hearth household API
//!
//! Every inbound request is authenticated with a signed session token,
//! resolved to its tenant (household), and counted against that tenant's
//! quota before it reaches a handler.
//!
//! # Modules
//!
//! - [`config`]: Strongly-typed configuration with TOML and environment variable support
//! - [`domain`]: Identity, claims, tenant and error types
//! - [`application`]: The admission pipeline and its rejection taxonomy
//! - [`infrastructure`]: Token codec, revocation lists, tenant registry, rate limiter and stores
//! - [`logging`]: Structured logging with tracing
//!
//! # Configuration
//!
//! ```rust,ignore
//! use hearth_core::Config;
//!
//! let config = Config::load()?;
//! ```
//!
//! Environment variables use the `HEARTH__` prefix with double underscore separators:
//!
//! ```bash
//! HEARTH__SERVER__PORT=3000
//! HEARTH__RATE_LIMIT__STORAGE_BACKEND=redis
//! HEARTH__RATE_LIMIT__FAILURE_POLICY=fail_closed
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod logging;

pub use config::Config;
pub use logging::init_tracing;
