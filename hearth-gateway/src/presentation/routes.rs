//! Route definitions and route classification

use axum::http::Method;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;

use hearth_core::config::RouteConfig;
use hearth_core::infrastructure::rate_limiter::RouteClass;

use crate::presentation::controllers::{health_check, logout, whoami};
use crate::presentation::middleware::{AdmissionState, admission_middleware, logging_middleware};

/// How a request is treated by admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDisposition {
    pub class: RouteClass,
    /// Skip token verification and use the anonymous bucket
    pub public: bool,
}

#[derive(Debug, Clone)]
struct RouteRule {
    path_prefix: String,
    /// Empty matches every method
    methods: Vec<Method>,
    class: RouteClass,
}

/// Maps (method, path) to a route class, and flags public paths
#[derive(Debug, Clone)]
pub struct RouteClassifier {
    public_paths: Vec<String>,
    rules: Vec<RouteRule>,
    default_read: RouteClass,
    default_write: RouteClass,
}

impl RouteClassifier {
    pub fn from_config(config: &RouteConfig) -> Self {
        let rules = config
            .rules
            .iter()
            .map(|rule| RouteRule {
                path_prefix: rule.path_prefix.clone(),
                methods: rule
                    .methods
                    .iter()
                    .filter_map(|m| match Method::from_bytes(m.to_ascii_uppercase().as_bytes()) {
                        Ok(method) => Some(method),
                        Err(_) => {
                            tracing::warn!(method = %m, prefix = %rule.path_prefix, "Ignoring invalid method in route rule");
                            None
                        }
                    })
                    .collect(),
                class: RouteClass::new(rule.route_class.trim()),
            })
            .collect();

        Self {
            public_paths: config.public_paths.clone(),
            rules,
            default_read: RouteClass::new(config.default_read_class.as_str()),
            default_write: RouteClass::new(config.default_write_class.as_str()),
        }
    }

    pub fn classify(&self, method: &Method, path: &str) -> RouteDisposition {
        let public = self
            .public_paths
            .iter()
            .any(|public| matches_path(public, path));

        let class = self
            .rules
            .iter()
            .find(|rule| {
                path.starts_with(&rule.path_prefix)
                    && (rule.methods.is_empty() || rule.methods.contains(method))
            })
            .map(|rule| rule.class.clone())
            .unwrap_or_else(|| {
                if method.is_safe() {
                    self.default_read.clone()
                } else {
                    self.default_write.clone()
                }
            });

        RouteDisposition { class, public }
    }
}

/// `/health` matches `/health` and `/health/live`, not `/healthz`
fn matches_path(pattern: &str, path: &str) -> bool {
    match path.strip_prefix(pattern) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || pattern.ends_with('/'),
        None => false,
    }
}

/// Create the application router
///
/// `api` carries the business routes. Everything, including the fallback,
/// runs behind admission.
pub fn create_router(state: Arc<AdmissionState>, api: Router) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/whoami", get(whoami))
        .route("/api/v1/auth/logout", post(logout))
        .with_state(state.clone())
        .merge(api)
        .layer(middleware::from_fn_with_state(state, admission_middleware))
        .layer(middleware::from_fn(logging_middleware))
}
