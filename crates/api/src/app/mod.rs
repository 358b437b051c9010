//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: ledger, bus, projections, constraint indexes, dispatch
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: response envelope and request bodies
//! - `errors.rs`: error to status mapping

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{HeaderValue, Method, header},
    Extension, Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use stockroom_infra::config::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build services and router from `config`.
pub fn build_app(config: AppConfig) -> io::Result<Router> {
    let services = Arc::new(AppServices::build(config)?);
    Ok(router(services))
}

/// The full router over already-built services.
pub fn router(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.jwt.clone(),
        services: Arc::clone(&services),
    };

    let protected = routes::protected_router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .fallback(routes::system::not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&services.config.cors_origins))
                .layer(Extension(services)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60))
}
