use std::str::FromStr;

use axum::Router;

use crate::app::errors::ApiError;

pub mod admin;
pub mod auth;
pub mod products;
pub mod stats;
pub mod stock;
pub mod suppliers;
pub mod system;
pub mod users;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    system::router().merge(auth::public_router())
}

/// Endpoints behind the bearer-token middleware.
pub fn protected_router() -> Router {
    Router::new()
        .merge(auth::router())
        .merge(users::router())
        .merge(products::router())
        .merge(suppliers::router())
        .merge(stock::router())
        .merge(stats::router())
        .merge(admin::router())
}

/// Parse a path or body id, answering 400 on garbage.
pub(crate) fn parse_id<T: FromStr>(raw: &str, subject: &str) -> Result<T, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {subject} id")))
}

/// Keys as the case-insensitive unique indexes see them.
pub(crate) fn same_key(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
