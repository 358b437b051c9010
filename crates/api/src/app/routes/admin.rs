use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, routing::post, Router};
use serde_json::json;

use stockroom_auth::{Principal, RoleGate};

use crate::app::dto::{ApiResult, respond};
use crate::app::services::AppServices;
use crate::authz::require;

pub fn router() -> Router {
    Router::new().route("/api/admin/rebuild", post(rebuild))
}

/// Replay the ledger into fresh projections and constraint indexes.
pub async fn rebuild(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require(&principal, RoleGate::AdminOnly)?;

    tracing::info!(requested_by = %principal.user_id, "rebuild requested");
    let worker = Arc::clone(&services);
    let report = tokio::task::spawn_blocking(move || worker.rebuild()).await??;

    respond(StatusCode::OK, "Projections rebuilt", json!({ "report": report }))
}
