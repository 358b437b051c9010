use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    routing::get,
    Router,
};
use serde_json::json;

use stockroom_auth::{Principal, RoleGate};
use stockroom_infra::projections::Projection;
use stockroom_inventory::compute_stats;

use crate::app::dto::{self, ApiResult, respond};
use crate::app::services::AppServices;
use crate::authz::require;

const DEFAULT_ALERT_LIMIT: usize = 50;

pub fn router() -> Router {
    Router::new()
        .route("/api/stats", get(dashboard_stats))
        .route("/api/stock-alerts", get(stock_alerts))
}

pub async fn dashboard_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;

    let products = services.products.list();
    respond(
        StatusCode::OK,
        "Statistics retrieved successfully",
        json!({
            "totalProducts": products.len(),
            "totalSuppliers": services.suppliers.len(),
            "activeSuppliers": services.suppliers.active_count(),
            "totalMovements": services.movements.len(),
            "stock": compute_stats(&products),
        }),
    )
}

/// Recent status transitions, newest first. Trails the ledger slightly.
pub async fn stock_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<dto::LimitQuery>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;

    let alerts = services.alerts.recent(query.limit.unwrap_or(DEFAULT_ALERT_LIMIT));
    respond(
        StatusCode::OK,
        "Stock alerts retrieved successfully",
        json!({ "count": alerts.len(), "alerts": alerts }),
    )
}
