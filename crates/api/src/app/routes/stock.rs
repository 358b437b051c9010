use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use stockroom_auth::{Principal, RoleGate};
use stockroom_infra::projections::MovementReadModel;
use stockroom_inventory::{
    MovementType, ProductCommand, ProductId, Quantity, RecordMovement, compute_stats,
};

use crate::app::dto::{self, ApiJson, ApiResult, ProductView, respond};
use crate::app::errors::ApiError;
use crate::app::routes::parse_id;
use crate::app::routes::products::catalog_row;
use crate::app::services::AppServices;
use crate::authz::require;

pub fn router() -> Router {
    Router::new()
        .route("/api/stock-movement", post(record_movement))
        .route("/api/stock-movements", get(list_movements))
        .route("/api/product/:id/movements", get(product_movements))
        .route("/api/stock-stats", get(stock_stats))
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<dto::StockMovementRequest>,
) -> ApiResult {
    require(&principal, RoleGate::StaffAndAbove)?;

    let product_id: ProductId = parse_id(&body.product_id, "product")?;
    let movement_type = MovementType::parse(&body.movement_type)
        .map_err(|_| ApiError::bad_request("Invalid movement type. Must be 'stock in' or 'stock out'"))?;
    let quantity = Quantity::new(body.quantity)
        .map_err(|_| ApiError::bad_request("Quantity must be a positive whole number"))?;

    let committed = services.dispatch_product(
        product_id,
        ProductCommand::RecordMovement(RecordMovement {
            product_id,
            movement_type,
            quantity,
            reason: body.reason,
            notes: body.notes,
            recorded_by: Some(principal.user_id),
            occurred_at: Utc::now(),
        }),
    )?;

    let movement = committed
        .last()
        .and_then(|stored| services.movements.get(&stored.event_id))
        .ok_or_else(|| ApiError::internal(format!("movement for {product_id} missing from log after write")))?;
    let product = catalog_row(&services, product_id)?;

    tracing::info!(
        product_id = %product_id,
        movement_type = %movement.movement_type,
        quantity = movement.quantity,
        stock_before = movement.stock_before,
        stock_after = movement.stock_after,
        recorded_by = %principal.user_id,
        "stock movement recorded"
    );

    respond(
        StatusCode::CREATED,
        "Stock movement recorded successfully",
        json!({ "movement": movement, "product": ProductView::from(product) }),
    )
}

pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<dto::MovementQuery>,
) -> ApiResult {
    require(&principal, RoleGate::StaffAndAbove)?;

    let movements = match query.product_id.as_deref() {
        Some(raw) => services.movements.for_product(parse_id(raw, "product")?),
        None => services.movements.list(),
    };
    let movements = truncate(movements, query.limit);

    respond(
        StatusCode::OK,
        "Stock movements retrieved successfully",
        json!({ "count": movements.len(), "movements": movements }),
    )
}

pub async fn product_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Query(query): Query<dto::LimitQuery>,
) -> ApiResult {
    require(&principal, RoleGate::StaffAndAbove)?;
    let product_id: ProductId = parse_id(&id, "product")?;

    let movements = services.movements.for_product(product_id);
    // Deleted products keep their history; only an id nothing ever touched is unknown.
    if movements.is_empty() && services.products.get(&product_id).is_none() {
        return Err(ApiError::not_found("Product"));
    }
    let movements = truncate(movements, query.limit);

    respond(
        StatusCode::OK,
        "Product movements retrieved successfully",
        json!({ "productId": product_id, "count": movements.len(), "movements": movements }),
    )
}

pub async fn stock_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require(&principal, RoleGate::StaffAndAbove)?;

    let products = services.products.list();
    let stats = compute_stats(&products);
    respond(StatusCode::OK, "Stock statistics retrieved successfully", json!({ "stats": stats }))
}

fn truncate(mut movements: Vec<MovementReadModel>, limit: Option<usize>) -> Vec<MovementReadModel> {
    if let Some(limit) = limit {
        movements.truncate(limit);
    }
    movements
}
