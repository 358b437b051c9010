use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use stockroom_auth::{Principal, RoleGate};
use stockroom_core::AggregateId;
use stockroom_infra::constraints::ConstraintError;
use stockroom_infra::projections::SupplierReadModel;
use stockroom_suppliers::{
    DeleteSupplier, RegisterSupplier, SupplierCommand, SupplierDetails, SupplierId, SupplierPatch, SupplierStatus,
    UpdateSupplier,
};

use crate::app::dto::{self, ApiJson, ApiResult, respond};
use crate::app::errors::ApiError;
use crate::app::routes::parse_id;
use crate::app::services::AppServices;
use crate::authz::require;

pub fn router() -> Router {
    Router::new()
        .route("/api/supplier", post(create_supplier))
        .route("/api/suppliers", get(list_suppliers))
        .route(
            "/api/supplier/:id",
            get(get_supplier).put(update_supplier).delete(delete_supplier),
        )
}

pub async fn create_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<dto::CreateSupplierRequest>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;

    let status = parse_status(body.status.as_deref())?;
    let supplier_id = SupplierId::new(AggregateId::new());

    let _guard = services.write_guard()?;
    services.dispatch_supplier(
        supplier_id,
        SupplierCommand::Register(RegisterSupplier {
            supplier_id,
            details: SupplierDetails {
                name: body.name,
                contact: body.contact,
                email: body.email,
                phone: body.phone,
                address: body.address,
                city: body.city,
                country: body.country,
            },
            status,
            occurred_at: Utc::now(),
        }),
    )?;
    services.supplier_refs.add_parent(supplier_id.0)?;

    let supplier = directory_row(&services, supplier_id)?;
    tracing::info!(supplier_id = %supplier_id, name = %supplier.name, "supplier registered");
    respond(StatusCode::CREATED, "Supplier created successfully", json!({ "supplier": supplier }))
}

pub async fn list_suppliers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;

    let suppliers = services.suppliers.list();
    respond(
        StatusCode::OK,
        "Suppliers retrieved successfully",
        json!({ "count": suppliers.len(), "suppliers": suppliers }),
    )
}

pub async fn get_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;
    let supplier_id: SupplierId = parse_id(&id, "supplier")?;

    let supplier = services
        .suppliers
        .get(&supplier_id)
        .ok_or_else(|| ApiError::not_found("Supplier"))?;
    let products = services.products.by_supplier(supplier_id.0).len();
    respond(
        StatusCode::OK,
        "Supplier retrieved successfully",
        json!({ "supplier": supplier, "productCount": products }),
    )
}

pub async fn update_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UpdateSupplierRequest>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;
    let supplier_id: SupplierId = parse_id(&id, "supplier")?;

    let patch = SupplierPatch {
        status: parse_status(body.status.as_deref())?,
        name: body.name,
        contact: body.contact,
        email: body.email,
        phone: body.phone,
        address: body.address,
        city: body.city,
        country: body.country,
    };

    services.dispatch_supplier(
        supplier_id,
        SupplierCommand::Update(UpdateSupplier {
            supplier_id,
            patch,
            occurred_at: Utc::now(),
        }),
    )?;

    let supplier = directory_row(&services, supplier_id)?;
    respond(StatusCode::OK, "Supplier updated successfully", json!({ "supplier": supplier }))
}

/// Restricted: refused with 409 while any live product references the supplier.
pub async fn delete_supplier(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;
    let supplier_id: SupplierId = parse_id(&id, "supplier")?;

    let _guard = services.write_guard()?;
    services
        .supplier_refs
        .tombstone_if_unreferenced(supplier_id.0)
        .map_err(|err| match err {
            ConstraintError::Referenced { count, .. } => ApiError::Conflict(format!(
                "Cannot delete supplier: {count} product(s) still reference it"
            )),
            other => other.into(),
        })?;

    let deleted = services.dispatch_supplier(
        supplier_id,
        SupplierCommand::Delete(DeleteSupplier {
            supplier_id,
            occurred_at: Utc::now(),
        }),
    );
    if let Err(err) = deleted {
        services.supplier_refs.untombstone(supplier_id.0);
        return Err(err);
    }
    services.supplier_refs.remove_parent(supplier_id.0);

    tracing::info!(supplier_id = %supplier_id, deleted_by = %principal.user_id, "supplier deleted");
    respond(StatusCode::OK, "Supplier deleted successfully", json!({ "id": supplier_id }))
}

fn parse_status(raw: Option<&str>) -> Result<Option<SupplierStatus>, ApiError> {
    raw.map(|raw| {
        raw.parse()
            .map_err(|_| ApiError::bad_request("Invalid status. Must be active or inactive"))
    })
    .transpose()
}

fn directory_row(services: &AppServices, supplier_id: SupplierId) -> Result<SupplierReadModel, ApiError> {
    services
        .suppliers
        .get(&supplier_id)
        .ok_or_else(|| ApiError::internal(format!("supplier {supplier_id} missing from directory after write")))
}
