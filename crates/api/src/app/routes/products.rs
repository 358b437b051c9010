use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use stockroom_auth::{Principal, RoleGate};
use stockroom_core::AggregateId;
use stockroom_infra::constraints::ConstraintError;
use stockroom_infra::projections::ProductReadModel;
use stockroom_inventory::{
    CreateProduct, DeleteProduct, ProductCommand, ProductEvent, ProductId, ProductPatch, UpdateProduct,
};
use stockroom_suppliers::SupplierId;

use crate::app::dto::{self, ApiJson, ApiResult, ProductView, respond};
use crate::app::errors::ApiError;
use crate::app::routes::{parse_id, same_key};
use crate::app::services::AppServices;
use crate::authz::require;

pub fn router() -> Router {
    Router::new()
        .route("/api/product", post(create_product))
        .route("/api/products", get(list_products))
        .route(
            "/api/product/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub supplier_id: Option<String>,
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<dto::CreateProductRequest>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;

    let supplier_id = parse_supplier(body.supplier_id.as_deref())?;
    let product_id = ProductId::new(AggregateId::new());

    let _guard = services.write_guard()?;
    services.skus.reserve(&body.sku, product_id.0)?;
    if let Some(supplier_id) = supplier_id {
        if let Err(err) = link_supplier(&services, supplier_id, product_id) {
            services.skus.release(&body.sku, product_id.0);
            return Err(err);
        }
    }

    let created = services.dispatch_product(
        product_id,
        ProductCommand::Create(CreateProduct {
            product_id,
            name: body.name,
            description: body.description,
            category: body.category,
            price: body.price,
            cost: body.cost,
            sku: body.sku.clone(),
            stock: body.stock,
            min_stock: body.min_stock,
            max_stock: body.max_stock,
            supplier_id: supplier_id.map(|s| s.0),
            created_by: Some(principal.user_id),
            occurred_at: Utc::now(),
        }),
    );
    if let Err(err) = created {
        services.skus.release(&body.sku, product_id.0);
        if let Some(supplier_id) = supplier_id {
            services.supplier_refs.unlink(supplier_id.0, product_id.0);
        }
        return Err(err);
    }

    let product = catalog_row(&services, product_id)?;
    tracing::info!(
        product_id = %product_id,
        sku = %product.sku,
        opening_stock = product.stock,
        created_by = %principal.user_id,
        "product created"
    );
    respond(
        StatusCode::CREATED,
        "Product created successfully",
        json!({ "product": ProductView::from(product) }),
    )
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ProductQuery>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;

    let rows = match parse_supplier(query.supplier_id.as_deref())? {
        Some(supplier_id) => services.products.by_supplier(supplier_id.0),
        None => services.products.list(),
    };
    let products: Vec<ProductView> = rows.into_iter().map(ProductView::from).collect();

    respond(
        StatusCode::OK,
        "Products retrieved successfully",
        json!({ "count": products.len(), "products": products }),
    )
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;
    let product_id: ProductId = parse_id(&id, "product")?;

    let product = services
        .products
        .get(&product_id)
        .ok_or_else(|| ApiError::not_found("Product"))?;
    respond(
        StatusCode::OK,
        "Product retrieved successfully",
        json!({ "product": ProductView::from(product) }),
    )
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UpdateProductRequest>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;
    let product_id: ProductId = parse_id(&id, "product")?;

    if body.stock.is_some() {
        return Err(ApiError::bad_request(
            "Stock cannot be edited directly; record a stock movement instead",
        ));
    }
    let supplier_id = parse_supplier(body.supplier_id.as_deref())?;

    let _guard = services.write_guard()?;
    let _keys = services.key_edit_guard()?;
    let before = services
        .products
        .get(&product_id)
        .ok_or_else(|| ApiError::not_found("Product"))?;

    let new_sku = body.sku.as_deref().filter(|s| !same_key(s, &before.sku));
    let new_supplier = supplier_id.filter(|s| before.supplier_id != Some(s.0));

    if let Some(sku) = new_sku {
        services.skus.reserve(sku, product_id.0)?;
    }
    if let Some(supplier_id) = new_supplier {
        if let Err(err) = link_supplier(&services, supplier_id, product_id) {
            if let Some(sku) = new_sku {
                services.skus.release(sku, product_id.0);
            }
            return Err(err);
        }
    }

    let patch = ProductPatch {
        name: body.name,
        description: body.description,
        category: body.category,
        price: body.price,
        cost: body.cost,
        sku: body.sku.clone(),
        min_stock: body.min_stock,
        max_stock: body.max_stock,
        supplier_id: supplier_id.map(|s| s.0),
    };
    let updated = services.dispatch_product(
        product_id,
        ProductCommand::Update(UpdateProduct {
            product_id,
            patch,
            occurred_at: Utc::now(),
        }),
    );
    if let Err(err) = updated {
        if let Some(sku) = new_sku {
            services.skus.release(sku, product_id.0);
        }
        if let Some(supplier_id) = new_supplier {
            services.supplier_refs.unlink(supplier_id.0, product_id.0);
        }
        return Err(err);
    }

    let after = catalog_row(&services, product_id)?;
    for sku in [Some(before.sku.as_str()), new_sku].into_iter().flatten() {
        if !same_key(sku, &after.sku) {
            services.skus.release(sku, product_id.0);
        }
    }
    for supplier in [before.supplier_id, new_supplier.map(|s| s.0)].into_iter().flatten() {
        if after.supplier_id != Some(supplier) {
            services.supplier_refs.unlink(supplier, product_id.0);
        }
    }

    respond(
        StatusCode::OK,
        "Product updated successfully",
        json!({ "product": ProductView::from(after) }),
    )
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;
    let product_id: ProductId = parse_id(&id, "product")?;

    let _guard = services.write_guard()?;
    let committed = services.dispatch_product(
        product_id,
        ProductCommand::Delete(DeleteProduct {
            product_id,
            deleted_by: Some(principal.user_id),
            occurred_at: Utc::now(),
        }),
    )?;

    for stored in &committed {
        let event: ProductEvent = stored.decode().map_err(|e| ApiError::internal(e.to_string()))?;
        if let ProductEvent::Deleted(deleted) = event {
            services.skus.release(&deleted.sku, product_id.0);
            if let Some(supplier_id) = deleted.supplier_id {
                services.supplier_refs.unlink(supplier_id, product_id.0);
            }
        }
    }

    tracing::info!(product_id = %product_id, deleted_by = %principal.user_id, "product deleted");
    respond(StatusCode::OK, "Product deleted successfully", json!({ "id": product_id }))
}

fn parse_supplier(raw: Option<&str>) -> Result<Option<SupplierId>, ApiError> {
    raw.map(|raw| parse_id(raw, "supplier")).transpose()
}

fn link_supplier(services: &AppServices, supplier_id: SupplierId, product_id: ProductId) -> Result<(), ApiError> {
    services
        .supplier_refs
        .link(supplier_id.0, product_id.0)
        .map_err(|err| match err {
            ConstraintError::MissingParent(_) => {
                ApiError::bad_request("supplierId must reference an existing supplier")
            }
            other => other.into(),
        })
}

pub(crate) fn catalog_row(services: &AppServices, product_id: ProductId) -> Result<ProductReadModel, ApiError> {
    services
        .products
        .get(&product_id)
        .ok_or_else(|| ApiError::internal(format!("product {product_id} missing from catalog after write")))
}
