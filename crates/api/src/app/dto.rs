use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use stockroom_infra::projections::{ProductReadModel, UserReadModel};
use stockroom_inventory::StockStatus;

use crate::app::errors::ApiError;

pub type ApiResult = Result<Response, ApiError>;

// -------------------------
// Response envelope
// -------------------------

/// `{ success, message, data? }`, the shape of every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

pub fn respond<T: Serialize>(status: StatusCode, message: impl Into<String>, data: T) -> ApiResult {
    Ok((status, Json(Envelope::ok(message, data))).into_response())
}

/// `Json<T>` whose rejections use the envelope instead of plain text.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        Ok(Self(value))
    }
}

/// A catalog row plus its derived stock status.
#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: ProductReadModel,
    pub status: StockStatus,
}

impl From<ProductReadModel> for ProductView {
    fn from(product: ProductReadModel) -> Self {
        Self {
            status: product.status(),
            product,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthPayload {
    pub user: UserReadModel,
    pub token: String,
}

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: u64,
    pub cost: u64,
    pub sku: String,
    #[serde(default)]
    pub stock: i64,
    pub min_stock: i64,
    pub max_stock: i64,
    pub supplier_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<u64>,
    pub cost: Option<u64>,
    pub sku: Option<String>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub supplier_id: Option<String>,
    /// Only present to be refused: the balance moves through the ledger.
    pub stock: Option<JsonValue>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSupplierRequest {
    pub name: String,
    pub contact: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSupplierRequest {
    pub name: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovementRequest {
    pub product_id: String,
    pub movement_type: String,
    pub quantity: i64,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementQuery {
    pub product_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_missing_data() {
        let json = serde_json::to_value(Envelope::failure("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "message": "nope"}));
    }

    #[test]
    fn update_product_detects_stock_field() {
        let body: UpdateProductRequest =
            serde_json::from_value(serde_json::json!({"name": "x", "stock": 5})).unwrap();
        assert!(body.stock.is_some());

        let body: UpdateProductRequest = serde_json::from_value(serde_json::json!({"minStock": 2})).unwrap();
        assert!(body.stock.is_none());
        assert_eq!(body.min_stock, Some(2));
    }
}
