use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use serde_json::json;

use stockroom_auth::{Principal, verify_password};

use crate::app::dto::{self, ApiJson, ApiResult, AuthPayload, respond};
use crate::app::errors::ApiError;
use crate::app::routes::users::{
    current_user, hash_new_password, issue_token, register_account, set_password, update_profile,
};
use crate::app::services::AppServices;

const BAD_CREDENTIALS: &str = "Invalid email or password";

pub fn public_router() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn router() -> Router {
    Router::new()
        .route("/auth/profile", get(profile).put(edit_profile))
        .route("/auth/change-password", put(change_password))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::RegisterRequest>,
) -> ApiResult {
    let password_hash = hash_new_password(body.password).await?;
    let user = register_account(&services, &body.username, &body.email, password_hash, None)?;
    let token = issue_token(&services, &user)?;

    tracing::info!(user_id = %user.id, role = %user.role, "user registered");
    respond(
        StatusCode::CREATED,
        "User registered successfully",
        AuthPayload { user, token },
    )
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::LoginRequest>,
) -> ApiResult {
    let user = services
        .users
        .find_by_email(&body.email)
        .ok_or_else(|| ApiError::Unauthenticated(BAD_CREDENTIALS.to_string()))?;

    if !password_matches(body.password, user.password_hash.clone()).await? {
        tracing::info!(user_id = %user.id, "login rejected");
        return Err(ApiError::Unauthenticated(BAD_CREDENTIALS.to_string()));
    }

    let token = issue_token(&services, &user)?;
    respond(StatusCode::OK, "Login successful", AuthPayload { user, token })
}

pub async fn profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    let user = current_user(&services, principal.user_id)?;
    respond(StatusCode::OK, "Profile retrieved successfully", json!({ "user": user }))
}

pub async fn edit_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<dto::UpdateProfileRequest>,
) -> ApiResult {
    if body.username.is_none() && body.email.is_none() {
        return Err(ApiError::bad_request("No fields to update"));
    }

    let user = update_profile(&services, principal.user_id, body.username, body.email)?;
    respond(StatusCode::OK, "Profile updated successfully", json!({ "user": user }))
}

pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<dto::ChangePasswordRequest>,
) -> ApiResult {
    let user = current_user(&services, principal.user_id)?;

    if !password_matches(body.current_password, user.password_hash).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let password_hash = hash_new_password(body.new_password).await?;
    set_password(&services, principal.user_id, password_hash)?;
    respond(StatusCode::OK, "Password changed successfully", json!({ "id": principal.user_id }))
}

async fn password_matches(password: String, hash: String) -> Result<bool, ApiError> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&password, &hash)).await??)
}
