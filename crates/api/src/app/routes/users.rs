//! User administration plus the account helpers shared with `/auth`.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde_json::json;

use stockroom_auth::{
    ChangePassword, ChangeRole, DeleteUser, JwtClaims, JwtIssuer, Principal, RegisterUser, Role, RoleGate,
    UpdateProfile, UserCommand, authorize_role_assignment, hash_password, validate_password_policy,
};
use stockroom_core::{AggregateId, UserId};
use stockroom_infra::constraints::UniqueIndex;
use stockroom_infra::projections::{Projection, UserReadModel};

use crate::app::dto::{self, ApiJson, ApiResult, respond};
use crate::app::errors::ApiError;
use crate::app::routes::{parse_id, same_key};
use crate::app::services::AppServices;
use crate::authz::require;

pub fn router() -> Router {
    Router::new()
        .route("/api/my-data", get(my_data))
        .route("/api/user", post(create_user))
        .route("/api/users", get(list_users))
        .route("/api/user/:id", put(update_user).delete(delete_user))
        .route("/api/user/:id/role", put(change_role))
        .route("/api/staff", get(list_staff))
}

pub async fn my_data(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    let user = current_user(&services, principal.user_id)?;
    respond(StatusCode::OK, "User data retrieved successfully", json!({ "user": user }))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    ApiJson(body): ApiJson<dto::CreateUserRequest>,
) -> ApiResult {
    require(&principal, RoleGate::AdminOnly)?;

    let role = body.role.as_deref().map(parse_role).transpose()?.unwrap_or(Role::Staff);
    let password_hash = hash_new_password(body.password).await?;
    let user = register_account(&services, &body.username, &body.email, password_hash, Some(role))?;

    tracing::info!(user_id = %user.id, role = %user.role, created_by = %principal.user_id, "user created");
    respond(StatusCode::CREATED, "User created successfully", json!({ "user": user }))
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require(&principal, RoleGate::AdminOnly)?;

    let users = services.users.list();
    respond(
        StatusCode::OK,
        "Users retrieved successfully",
        json!({ "count": users.len(), "users": users }),
    )
}

pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::UpdateUserRequest>,
) -> ApiResult {
    require(&principal, RoleGate::AdminOnly)?;
    let user_id: UserId = parse_id(&id, "user")?;

    if body.username.is_none() && body.email.is_none() && body.password.is_none() && body.role.is_none() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let role = body.role.as_deref().map(parse_role).transpose()?;
    let target = current_user(&services, user_id)?;

    // Everything that can be refused is checked before the first dispatch.
    if let Some(role) = role {
        if user_id == principal.user_id {
            return Err(ApiError::bad_request("You cannot change your own role"));
        }
        authorize_role_assignment(principal.role, target.role, role)?;
    }
    let password_hash = match body.password {
        Some(password) => Some(hash_new_password(password).await?),
        None => None,
    };

    if body.username.is_some() || body.email.is_some() {
        update_profile(&services, user_id, body.username, body.email)?;
    }
    if let Some(password_hash) = password_hash {
        set_password(&services, user_id, password_hash)?;
    }
    if let Some(role) = role {
        assign_role(&services, &principal, user_id, role)?;
    }

    let user = current_user(&services, user_id)?;
    respond(StatusCode::OK, "User updated successfully", json!({ "user": user }))
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult {
    require(&principal, RoleGate::AdminOnly)?;
    let user_id: UserId = parse_id(&id, "user")?;

    let _guard = services.write_guard()?;
    let user = current_user(&services, user_id)?;
    services.dispatch_user(
        user_id,
        UserCommand::Delete(DeleteUser {
            user_id,
            actor_id: principal.user_id,
            occurred_at: Utc::now(),
        }),
    )?;

    let owner = AggregateId::from(user_id);
    services.emails.release(&user.email, owner);
    services.usernames.release(&user.username, owner);

    tracing::info!(user_id = %user_id, deleted_by = %principal.user_id, "user deleted");
    respond(StatusCode::OK, "User deleted successfully", json!({ "id": user_id }))
}

pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::ChangeRoleRequest>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;
    let user_id: UserId = parse_id(&id, "user")?;
    let role = parse_role(&body.role)?;

    let user = assign_role(&services, &principal, user_id, role)?;
    respond(StatusCode::OK, "User role updated successfully", json!({ "user": user }))
}

pub async fn list_staff(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> ApiResult {
    require(&principal, RoleGate::ManagerAndAdmin)?;

    let staff = services.users.with_roles(&[Role::Staff]);
    respond(StatusCode::OK, "Staff members retrieved successfully", json!({ "staff": staff }))
}

// -------------------------
// Account helpers
// -------------------------

pub(crate) fn parse_role(raw: &str) -> Result<Role, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request("Invalid role. Must be admin, manager, or staff"))
}

pub(crate) fn current_user(services: &AppServices, user_id: UserId) -> Result<UserReadModel, ApiError> {
    services.users.get(&user_id).ok_or_else(|| ApiError::not_found("User"))
}

/// Check the policy, then hash off the async runtime.
pub(crate) async fn hash_new_password(password: String) -> Result<String, ApiError> {
    validate_password_policy(&password)?;
    Ok(tokio::task::spawn_blocking(move || hash_password(&password)).await??)
}

pub(crate) fn issue_token(services: &AppServices, user: &UserReadModel) -> Result<String, ApiError> {
    let principal = Principal::new(user.id, user.username.clone(), user.role);
    let claims = JwtClaims::for_principal(
        &principal,
        Utc::now(),
        chrono::Duration::minutes(services.config.jwt_ttl_minutes),
    );
    Ok(services.jwt.issue(&claims)?)
}

/// Create an account holding unique email and username.
///
/// With no explicit role the very first account becomes `admin` and every
/// later one `staff`.
pub(crate) fn register_account(
    services: &AppServices,
    username: &str,
    email: &str,
    password_hash: String,
    role: Option<Role>,
) -> Result<UserReadModel, ApiError> {
    let _guard = services.write_guard()?;
    let _registration = services
        .registration
        .lock()
        .map_err(|_| ApiError::internal("registration lock poisoned"))?;

    let role = role.unwrap_or_else(|| if services.users.is_empty() { Role::Admin } else { Role::Staff });
    let user_id = UserId::new();
    let owner = AggregateId::from(user_id);

    services.emails.reserve(email, owner)?;
    if let Err(err) = services.usernames.reserve(username, owner) {
        services.emails.release(email, owner);
        return Err(err.into());
    }

    let registered = services.dispatch_user(
        user_id,
        UserCommand::Register(RegisterUser {
            user_id,
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role,
            occurred_at: Utc::now(),
        }),
    );
    if let Err(err) = registered {
        services.emails.release(email, owner);
        services.usernames.release(username, owner);
        return Err(err);
    }

    current_user(services, user_id)
}

/// Change username and/or email, moving the unique keys along.
pub(crate) fn update_profile(
    services: &AppServices,
    user_id: UserId,
    username: Option<String>,
    email: Option<String>,
) -> Result<UserReadModel, ApiError> {
    let _guard = services.write_guard()?;
    let _keys = services.key_edit_guard()?;
    let before = current_user(services, user_id)?;
    let owner = AggregateId::from(user_id);

    let new_email = email.as_deref().filter(|e| !same_key(e, &before.email));
    let new_username = username.as_deref().filter(|u| !same_key(u, &before.username));

    if let Some(email) = new_email {
        services.emails.reserve(email, owner)?;
    }
    if let Some(username) = new_username {
        if let Err(err) = services.usernames.reserve(username, owner) {
            release_all(&services.emails, new_email, owner);
            return Err(err.into());
        }
    }

    let updated = services.dispatch_user(
        user_id,
        UserCommand::UpdateProfile(UpdateProfile {
            user_id,
            username: username.clone(),
            email: email.clone(),
            occurred_at: Utc::now(),
        }),
    );
    if let Err(err) = updated {
        release_all(&services.emails, new_email, owner);
        release_all(&services.usernames, new_username, owner);
        return Err(err);
    }

    let after = current_user(services, user_id)?;
    keep_only(&services.emails, [Some(before.email.as_str()), new_email], &after.email, owner);
    keep_only(&services.usernames, [Some(before.username.as_str()), new_username], &after.username, owner);
    Ok(after)
}

pub(crate) fn set_password(services: &AppServices, user_id: UserId, password_hash: String) -> Result<(), ApiError> {
    services.dispatch_user(
        user_id,
        UserCommand::ChangePassword(ChangePassword {
            user_id,
            password_hash,
            occurred_at: Utc::now(),
        }),
    )?;
    tracing::info!(user_id = %user_id, "password changed");
    Ok(())
}

fn assign_role(
    services: &AppServices,
    actor: &Principal,
    user_id: UserId,
    role: Role,
) -> Result<UserReadModel, ApiError> {
    services.dispatch_user(
        user_id,
        UserCommand::ChangeRole(ChangeRole {
            user_id,
            role,
            actor_id: actor.user_id,
            actor_role: actor.role,
            occurred_at: Utc::now(),
        }),
    )?;
    tracing::info!(user_id = %user_id, role = %role, changed_by = %actor.user_id, "role assigned");
    current_user(services, user_id)
}

fn release_all(index: &UniqueIndex, key: Option<&str>, owner: AggregateId) {
    if let Some(key) = key {
        index.release(key, owner);
    }
}

/// Release every candidate key except the one the user now holds.
fn keep_only<const N: usize>(index: &UniqueIndex, candidates: [Option<&str>; N], current: &str, owner: AggregateId) {
    for key in candidates.into_iter().flatten() {
        if !same_key(key, current) {
            index.release(key, owner);
        }
    }
}
