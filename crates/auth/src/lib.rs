//! `stockroom-auth`: identity and access boundary.
//!
//! Roles, role gates, token claims, JWT signing, password hashing and the
//! event-sourced `User` aggregate. No HTTP and no storage.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, RoleGate, authorize, authorize_role_assignment};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256Jwt, JwtIssuer, JwtValidator};
pub use password::{PasswordError, hash_password, validate_password_policy, verify_password};
pub use principal::Principal;
pub use roles::{Role, UnknownRole};
pub use user::{
    ChangePassword, ChangeRole, DeleteUser, PasswordChanged, ProfileUpdated, RegisterUser,
    RoleChanged, UpdateProfile, User, UserCommand, UserDeleted, UserEvent, UserRegistered,
    validate_username,
};
