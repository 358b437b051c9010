//! Route-level role gates.
//!
//! Handlers call [`require`] first thing, before touching any state.

use stockroom_auth::{Principal, RoleGate, authorize};

use crate::app::errors::ApiError;

pub fn require(principal: &Principal, gate: RoleGate) -> Result<(), ApiError> {
    authorize(principal, gate).map_err(|e| {
        tracing::info!(
            user_id = %principal.user_id,
            role = %principal.role,
            gate = gate.name(),
            "role gate denied request"
        );
        ApiError::from(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use stockroom_auth::Role;
    use stockroom_core::UserId;

    #[test]
    fn staff_is_denied_admin_routes_but_allowed_staff_routes() {
        let staff = Principal::new(UserId::new(), "clerk", Role::Staff);
        assert_eq!(
            require(&staff, RoleGate::AdminOnly).unwrap_err().status(),
            StatusCode::FORBIDDEN
        );
        assert!(require(&staff, RoleGate::StaffAndAbove).is_ok());
    }
}
