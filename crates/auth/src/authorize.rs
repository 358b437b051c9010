//! Role gates.
//!
//! A gate is a fixed set of roles; authorization is plain set membership over
//! the caller's role claim. No IO, no panics.

use thiserror::Error;

use crate::{Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' is not allowed ({gate})")]
    Forbidden { role: Role, gate: &'static str },

    #[error("forbidden: {0}")]
    Escalation(String),
}

/// Route-level role requirement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RoleGate {
    /// `{admin}`
    AdminOnly,
    /// `{manager, admin}`
    ManagerAndAdmin,
    /// `{staff, manager, admin}`
    StaffAndAbove,
}

impl RoleGate {
    pub fn allowed(self) -> &'static [Role] {
        match self {
            RoleGate::AdminOnly => &[Role::Admin],
            RoleGate::ManagerAndAdmin => &[Role::Manager, Role::Admin],
            RoleGate::StaffAndAbove => &[Role::Staff, Role::Manager, Role::Admin],
        }
    }

    pub fn allows(self, role: Role) -> bool {
        self.allowed().contains(&role)
    }

    pub fn name(self) -> &'static str {
        match self {
            RoleGate::AdminOnly => "admin only",
            RoleGate::ManagerAndAdmin => "manager and admin",
            RoleGate::StaffAndAbove => "staff and above",
        }
    }
}

/// Allow or deny `principal` at `gate`.
pub fn authorize(principal: &Principal, gate: RoleGate) -> Result<(), AuthzError> {
    if gate.allows(principal.role) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: principal.role,
            gate: gate.name(),
        })
    }
}

/// Guard for role changes: an actor may not hand out a role above their own,
/// nor touch a user who outranks them.
pub fn authorize_role_assignment(
    actor: Role,
    target_current: Role,
    requested: Role,
) -> Result<(), AuthzError> {
    if target_current.outranks(actor) {
        return Err(AuthzError::Escalation(format!(
            "a {actor} cannot modify a {target_current}"
        )));
    }
    if requested.outranks(actor) {
        return Err(AuthzError::Escalation(format!(
            "a {actor} cannot grant the {requested} role"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_core::UserId;

    fn principal(role: Role) -> Principal {
        Principal::new(UserId::new(), "someone", role)
    }

    #[test]
    fn gates_are_fixed_sets() {
        assert_eq!(RoleGate::AdminOnly.allowed(), &[Role::Admin]);
        assert!(RoleGate::ManagerAndAdmin.allows(Role::Manager));
        assert!(!RoleGate::ManagerAndAdmin.allows(Role::Staff));
        for role in Role::ALL {
            assert!(RoleGate::StaffAndAbove.allows(role));
        }
    }

    #[test]
    fn staff_is_denied_admin_only_and_accepted_staff_and_above() {
        let staff = principal(Role::Staff);

        match authorize(&staff, RoleGate::AdminOnly).unwrap_err() {
            AuthzError::Forbidden { role, .. } => assert_eq!(role, Role::Staff),
            other => panic!("Expected Forbidden, got {other:?}"),
        }
        assert!(authorize(&staff, RoleGate::StaffAndAbove).is_ok());
    }

    #[test]
    fn manager_passes_manager_gate_but_not_admin_gate() {
        let manager = principal(Role::Manager);
        assert!(authorize(&manager, RoleGate::ManagerAndAdmin).is_ok());
        assert!(authorize(&manager, RoleGate::AdminOnly).is_err());
    }

    #[test]
    fn managers_cannot_mint_admins_or_demote_them() {
        assert!(authorize_role_assignment(Role::Manager, Role::Staff, Role::Manager).is_ok());
        assert!(authorize_role_assignment(Role::Manager, Role::Staff, Role::Admin).is_err());
        assert!(authorize_role_assignment(Role::Manager, Role::Admin, Role::Staff).is_err());
        assert!(authorize_role_assignment(Role::Admin, Role::Admin, Role::Staff).is_ok());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn role() -> impl Strategy<Value = Role> {
            prop::sample::select(Role::ALL.to_vec())
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// An accepted assignment never leaves anyone above the actor.
            #[test]
            fn assignments_never_escalate(actor in role(), current in role(), requested in role()) {
                if authorize_role_assignment(actor, current, requested).is_ok() {
                    prop_assert!(!requested.outranks(actor));
                    prop_assert!(!current.outranks(actor));
                }
            }

            #[test]
            fn admins_may_assign_anything(current in role(), requested in role()) {
                prop_assert!(authorize_role_assignment(Role::Admin, current, requested).is_ok());
            }
        }
    }
}
