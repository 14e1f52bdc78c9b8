//! Well-known role name constants.
//!
//! Roles arrive from the upstream identity provider; the platform does not
//! store them. `admin` and `supervisor` are admin-equivalent everywhere.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_SUPERVISOR: &str = "supervisor";
pub const ROLE_CONSULTANT: &str = "consultant";

/// Admin-equivalent roles: pass every layer of the access gate.
pub fn is_elevated(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_SUPERVISOR
}

/// Roles allowed to operate the facilitator-facing session endpoints.
pub fn is_facilitator(role: &str) -> bool {
    is_elevated(role) || role == ROLE_CONSULTANT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_and_supervisor_are_elevated() {
        assert!(is_elevated(ROLE_ADMIN));
        assert!(is_elevated(ROLE_SUPERVISOR));
        assert!(!is_elevated(ROLE_CONSULTANT));
    }

    #[test]
    fn consultant_is_facilitator_but_not_elevated() {
        assert!(is_facilitator(ROLE_CONSULTANT));
        assert!(!is_elevated(ROLE_CONSULTANT));
    }

    #[test]
    fn unknown_role_has_no_privileges() {
        assert!(!is_elevated("viewer"));
        assert!(!is_facilitator("viewer"));
    }
}
