use super::RequestContext;
use crate::{models::Role, AppError, AppResult};

/// Roles that manage beds, rooms and discharge sign-off.
pub const WARD_MANAGERS: &[Role] = &[Role::Admin, Role::Staff];

/// Roles with access to every patient's clinical records.
pub const CLINICIANS: &[Role] = &[Role::Admin, Role::Doctor, Role::Staff];

impl RequestContext {
    pub fn has_role(&self, roles: &[Role]) -> bool {
        roles.contains(&self.role)
    }

    pub fn require_any(&self, roles: &[Role]) -> AppResult<()> {
        if self.has_role(roles) {
            return Ok(());
        }

        tracing::warn!(
            user_id = self.user_id,
            role = %self.role,
            "Role not permitted for this operation"
        );

        let allowed: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AppError::Forbidden(format!(
            "Requires one of: {}",
            allowed.join(", ")
        )))
    }

    /// Clinicians may read any patient's records; patients only their own.
    pub fn require_patient_access(&self, patient_id: i32) -> AppResult<()> {
        if self.has_role(CLINICIANS) || (self.role == Role::Patient && self.user_id == patient_id) {
            return Ok(());
        }

        Err(AppError::Forbidden(
            "Not permitted to view this patient's records".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ctx(role: Role, user_id: i32) -> RequestContext {
        RequestContext {
            user_id,
            display_id: format!("{}0001", role.prefix()),
            role,
            session_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_require_any() {
        assert!(ctx(Role::Staff, 1).require_any(WARD_MANAGERS).is_ok());
        let err = ctx(Role::Doctor, 1).require_any(WARD_MANAGERS).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(msg) if msg.contains("admin, staff")));
    }

    #[test]
    fn test_patient_access() {
        assert!(ctx(Role::Patient, 5).require_patient_access(5).is_ok());
        assert!(ctx(Role::Patient, 5).require_patient_access(6).is_err());
        assert!(ctx(Role::Doctor, 9).require_patient_access(6).is_ok());
    }
}
