use serde::{Deserialize, Serialize};

use crate::models::UserId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

/// Read-only capability describing who is driving the engine.
///
/// Injected by the embedding application after it has authenticated the
/// user; the engine never consults ambient auth state.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub current_user: UserId,
    pub current_role: Role,
}

impl AuthContext {
    pub fn new(current_user: UserId, current_role: Role) -> Self {
        Self {
            current_user,
            current_role,
        }
    }

    /// Whether this caller may start/end sessions and correct statuses.
    pub fn can_manage_sessions(&self) -> bool {
        matches!(self.current_role, Role::Teacher | Role::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn students_cannot_manage_sessions() {
        assert!(!AuthContext::new(1, Role::Student).can_manage_sessions());
        assert!(AuthContext::new(2, Role::Teacher).can_manage_sessions());
        assert!(AuthContext::new(3, Role::Admin).can_manage_sessions());
    }
}
