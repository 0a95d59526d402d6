//! Caller identity as resolved by the upstream token service, and the access
//! rules each request is checked against.

use crate::store::StoreError;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub role: Role,
    pub user_id: String,
}

/// Parent → linked students lookup.
pub trait WardDirectory {
    fn wards_of(&self, parent_id: &str) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    Forbidden,
}

impl AuthContext {
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Teacher)
    }

    pub fn require_admin(&self) -> Result<(), Denied> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(Denied::Forbidden)
        }
    }

    pub fn require_staff(&self) -> Result<(), Denied> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(Denied::Forbidden)
        }
    }

    /// Reading a student's records: staff, the student, or a linked parent.
    pub fn can_view_student<D: WardDirectory + ?Sized>(
        &self,
        dir: &D,
        student_id: &str,
    ) -> Result<bool, StoreError> {
        match self.role {
            Role::Admin | Role::Teacher => Ok(true),
            Role::Student => Ok(self.user_id == student_id),
            Role::Parent => Ok(dir.wards_of(&self.user_id)?.iter().any(|w| w == student_id)),
        }
    }

    /// Acting on behalf of a student (leave, payments): admin, the student,
    /// or a linked parent. Teachers don't act for students.
    pub fn can_act_for_student<D: WardDirectory + ?Sized>(
        &self,
        dir: &D,
        student_id: &str,
    ) -> Result<bool, StoreError> {
        match self.role {
            Role::Admin => Ok(true),
            Role::Teacher => Ok(false),
            Role::Student | Role::Parent => self.can_view_student(dir, student_id),
        }
    }
}
