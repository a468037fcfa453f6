use serde::{Deserialize, Serialize};

use super::UserId;

/// Enrolled-student reference data, owned by the roster service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Student {
    pub id: UserId,
    pub full_name: String,
    pub student_code: String,
}
