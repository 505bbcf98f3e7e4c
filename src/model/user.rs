use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::permission::{parse_stored_permissions, to_strings};
use crate::model::role::Role;

#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
    pub role_id: u8,
    pub permissions: sqlx::types::Json<Vec<String>>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

pub const USER_COLUMNS: &str =
    "id, username, password, full_name, role_id, permissions, is_active, last_login_at, created_at";

/// What the API returns for a user; the password hash never leaves the server.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: u64,
    #[schema(example = "hr.manager")]
    pub username: String,
    pub full_name: Option<String>,
    #[schema(value_type = String, example = "hr")]
    pub role: Role,
    /// Grants stored on top of the role defaults
    #[schema(example = json!(["payroll:read"]))]
    pub permissions: Vec<String>,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_login_at: Option<DateTime<Utc>>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        let stored = parse_stored_permissions(&user.permissions.0);
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            role: Role::from_id(user.role_id).unwrap_or(Role::Viewer),
            permissions: to_strings(&stored),
            is_active: user.is_active,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
        }
    }
}
