use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Role, User};

/// Input for creating a user account of any role
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateUserInput {
    pub role: Role,
    pub full_name: String,
    pub email: Option<String>,
}

/// Request from the identity bridge to open a session for a user
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OpenSessionInput {
    pub display_id: String,
}

/// Response carrying a freshly issued session token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// Response for simple mutations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: Option<String>,
}
