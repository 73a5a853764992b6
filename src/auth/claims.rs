use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    pub sub: String,         // Users.id
    pub sid: Uuid,           // Session id tracked by the SessionStore
    pub role: Role,
    pub display_id: String,
    pub exp: i64,            // Expiration timestamp
    pub iat: i64,            // Issued at timestamp
}

impl SessionClaims {
    pub fn user_id(&self) -> Option<i32> {
        self.sub.parse().ok()
    }
}
