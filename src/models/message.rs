use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: i32,
    pub sender_id: i32,
    pub recipient_id: i32,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub sender_display_id: Option<String>, // From JOIN with Users table
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SendMessageInput {
    pub recipient_id: i32,
    pub body: String,
}
