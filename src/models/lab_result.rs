use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LabResult {
    pub id: i32,
    pub patient_id: i32,
    pub recorded_by: i32,
    pub test_name: String,
    pub result: String,
    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateLabResultInput {
    pub patient_id: i32,
    pub test_name: String,
    pub result: String,
    pub unit: Option<String>,
}
