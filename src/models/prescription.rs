use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Prescription {
    pub id: i32,
    pub patient_id: i32,
    pub doctor_id: i32,
    pub admission_id: Option<i32>,
    pub medication: String,
    pub dosage: String,
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePrescriptionInput {
    pub patient_id: i32,
    pub admission_id: Option<i32>,
    pub medication: String,
    pub dosage: String,
    pub instructions: Option<String>,
}
