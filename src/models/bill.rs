use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::BillStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Bill {
    pub id: i32,
    pub patient_id: i32,
    pub admission_id: Option<i32>,
    pub description: String,
    pub amount_cents: i64,
    pub status: BillStatus,
    pub is_stay_charge: bool,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Input for raising a bill
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBillInput {
    pub patient_id: i32,
    pub admission_id: Option<i32>,
    pub description: String,
    pub amount_cents: i64,
}
