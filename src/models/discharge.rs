use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::ClearanceStep;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DischargeClearance {
    pub id: i32,
    pub admission_id: i32,
    pub step: ClearanceStep,
    pub is_cleared: bool,
    pub cleared_by: Option<i32>,
    pub cleared_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Where an admission sits in the discharge workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DischargeProgress {
    NotInitiated,
    Pending,
    NursingCleared,
    PharmacyCleared,
    BillingCleared,
    Finalized,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DischargeStatus {
    pub admission_id: i32,
    pub progress: DischargeProgress,
    pub discharged_at: Option<DateTime<Utc>>,
    pub clearances: Vec<DischargeClearance>,
}

/// Input for signing off one clearance step
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ClearStepInput {
    pub notes: Option<String>,
}
