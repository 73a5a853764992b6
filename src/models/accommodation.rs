use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::{AccommodationKind, AccommodationStatus};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Accommodation {
    pub id: i32,
    pub kind: AccommodationKind,
    pub ward_id: Option<i32>,
    pub label: String,
    pub status: AccommodationStatus,
    pub price_per_day_cents: i64,
    pub patient_id: Option<i32>,
    pub doctor_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the occupancy event log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AccommodationEvent {
    pub id: i32,
    pub accommodation_id: i32,
    pub admission_id: Option<i32>,
    pub event_type: String,
    pub actor_id: Option<i32>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
