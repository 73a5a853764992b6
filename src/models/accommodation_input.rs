use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{AccommodationKind, AccommodationStatus};

/// Input for registering a bed or room
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateAccommodationInput {
    pub kind: AccommodationKind,
    pub ward_id: Option<i32>,
    pub label: String,
    #[serde(default)]
    pub price_per_day_cents: i64,
}

/// Occupancy command applied to a single accommodation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AccommodationCommand {
    /// Place a patient (and optionally their attending doctor).
    Assign {
        patient_id: i32,
        doctor_id: Option<i32>,
    },
    /// Remove the current occupant; the resulting status must be given.
    Release { next_status: AccommodationStatus },
    /// Change status of an unoccupied accommodation.
    SetStatus { status: AccommodationStatus },
}

impl AccommodationCommand {
    pub fn name(&self) -> &'static str {
        match self {
            AccommodationCommand::Assign { .. } => "assign",
            AccommodationCommand::Release { .. } => "release",
            AccommodationCommand::SetStatus { .. } => "set_status",
        }
    }
}
