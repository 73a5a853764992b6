use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Admission {
    pub id: i32,
    pub patient_id: i32,
    pub doctor_id: Option<i32>,
    pub accommodation_id: i32,
    pub admitted_at: DateTime<Utc>,
    pub discharged_at: Option<DateTime<Utc>>,
}

impl Admission {
    pub fn is_open(&self) -> bool {
        self.discharged_at.is_none()
    }
}

/// Stay charge for an admission, priced per started day.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdmissionCharges {
    pub admission_id: i32,
    pub accommodation_id: i32,
    pub days: i64,
    pub price_per_day_cents: i64,
    pub total_cents: i64,
    pub through: DateTime<Utc>,
}

impl AdmissionCharges {
    pub fn compute(
        admission: &Admission,
        price_per_day_cents: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let through = admission.discharged_at.unwrap_or(now);
        let seconds = (through - admission.admitted_at).num_seconds().max(0);
        let days = ((seconds + 86_399) / 86_400).max(1);

        Self {
            admission_id: admission.id,
            accommodation_id: admission.accommodation_id,
            days,
            price_per_day_cents,
            total_cents: days.saturating_mul(price_per_day_cents),
            through,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn admission(hours: i64, discharged: bool) -> Admission {
        let admitted_at = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        Admission {
            id: 1,
            patient_id: 2,
            doctor_id: None,
            accommodation_id: 12,
            admitted_at,
            discharged_at: discharged.then(|| admitted_at + Duration::hours(hours)),
        }
    }

    #[test]
    fn test_same_day_stay_charges_one_day() {
        let charges = AdmissionCharges::compute(&admission(3, true), 10_000, Utc::now());
        assert_eq!(charges.days, 1);
        assert_eq!(charges.total_cents, 10_000);
    }

    #[test]
    fn test_started_day_is_charged() {
        let charges = AdmissionCharges::compute(&admission(49, true), 10_000, Utc::now());
        assert_eq!(charges.days, 3);
        assert_eq!(charges.total_cents, 30_000);
    }

    #[test]
    fn test_open_admission_runs_to_now() {
        let adm = admission(0, false);
        let now = adm.admitted_at + Duration::hours(24);
        let charges = AdmissionCharges::compute(&adm, 5_000, now);
        assert_eq!(charges.days, 1);
        assert_eq!(charges.through, now);
    }
}
