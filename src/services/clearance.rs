//! Discharge clearance: nursing, then pharmacy, then billing.
//!
//! Lock order is accommodation, then admission, then clearance rows, matching
//! the occupancy helpers so the two never deadlock against each other.

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{Postgres, Transaction};

use super::occupancy;
use crate::{
    models::{Admission, ClearanceStep, DischargeClearance, DischargeProgress},
    AppError, AppResult,
};

#[derive(Debug)]
pub struct ClearOutcome {
    pub clearances: Vec<DischargeClearance>,
    pub finalized: Option<Admission>,
}

// ============================================================================
// Rules
// ============================================================================

fn is_cleared(clearances: &[DischargeClearance], step: ClearanceStep) -> bool {
    clearances.iter().any(|c| c.step == step && c.is_cleared)
}

pub fn missing_prerequisites(
    clearances: &[DischargeClearance],
    step: ClearanceStep,
) -> Vec<ClearanceStep> {
    step.prerequisites()
        .iter()
        .copied()
        .filter(|pre| !is_cleared(clearances, *pre))
        .collect()
}

pub fn check_can_clear(clearances: &[DischargeClearance], step: ClearanceStep) -> AppResult<()> {
    if clearances.is_empty() {
        return Err(AppError::Conflict(
            "Discharge has not been initiated for this admission".to_string(),
        ));
    }

    let row = clearances
        .iter()
        .find(|c| c.step == step)
        .ok_or_else(|| AppError::Internal(format!("Clearance row for {} is missing", step)))?;

    if row.is_cleared {
        return Err(AppError::Conflict(format!("{} clearance is already signed off", step)));
    }

    let missing = missing_prerequisites(clearances, step);
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(ClearanceStep::as_str).collect();
        return Err(AppError::Validation(format!(
            "Cannot clear {}: {} required",
            step,
            names.join(" and ")
        )));
    }

    Ok(())
}

/// Every defined step has a cleared row.
pub fn is_complete(clearances: &[DischargeClearance]) -> bool {
    ClearanceStep::ALL.iter().all(|step| is_cleared(clearances, *step))
}

pub fn progress(
    clearances: &[DischargeClearance],
    discharged_at: Option<DateTime<Utc>>,
) -> DischargeProgress {
    if clearances.is_empty() {
        return match discharged_at {
            Some(_) => DischargeProgress::Finalized,
            None => DischargeProgress::NotInitiated,
        };
    }

    if discharged_at.is_some() && is_complete(clearances) {
        return DischargeProgress::Finalized;
    }

    let last_cleared = ClearanceStep::ALL
        .iter()
        .take_while(|step| is_cleared(clearances, **step))
        .last();

    match last_cleared {
        None => DischargeProgress::Pending,
        Some(ClearanceStep::Nursing) => DischargeProgress::NursingCleared,
        Some(ClearanceStep::Pharmacy) => DischargeProgress::PharmacyCleared,
        Some(ClearanceStep::Billing) => DischargeProgress::BillingCleared,
    }
}

/// Count out-of-order attempts only; conflicts are not prerequisite failures.
fn record_rejection(step: ClearanceStep, error: &AppError) {
    if matches!(error, AppError::Validation(_)) {
        metrics::counter!("clearance_rejections_total", "step" => step.as_str()).increment(1);
    }
}

pub fn sort_by_step(mut clearances: Vec<DischargeClearance>) -> Vec<DischargeClearance> {
    clearances.sort_by_key(|c| ClearanceStep::ALL.iter().position(|s| *s == c.step));
    clearances
}

// ============================================================================
// Transactional helpers
// ============================================================================

async fn fetch_admission(
    tx: &mut Transaction<'_, Postgres>,
    admission_id: i32,
) -> AppResult<Admission> {
    sqlx::query_as::<_, Admission>(r#"SELECT * FROM "Admissions" WHERE id = $1"#)
        .bind(admission_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Admission {} not found", admission_id)))
}

/// Lock the admission's accommodation and then the admission itself.
async fn lock_admission(
    tx: &mut Transaction<'_, Postgres>,
    admission_id: i32,
) -> AppResult<Admission> {
    let admission = fetch_admission(tx, admission_id).await?;
    occupancy::lock_accommodation(tx, admission.accommodation_id).await?;

    let locked = sqlx::query_as::<_, Admission>(r#"SELECT * FROM "Admissions" WHERE id = $1 FOR UPDATE"#)
        .bind(admission_id)
        .fetch_one(&mut **tx)
        .await?;

    Ok(locked)
}

pub async fn lock_clearances(
    tx: &mut Transaction<'_, Postgres>,
    admission_id: i32,
) -> AppResult<Vec<DischargeClearance>> {
    let rows = sqlx::query_as::<_, DischargeClearance>(
        r#"SELECT * FROM "DischargeClearances" WHERE admission_id = $1 FOR UPDATE"#,
    )
    .bind(admission_id)
    .fetch_all(&mut **tx)
    .await?;

    Ok(sort_by_step(rows))
}

pub async fn initiate_discharge(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    admission_id: i32,
) -> AppResult<Vec<DischargeClearance>> {
    let admission = lock_admission(tx, admission_id).await?;

    if !admission.is_open() {
        return Err(AppError::Conflict(format!(
            "Admission {} is already discharged",
            admission_id
        )));
    }

    if !lock_clearances(tx, admission_id).await?.is_empty() {
        return Err(AppError::Conflict(format!(
            "Discharge already initiated for admission {}",
            admission_id
        )));
    }

    for step in ClearanceStep::ALL {
        sqlx::query(r#"INSERT INTO "DischargeClearances" (admission_id, step) VALUES ($1, $2)"#)
            .bind(admission_id)
            .bind(step)
            .execute(&mut **tx)
            .await?;
    }

    occupancy::record_event(
        tx,
        admission.accommodation_id,
        Some(admission_id),
        "discharge_initiated",
        Some(actor_id),
        json!({ "patient_id": admission.patient_id }),
    )
    .await?;

    tracing::info!(admission_id, actor_id, "Discharge initiated");

    lock_clearances(tx, admission_id).await
}

pub async fn clear_step(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    admission_id: i32,
    step: ClearanceStep,
    notes: Option<String>,
) -> AppResult<ClearOutcome> {
    let admission = lock_admission(tx, admission_id).await?;

    if !admission.is_open() {
        return Err(AppError::Conflict(format!(
            "Admission {} is already discharged",
            admission_id
        )));
    }

    let clearances = lock_clearances(tx, admission_id).await?;

    if let Err(e) = check_can_clear(&clearances, step) {
        record_rejection(step, &e);
        tracing::info!(admission_id, step = %step, error = %e, "Clearance rejected");
        return Err(e);
    }

    sqlx::query(
        r#"
        UPDATE "DischargeClearances"
        SET is_cleared = TRUE, cleared_by = $1, cleared_at = NOW(), notes = $2
        WHERE admission_id = $3 AND step = $4
        "#,
    )
    .bind(actor_id)
    .bind(&notes)
    .bind(admission_id)
    .bind(step)
    .execute(&mut **tx)
    .await?;

    tracing::info!(admission_id, actor_id, step = %step, "Clearance signed off");

    let finalized = finalize_if_complete(tx, actor_id, admission_id).await?;
    let clearances = lock_clearances(tx, admission_id).await?;

    Ok(ClearOutcome {
        clearances,
        finalized,
    })
}

/// Close the admission and send its accommodation to cleaning once every
/// step is cleared. Returns the closed admission, or `None` when there is
/// nothing to do (incomplete, or already finalized).
pub async fn finalize_if_complete(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    admission_id: i32,
) -> AppResult<Option<Admission>> {
    let admission = lock_admission(tx, admission_id).await?;
    if !admission.is_open() {
        return Ok(None);
    }

    let cleared: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "DischargeClearances" WHERE admission_id = $1 AND is_cleared"#,
    )
    .bind(admission_id)
    .fetch_one(&mut **tx)
    .await?;

    if cleared < ClearanceStep::ALL.len() as i64 {
        return Ok(None);
    }

    // Conditional update: a second caller finds discharged_at already set.
    let Some(closed) = occupancy::close_admission(tx, admission_id).await? else {
        return Ok(None);
    };

    occupancy::release_after_discharge(tx, actor_id, &closed).await?;

    metrics::counter!("discharges_finalized_total").increment(1);
    tracing::info!(
        admission_id,
        accommodation_id = closed.accommodation_id,
        patient_id = closed.patient_id,
        "Discharge finalized"
    );

    Ok(Some(closed))
}


#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::db::test_support::{insert_bed, insert_user, insert_ward, test_pool};
    use crate::models::{Accommodation, AccommodationStatus, Role};

    async fn admitted(pool: &sqlx::PgPool) -> (i32, i32, i32) {
        let staff = insert_user(pool, Role::Staff).await;
        let patient = insert_user(pool, Role::Patient).await;
        let doctor = insert_user(pool, Role::Doctor).await;
        let ward = insert_ward(pool).await;
        let bed = insert_bed(pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        let outcome = occupancy::assign_patient(&mut tx, staff, bed, patient, Some(doctor))
            .await
            .unwrap();
        initiate_discharge(&mut tx, doctor, outcome.opened.as_ref().unwrap().id)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        (staff, bed, outcome.opened.unwrap().id)
    }

    async fn clear(
        pool: &sqlx::PgPool,
        staff: i32,
        admission_id: i32,
        step: ClearanceStep,
        notes: &str,
    ) -> AppResult<ClearOutcome> {
        let mut tx = pool.begin().await.unwrap();
        let outcome = clear_step(&mut tx, staff, admission_id, step, Some(notes.to_string())).await?;
        tx.commit().await.unwrap();
        Ok(outcome)
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_full_discharge_scenario() {
        let pool = test_pool().await;
        let (staff, bed, admission_id) = admitted(&pool).await;

        let outcome = clear(&pool, staff, admission_id, ClearanceStep::Nursing, "vitals ok")
            .await
            .unwrap();
        let nursing = &outcome.clearances[0];
        assert!(nursing.is_cleared);
        assert_eq!(nursing.notes.as_deref(), Some("vitals ok"));
        assert_eq!(nursing.cleared_by, Some(staff));

        let err = clear(&pool, staff, admission_id, ClearanceStep::Billing, "early")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("pharmacy required")));

        clear(&pool, staff, admission_id, ClearanceStep::Pharmacy, "meds reconciled")
            .await
            .unwrap();
        let outcome = clear(&pool, staff, admission_id, ClearanceStep::Billing, "paid")
            .await
            .unwrap();

        let finalized = outcome.finalized.expect("discharge should finalize");
        assert!(finalized.discharged_at.is_some());

        let accommodation = sqlx::query_as::<_, Accommodation>(r#"SELECT * FROM "Accommodations" WHERE id = $1"#)
            .bind(bed)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(accommodation.status, AccommodationStatus::Cleaning);
        assert_eq!(accommodation.patient_id, None);
        assert_eq!(accommodation.doctor_id, None);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_out_of_order_leaves_state_unchanged() {
        let pool = test_pool().await;
        let (staff, _, admission_id) = admitted(&pool).await;

        let err = clear(&pool, staff, admission_id, ClearanceStep::Pharmacy, "too soon")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let cleared: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "DischargeClearances" WHERE admission_id = $1 AND is_cleared"#,
        )
        .bind(admission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(cleared, 0);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_finalize_runs_once() {
        let pool = test_pool().await;
        let (staff, _, admission_id) = admitted(&pool).await;

        for step in ClearanceStep::ALL {
            clear(&pool, staff, admission_id, step, "ok").await.unwrap();
        }

        let mut tx = pool.begin().await.unwrap();
        assert!(finalize_if_complete(&mut tx, staff, admission_id).await.unwrap().is_none());
        tx.commit().await.unwrap();

        let finalized_events: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "AccommodationEvents" WHERE admission_id = $1 AND event_type = 'discharge_finalized'"#,
        )
        .bind(admission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(finalized_events, 1);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_initiate_twice_is_conflict() {
        let pool = test_pool().await;
        let (staff, _, admission_id) = admitted(&pool).await;

        let mut tx = pool.begin().await.unwrap();
        let err = initiate_discharge(&mut tx, staff, admission_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg.contains("already initiated")));
        drop(tx);

        let rows: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "DischargeClearances" WHERE admission_id = $1"#,
        )
        .bind(admission_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(rows, ClearanceStep::ALL.len() as i64);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_initiate_on_discharged_admission_is_conflict() {
        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let patient = insert_user(&pool, Role::Patient).await;
        let ward = insert_ward(&pool).await;
        let bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        let admission = occupancy::assign_patient(&mut tx, staff, bed, patient, None)
            .await
            .unwrap()
            .opened
            .unwrap();
        occupancy::release_patient(&mut tx, staff, bed, AccommodationStatus::Available)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let err = initiate_discharge(&mut tx, staff, admission.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg.contains("already discharged")));
    }
}
