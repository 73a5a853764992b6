//! Bed and room occupancy.
//!
//! Every helper here takes the caller's transaction; the handler owns the
//! unit of work and commits once. The accommodation row is locked with
//! `FOR UPDATE` before any decision is made about it.

use serde_json::json;
use sqlx::{Postgres, Transaction};

use crate::{
    models::{Accommodation, AccommodationCommand, AccommodationStatus, Admission, Role},
    AppError, AppResult,
};

/// Result of applying an [`AccommodationCommand`].
#[derive(Debug)]
pub struct CommandOutcome {
    pub accommodation: Accommodation,
    pub opened: Option<Admission>,
    pub closed: Option<Admission>,
}

// ============================================================================
// Rules
// ============================================================================

pub fn check_assign(
    accommodation: &Accommodation,
    open_admission: Option<&Admission>,
    patient_id: i32,
    clearance_started: bool,
) -> AppResult<()> {
    let holder = open_admission
        .map(|a| a.patient_id)
        .or(accommodation.patient_id);

    if let Some(holder) = holder {
        if holder != patient_id {
            return Err(AppError::Conflict(format!(
                "Accommodation {} already holds an active admission for another patient",
                accommodation.id
            )));
        }
    }

    if accommodation.status == AccommodationStatus::Cleaning {
        return Err(AppError::Conflict(format!(
            "Accommodation {} is being cleaned and cannot be assigned",
            accommodation.id
        )));
    }

    if let (Some(admission), true) = (open_admission, clearance_started) {
        return Err(discharge_pending(admission));
    }

    Ok(())
}

/// An admission under discharge clearance only closes through the clearance
/// endpoints.
fn discharge_pending(admission: &Admission) -> AppError {
    AppError::Conflict(format!(
        "Admission {} is under discharge clearance; complete it via /api/admissions/{}/discharge",
        admission.id, admission.id
    ))
}

pub fn check_release(
    accommodation: &Accommodation,
    open_admission: Option<&Admission>,
    next_status: AccommodationStatus,
    clearance_started: bool,
) -> AppResult<()> {
    if next_status == AccommodationStatus::Occupied {
        return Err(AppError::Validation(
            "next_status must be available, cleaning or reserved".to_string(),
        ));
    }

    if accommodation.patient_id.is_none() && open_admission.is_none() {
        return Err(AppError::Conflict(format!(
            "Accommodation {} has no patient to release",
            accommodation.id
        )));
    }

    if let (Some(admission), true) = (open_admission, clearance_started) {
        return Err(discharge_pending(admission));
    }

    Ok(())
}

pub fn check_set_status(accommodation: &Accommodation, status: AccommodationStatus) -> AppResult<()> {
    if accommodation.patient_id.is_some() {
        return Err(AppError::Conflict(format!(
            "Accommodation {} has a patient assigned; discharge first",
            accommodation.id
        )));
    }

    if status == AccommodationStatus::Occupied {
        return Err(AppError::Validation(
            "Accommodations become occupied only by assigning a patient".to_string(),
        ));
    }

    Ok(())
}

// ============================================================================
// Transactional helpers
// ============================================================================

pub async fn lock_accommodation(
    tx: &mut Transaction<'_, Postgres>,
    accommodation_id: i32,
) -> AppResult<Accommodation> {
    sqlx::query_as::<_, Accommodation>(r#"SELECT * FROM "Accommodations" WHERE id = $1 FOR UPDATE"#)
        .bind(accommodation_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Accommodation {} not found", accommodation_id)))
}

pub async fn open_admission_for(
    tx: &mut Transaction<'_, Postgres>,
    accommodation_id: i32,
) -> AppResult<Option<Admission>> {
    let admission = sqlx::query_as::<_, Admission>(
        r#"SELECT * FROM "Admissions" WHERE accommodation_id = $1 AND discharged_at IS NULL FOR UPDATE"#,
    )
    .bind(accommodation_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(admission)
}

/// Whether discharge clearance rows exist for `admission`. The caller holds
/// the accommodation lock, which initiating a discharge also takes.
async fn clearance_started(
    tx: &mut Transaction<'_, Postgres>,
    admission: Option<&Admission>,
) -> AppResult<bool> {
    let Some(admission) = admission else {
        return Ok(false);
    };

    let started: bool = sqlx::query_scalar(
        r#"SELECT EXISTS(SELECT 1 FROM "DischargeClearances" WHERE admission_id = $1)"#,
    )
    .bind(admission.id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(started)
}

/// Check that `admission_id` is one of `patient_id`'s admissions.
pub async fn require_admission_of(
    tx: &mut Transaction<'_, Postgres>,
    admission_id: i32,
    patient_id: i32,
) -> AppResult<()> {
    let owner: Option<i32> =
        sqlx::query_scalar(r#"SELECT patient_id FROM "Admissions" WHERE id = $1"#)
            .bind(admission_id)
            .fetch_optional(&mut **tx)
            .await?;

    if owner != Some(patient_id) {
        return Err(AppError::BadRequest(format!(
            "Admission {} does not belong to patient {}",
            admission_id, patient_id
        )));
    }

    Ok(())
}

/// Lock an active user and check their role.
pub async fn lock_user_with_role(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i32,
    role: Role,
) -> AppResult<()> {
    let row: Option<(Role, bool)> =
        sqlx::query_as(r#"SELECT role, is_active FROM "Users" WHERE id = $1 FOR UPDATE"#)
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;

    match row {
        None => Err(AppError::NotFound(format!("User {} not found", user_id))),
        Some((_, false)) => Err(AppError::Validation(format!("User {} is inactive", user_id))),
        Some((actual, true)) if actual != role => Err(AppError::Validation(format!(
            "User {} is a {}, expected a {}",
            user_id, actual, role
        ))),
        Some(_) => Ok(()),
    }
}

pub async fn record_event(
    tx: &mut Transaction<'_, Postgres>,
    accommodation_id: i32,
    admission_id: Option<i32>,
    event_type: &str,
    actor_id: Option<i32>,
    details: serde_json::Value,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO "AccommodationEvents" (accommodation_id, admission_id, event_type, actor_id, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(accommodation_id)
    .bind(admission_id)
    .bind(event_type)
    .bind(actor_id)
    .bind(details)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Stamp `discharged_at` on an open admission. Returns `None` if it was
/// already closed.
pub async fn close_admission(
    tx: &mut Transaction<'_, Postgres>,
    admission_id: i32,
) -> AppResult<Option<Admission>> {
    let closed = sqlx::query_as::<_, Admission>(
        r#"
        UPDATE "Admissions"
        SET discharged_at = NOW()
        WHERE id = $1 AND discharged_at IS NULL
        RETURNING *
        "#,
    )
    .bind(admission_id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(closed)
}

/// Clear the occupant and move to `next_status` in one statement, keeping
/// the occupied-iff-patient invariant.
async fn vacate(
    tx: &mut Transaction<'_, Postgres>,
    accommodation_id: i32,
    next_status: AccommodationStatus,
) -> AppResult<Accommodation> {
    let accommodation = sqlx::query_as::<_, Accommodation>(
        r#"
        UPDATE "Accommodations"
        SET status = $1, patient_id = NULL, doctor_id = NULL, updated_at = NOW()
        WHERE id = $2
        RETURNING *
        "#,
    )
    .bind(next_status)
    .bind(accommodation_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(accommodation)
}

pub async fn assign_patient(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    accommodation_id: i32,
    patient_id: i32,
    doctor_id: Option<i32>,
) -> AppResult<CommandOutcome> {
    let accommodation = lock_accommodation(tx, accommodation_id).await?;
    let open = open_admission_for(tx, accommodation_id).await?;
    let started = clearance_started(tx, open.as_ref()).await?;

    check_assign(&accommodation, open.as_ref(), patient_id, started)?;

    lock_user_with_role(tx, patient_id, Role::Patient).await?;
    if let Some(doctor_id) = doctor_id {
        lock_user_with_role(tx, doctor_id, Role::Doctor).await?;
    }

    let elsewhere: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT accommodation_id FROM "Admissions"
        WHERE patient_id = $1 AND discharged_at IS NULL AND accommodation_id <> $2
        "#,
    )
    .bind(patient_id)
    .bind(accommodation_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(other) = elsewhere {
        return Err(AppError::Conflict(format!(
            "Patient {} is already admitted to accommodation {}",
            patient_id, other
        )));
    }

    // Re-assigning the same patient closes the previous stay first.
    let mut closed = None;
    if let Some(previous) = open {
        closed = close_admission(tx, previous.id).await?;
        record_event(
            tx,
            accommodation_id,
            Some(previous.id),
            "discharged",
            Some(actor_id),
            json!({ "patient_id": previous.patient_id, "reason": "reassigned" }),
        )
        .await?;
        tracing::info!(
            accommodation_id,
            admission_id = previous.id,
            "Closed previous admission on reassignment"
        );
    }

    let admission = sqlx::query_as::<_, Admission>(
        r#"
        INSERT INTO "Admissions" (patient_id, doctor_id, accommodation_id)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(accommodation_id)
    .fetch_one(&mut **tx)
    .await?;

    let accommodation = sqlx::query_as::<_, Accommodation>(
        r#"
        UPDATE "Accommodations"
        SET status = 'occupied', patient_id = $1, doctor_id = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(accommodation_id)
    .fetch_one(&mut **tx)
    .await?;

    record_event(
        tx,
        accommodation_id,
        Some(admission.id),
        "admitted",
        Some(actor_id),
        json!({ "patient_id": patient_id, "doctor_id": doctor_id }),
    )
    .await?;

    metrics::counter!("admissions_opened_total").increment(1);
    tracing::info!(
        accommodation_id,
        admission_id = admission.id,
        patient_id,
        "Patient assigned"
    );

    Ok(CommandOutcome {
        accommodation,
        opened: Some(admission),
        closed,
    })
}

pub async fn release_patient(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    accommodation_id: i32,
    next_status: AccommodationStatus,
) -> AppResult<CommandOutcome> {
    let accommodation = lock_accommodation(tx, accommodation_id).await?;
    let open = open_admission_for(tx, accommodation_id).await?;
    let started = clearance_started(tx, open.as_ref()).await?;

    check_release(&accommodation, open.as_ref(), next_status, started)?;

    let mut closed = None;
    if let Some(admission) = &open {
        closed = close_admission(tx, admission.id).await?;
    }

    let updated = vacate(tx, accommodation_id, next_status).await?;

    record_event(
        tx,
        accommodation_id,
        open.as_ref().map(|a| a.id),
        "discharged",
        Some(actor_id),
        json!({
            "patient_id": accommodation.patient_id,
            "next_status": next_status,
            "reason": "released",
        }),
    )
    .await?;

    tracing::info!(
        accommodation_id,
        next_status = %next_status,
        "Accommodation released"
    );

    Ok(CommandOutcome {
        accommodation: updated,
        opened: None,
        closed,
    })
}

pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    accommodation_id: i32,
    status: AccommodationStatus,
) -> AppResult<CommandOutcome> {
    let accommodation = lock_accommodation(tx, accommodation_id).await?;

    check_set_status(&accommodation, status)?;

    let updated = sqlx::query_as::<_, Accommodation>(
        r#"UPDATE "Accommodations" SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *"#,
    )
    .bind(status)
    .bind(accommodation_id)
    .fetch_one(&mut **tx)
    .await?;

    record_event(
        tx,
        accommodation_id,
        None,
        "status_changed",
        Some(actor_id),
        json!({ "from": accommodation.status, "to": status }),
    )
    .await?;

    Ok(CommandOutcome {
        accommodation: updated,
        opened: None,
        closed: None,
    })
}

/// Final step of a cleared discharge: the accommodation goes to cleaning.
pub async fn release_after_discharge(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    admission: &Admission,
) -> AppResult<Accommodation> {
    lock_accommodation(tx, admission.accommodation_id).await?;
    let updated = vacate(tx, admission.accommodation_id, AccommodationStatus::Cleaning).await?;

    record_event(
        tx,
        admission.accommodation_id,
        Some(admission.id),
        "discharge_finalized",
        Some(actor_id),
        json!({ "patient_id": admission.patient_id }),
    )
    .await?;

    Ok(updated)
}

pub async fn apply_command(
    tx: &mut Transaction<'_, Postgres>,
    actor_id: i32,
    accommodation_id: i32,
    command: AccommodationCommand,
) -> AppResult<CommandOutcome> {
    match command {
        AccommodationCommand::Assign {
            patient_id,
            doctor_id,
        } => assign_patient(tx, actor_id, accommodation_id, patient_id, doctor_id).await,
        AccommodationCommand::Release { next_status } => {
            release_patient(tx, actor_id, accommodation_id, next_status).await
        }
        AccommodationCommand::SetStatus { status } => {
            set_status(tx, actor_id, accommodation_id, status).await
        }
    }
}


#[cfg(test)]
mod db_tests {
    use super::*;
    use crate::db::test_support::{insert_bed, insert_user, insert_ward, test_pool};

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_assign_opens_admission() {
        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let patient = insert_user(&pool, Role::Patient).await;
        let doctor = insert_user(&pool, Role::Doctor).await;
        let ward = insert_ward(&pool).await;
        let bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        let outcome = assign_patient(&mut tx, staff, bed, patient, Some(doctor)).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(outcome.accommodation.status, AccommodationStatus::Occupied);
        assert_eq!(outcome.accommodation.patient_id, Some(patient));
        let admission = outcome.opened.unwrap();
        assert!(admission.discharged_at.is_none());
        assert_eq!(admission.accommodation_id, bed);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_assign_over_other_patient_rolls_back() {
        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let first = insert_user(&pool, Role::Patient).await;
        let second = insert_user(&pool, Role::Patient).await;
        let ward = insert_ward(&pool).await;
        let bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        assign_patient(&mut tx, staff, bed, first, None).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let err = assign_patient(&mut tx, staff, bed, second, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        drop(tx);

        let open: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM "Admissions" WHERE accommodation_id = $1 AND discharged_at IS NULL"#,
        )
        .bind(bed)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(open, 1);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_release_closes_admission() {
        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let patient = insert_user(&pool, Role::Patient).await;
        let ward = insert_ward(&pool).await;
        let bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        assign_patient(&mut tx, staff, bed, patient, None).await.unwrap();
        let outcome = release_patient(&mut tx, staff, bed, AccommodationStatus::Reserved)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(outcome.accommodation.status, AccommodationStatus::Reserved);
        assert_eq!(outcome.accommodation.patient_id, None);
        assert!(outcome.closed.unwrap().discharged_at.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_patient_admitted_elsewhere_rejected() {
        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let patient = insert_user(&pool, Role::Patient).await;
        let ward = insert_ward(&pool).await;
        let first_bed = insert_bed(&pool, ward).await;
        let second_bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        assign_patient(&mut tx, staff, first_bed, patient, None).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let err = assign_patient(&mut tx, staff, second_bed, patient, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg.contains("already admitted")));
        drop(tx);

        let status: AccommodationStatus =
            sqlx::query_scalar(r#"SELECT status FROM "Accommodations" WHERE id = $1"#)
                .bind(second_bed)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, AccommodationStatus::Available);
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_reassign_same_patient_reopens_admission() {
        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let patient = insert_user(&pool, Role::Patient).await;
        let doctor = insert_user(&pool, Role::Doctor).await;
        let ward = insert_ward(&pool).await;
        let bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        let first = assign_patient(&mut tx, staff, bed, patient, None).await.unwrap();
        let second = assign_patient(&mut tx, staff, bed, patient, Some(doctor)).await.unwrap();
        tx.commit().await.unwrap();

        let old = first.opened.unwrap();
        let closed = second.closed.unwrap();
        assert_eq!(closed.id, old.id);
        assert!(closed.discharged_at.is_some());

        let new = second.opened.unwrap();
        assert_ne!(new.id, old.id);
        assert!(new.discharged_at.is_none());
        assert_eq!(second.accommodation.doctor_id, Some(doctor));

        let reason: String = sqlx::query_scalar(
            r#"SELECT details->>'reason' FROM "AccommodationEvents" WHERE admission_id = $1 AND event_type = 'discharged'"#,
        )
        .bind(old.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(reason, "reassigned");
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_release_refused_while_clearance_pending() {
        use crate::models::ClearanceStep;
        use crate::services::clearance;

        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let patient = insert_user(&pool, Role::Patient).await;
        let ward = insert_ward(&pool).await;
        let bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        let admission = assign_patient(&mut tx, staff, bed, patient, None)
            .await
            .unwrap()
            .opened
            .unwrap();
        clearance::initiate_discharge(&mut tx, staff, admission.id).await.unwrap();
        clearance::clear_step(&mut tx, staff, admission.id, ClearanceStep::Nursing, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let err = release_patient(&mut tx, staff, bed, AccommodationStatus::Available)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg.contains("discharge clearance")));
        drop(tx);

        let mut tx = pool.begin().await.unwrap();
        let err = assign_patient(&mut tx, staff, bed, patient, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        drop(tx);

        // The workflow can still finish.
        let mut tx = pool.begin().await.unwrap();
        clearance::clear_step(&mut tx, staff, admission.id, ClearanceStep::Pharmacy, None)
            .await
            .unwrap();
        let outcome = clearance::clear_step(&mut tx, staff, admission.id, ClearanceStep::Billing, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(outcome.finalized.is_some());
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_admission_must_belong_to_patient() {
        let pool = test_pool().await;
        let staff = insert_user(&pool, Role::Staff).await;
        let patient = insert_user(&pool, Role::Patient).await;
        let other = insert_user(&pool, Role::Patient).await;
        let ward = insert_ward(&pool).await;
        let bed = insert_bed(&pool, ward).await;

        let mut tx = pool.begin().await.unwrap();
        let admission = assign_patient(&mut tx, staff, bed, patient, None)
            .await
            .unwrap()
            .opened
            .unwrap();

        assert!(require_admission_of(&mut tx, admission.id, patient).await.is_ok());
        let err = require_admission_of(&mut tx, admission.id, other).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = require_admission_of(&mut tx, -1, patient).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
