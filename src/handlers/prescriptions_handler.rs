use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{
    extractors::RequestContext,
    models::{CreatePrescriptionInput, Prescription, Role},
    services::occupancy,
    AppError, AppResult, AppState,
};

/// GET /api/patients/{id}/prescriptions
#[utoipa::path(
    get,
    path = "/api/patients/{id}/prescriptions",
    params(
        ("id" = i32, Path, description = "Patient user ID")
    ),
    responses(
        (status = 200, description = "Prescriptions for the patient, newest first", body = Vec<Prescription>),
        (status = 403, description = "Not your record")
    ),
    tag = "prescriptions",
    security(("bearer_auth" = []))
)]
pub async fn get_patient_prescriptions(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Vec<Prescription>>> {
    ctx.require_patient_access(patient_id)?;

    let prescriptions = sqlx::query_as::<_, Prescription>(
        r#"SELECT * FROM "Prescriptions" WHERE patient_id = $1 ORDER BY created_at DESC"#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(prescriptions))
}

/// POST /api/prescriptions
#[utoipa::path(
    post,
    path = "/api/prescriptions",
    request_body = CreatePrescriptionInput,
    responses(
        (status = 200, description = "Prescription written", body = Prescription),
        (status = 400, description = "Missing medication or dosage, or admission belongs to another patient"),
        (status = 403, description = "Doctors only")
    ),
    tag = "prescriptions",
    security(("bearer_auth" = []))
)]
pub async fn create_prescription(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(input): Json<CreatePrescriptionInput>,
) -> AppResult<Json<Prescription>> {
    ctx.require_any(&[Role::Doctor])?;

    if input.medication.trim().is_empty() || input.dosage.trim().is_empty() {
        return Err(AppError::BadRequest("medication and dosage are required".to_string()));
    }

    let mut tx = state.db.begin().await?;
    occupancy::lock_user_with_role(&mut tx, input.patient_id, Role::Patient).await?;

    if let Some(admission_id) = input.admission_id {
        occupancy::require_admission_of(&mut tx, admission_id, input.patient_id).await?;
    }

    let prescription = sqlx::query_as::<_, Prescription>(
        r#"
        INSERT INTO "Prescriptions" (patient_id, doctor_id, admission_id, medication, dosage, instructions)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(input.patient_id)
    .bind(ctx.user_id)
    .bind(input.admission_id)
    .bind(input.medication.trim())
    .bind(input.dosage.trim())
    .bind(&input.instructions)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(prescription_id = prescription.id, patient_id = input.patient_id, doctor_id = ctx.user_id, "Prescription written");

    Ok(Json(prescription))
}
