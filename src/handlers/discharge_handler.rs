use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{
    extractors::{
        permissions::{CLINICIANS, WARD_MANAGERS},
        RequestContext,
    },
    models::{Admission, ClearStepInput, ClearanceStep, DischargeClearance, DischargeStatus},
    services::clearance,
    AppError, AppResult, AppState,
};

use super::admissions_handler::fetch_admission;

async fn load_status(db: &sqlx::PgPool, admission: &Admission) -> AppResult<DischargeStatus> {
    let clearances = sqlx::query_as::<_, DischargeClearance>(
        r#"SELECT * FROM "DischargeClearances" WHERE admission_id = $1"#,
    )
    .bind(admission.id)
    .fetch_all(db)
    .await?;
    let clearances = clearance::sort_by_step(clearances);

    Ok(DischargeStatus {
        admission_id: admission.id,
        progress: clearance::progress(&clearances, admission.discharged_at),
        discharged_at: admission.discharged_at,
        clearances,
    })
}

/// GET /api/admissions/{id}/discharge
#[utoipa::path(
    get,
    path = "/api/admissions/{id}/discharge",
    params(
        ("id" = i32, Path, description = "Admission ID")
    ),
    responses(
        (status = 200, description = "Discharge progress and clearance rows", body = DischargeStatus),
        (status = 404, description = "Admission not found")
    ),
    tag = "discharge",
    security(("bearer_auth" = []))
)]
pub async fn get_discharge_status(
    State(state): State<Arc<AppState>>,
    Path(admission_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<DischargeStatus>> {
    let admission = fetch_admission(&state.db, admission_id).await?;
    ctx.require_patient_access(admission.patient_id)?;

    Ok(Json(load_status(&state.db, &admission).await?))
}

/// POST /api/admissions/{id}/discharge - start the clearance workflow
#[utoipa::path(
    post,
    path = "/api/admissions/{id}/discharge",
    params(
        ("id" = i32, Path, description = "Admission ID")
    ),
    responses(
        (status = 200, description = "Clearance rows created, all pending", body = DischargeStatus),
        (status = 403, description = "Doctor, staff or admin only"),
        (status = 404, description = "Admission not found"),
        (status = 409, description = "Already discharged or already initiated")
    ),
    tag = "discharge",
    security(("bearer_auth" = []))
)]
pub async fn initiate_discharge(
    State(state): State<Arc<AppState>>,
    Path(admission_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<DischargeStatus>> {
    ctx.require_any(CLINICIANS)?;

    let mut tx = state.db.begin().await?;
    clearance::initiate_discharge(&mut tx, ctx.user_id, admission_id).await?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, admission_id, "Transaction rollback in initiate_discharge");
        AppError::Internal(format!("Failed to initiate discharge for admission {}", admission_id))
    })?;

    let admission = fetch_admission(&state.db, admission_id).await?;
    Ok(Json(load_status(&state.db, &admission).await?))
}

/// POST /api/admissions/{id}/discharge/{step} - sign off one clearance step
#[utoipa::path(
    post,
    path = "/api/admissions/{id}/discharge/{step}",
    params(
        ("id" = i32, Path, description = "Admission ID"),
        ("step" = ClearanceStep, Path, description = "nursing, pharmacy or billing")
    ),
    request_body = ClearStepInput,
    responses(
        (status = 200, description = "Step cleared; finalized when it was the last one", body = DischargeStatus),
        (status = 403, description = "Staff or admin only"),
        (status = 404, description = "Admission not found"),
        (status = 409, description = "Not initiated, step already cleared, or admission already discharged"),
        (status = 422, description = "Prerequisite step not yet cleared")
    ),
    tag = "discharge",
    security(("bearer_auth" = []))
)]
pub async fn clear_step(
    State(state): State<Arc<AppState>>,
    Path((admission_id, step)): Path<(i32, ClearanceStep)>,
    ctx: RequestContext,
    Json(input): Json<ClearStepInput>,
) -> AppResult<Json<DischargeStatus>> {
    ctx.require_any(WARD_MANAGERS)?;

    let notes = input
        .notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let mut tx = state.db.begin().await?;
    let outcome = clearance::clear_step(&mut tx, ctx.user_id, admission_id, step, notes).await?;

    tx.commit().await.map_err(|e| {
        tracing::error!(
            error = %e,
            admission_id,
            step = %step,
            "Transaction rollback in clear_step"
        );
        AppError::Internal(format!(
            "Failed to record {} clearance for admission {}",
            step, admission_id
        ))
    })?;

    let discharged_at = outcome.finalized.as_ref().and_then(|a| a.discharged_at);

    Ok(Json(DischargeStatus {
        admission_id,
        progress: clearance::progress(&outcome.clearances, discharged_at),
        discharged_at,
        clearances: outcome.clearances,
    }))
}
