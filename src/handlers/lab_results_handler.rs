use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{
    extractors::{permissions::CLINICIANS, RequestContext},
    models::{CreateLabResultInput, LabResult, Role},
    services::occupancy,
    AppError, AppResult, AppState,
};

/// GET /api/patients/{id}/lab-results
#[utoipa::path(
    get,
    path = "/api/patients/{id}/lab-results",
    params(
        ("id" = i32, Path, description = "Patient user ID")
    ),
    responses(
        (status = 200, description = "Lab results for the patient, newest first", body = Vec<LabResult>),
        (status = 403, description = "Not your record")
    ),
    tag = "lab-results",
    security(("bearer_auth" = []))
)]
pub async fn get_patient_lab_results(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Vec<LabResult>>> {
    ctx.require_patient_access(patient_id)?;

    let results = sqlx::query_as::<_, LabResult>(
        r#"SELECT * FROM "LabResults" WHERE patient_id = $1 ORDER BY created_at DESC"#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(results))
}

/// POST /api/lab-results
#[utoipa::path(
    post,
    path = "/api/lab-results",
    request_body = CreateLabResultInput,
    responses(
        (status = 200, description = "Result recorded", body = LabResult),
        (status = 400, description = "Missing test name or result"),
        (status = 403, description = "Clinicians only")
    ),
    tag = "lab-results",
    security(("bearer_auth" = []))
)]
pub async fn create_lab_result(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(input): Json<CreateLabResultInput>,
) -> AppResult<Json<LabResult>> {
    ctx.require_any(CLINICIANS)?;

    if input.test_name.trim().is_empty() || input.result.trim().is_empty() {
        return Err(AppError::BadRequest("test_name and result are required".to_string()));
    }

    let mut tx = state.db.begin().await?;
    occupancy::lock_user_with_role(&mut tx, input.patient_id, Role::Patient).await?;

    let result = sqlx::query_as::<_, LabResult>(
        r#"
        INSERT INTO "LabResults" (patient_id, recorded_by, test_name, result, unit)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(input.patient_id)
    .bind(ctx.user_id)
    .bind(input.test_name.trim())
    .bind(input.result.trim())
    .bind(&input.unit)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(result))
}
