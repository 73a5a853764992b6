use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::{
    extractors::{permissions::WARD_MANAGERS, RequestContext},
    models::{Bill, BillStatus, CreateBillInput, Role},
    services::occupancy,
    AppError, AppResult, AppState,
};

/// GET /api/patients/{id}/bills
#[utoipa::path(
    get,
    path = "/api/patients/{id}/bills",
    params(
        ("id" = i32, Path, description = "Patient user ID")
    ),
    responses(
        (status = 200, description = "Bills for the patient, newest first", body = Vec<Bill>),
        (status = 403, description = "Not your record")
    ),
    tag = "billing",
    security(("bearer_auth" = []))
)]
pub async fn get_patient_bills(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Vec<Bill>>> {
    ctx.require_patient_access(patient_id)?;

    let bills = sqlx::query_as::<_, Bill>(
        r#"SELECT * FROM "Bills" WHERE patient_id = $1 ORDER BY created_at DESC"#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(bills))
}

/// POST /api/bills
#[utoipa::path(
    post,
    path = "/api/bills",
    request_body = CreateBillInput,
    responses(
        (status = 200, description = "Bill raised", body = Bill),
        (status = 400, description = "Invalid amount or description, or admission belongs to another patient"),
        (status = 403, description = "Staff or admin only")
    ),
    tag = "billing",
    security(("bearer_auth" = []))
)]
pub async fn create_bill(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(input): Json<CreateBillInput>,
) -> AppResult<Json<Bill>> {
    ctx.require_any(WARD_MANAGERS)?;

    if input.description.trim().is_empty() {
        return Err(AppError::BadRequest("description is required".to_string()));
    }
    if input.amount_cents < 0 {
        return Err(AppError::BadRequest("amount_cents cannot be negative".to_string()));
    }

    let mut tx = state.db.begin().await?;
    occupancy::lock_user_with_role(&mut tx, input.patient_id, Role::Patient).await?;

    if let Some(admission_id) = input.admission_id {
        occupancy::require_admission_of(&mut tx, admission_id, input.patient_id).await?;
    }

    let bill = sqlx::query_as::<_, Bill>(
        r#"
        INSERT INTO "Bills" (patient_id, admission_id, description, amount_cents)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(input.patient_id)
    .bind(input.admission_id)
    .bind(input.description.trim())
    .bind(input.amount_cents)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(bill_id = bill.id, patient_id = bill.patient_id, amount_cents = bill.amount_cents, "Bill raised");

    Ok(Json(bill))
}

/// POST /api/bills/{id}/pay
#[utoipa::path(
    post,
    path = "/api/bills/{id}/pay",
    params(
        ("id" = i32, Path, description = "Bill ID")
    ),
    responses(
        (status = 200, description = "Bill marked paid", body = Bill),
        (status = 403, description = "Staff or admin only"),
        (status = 404, description = "Bill not found"),
        (status = 409, description = "Bill already paid")
    ),
    tag = "billing",
    security(("bearer_auth" = []))
)]
pub async fn pay_bill(
    State(state): State<Arc<AppState>>,
    Path(bill_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Bill>> {
    ctx.require_any(WARD_MANAGERS)?;

    let bill = sqlx::query_as::<_, Bill>(
        r#"
        UPDATE "Bills" SET status = $1, paid_at = NOW()
        WHERE id = $2 AND status = $3
        RETURNING *
        "#,
    )
    .bind(BillStatus::Paid)
    .bind(bill_id)
    .bind(BillStatus::Unpaid)
    .fetch_optional(&state.db)
    .await?;

    match bill {
        Some(bill) => {
            tracing::info!(bill_id, paid_by = ctx.user_id, "Bill paid");
            Ok(Json(bill))
        }
        None => {
            let exists: bool = sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM "Bills" WHERE id = $1)"#)
                .bind(bill_id)
                .fetch_one(&state.db)
                .await?;
            if exists {
                Err(AppError::Conflict(format!("Bill {} is already paid", bill_id)))
            } else {
                Err(AppError::NotFound(format!("Bill {} not found", bill_id)))
            }
        }
    }
}
