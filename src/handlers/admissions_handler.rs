use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    extractors::{permissions::WARD_MANAGERS, RequestContext},
    models::{Admission, AdmissionCharges, Bill, Role},
    AppError, AppResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetAdmissionsQuery {
    /// Only admissions without a discharge timestamp
    pub open: Option<bool>,
    pub patient_id: Option<i32>,
}

/// GET /api/admissions?open=&patient_id=
#[utoipa::path(
    get,
    path = "/api/admissions",
    params(GetAdmissionsQuery),
    responses(
        (status = 200, description = "Admissions, newest first. Patients only see their own.", body = Vec<Admission>)
    ),
    tag = "admissions",
    security(("bearer_auth" = []))
)]
pub async fn get_admissions(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<GetAdmissionsQuery>,
) -> AppResult<Json<Vec<Admission>>> {
    // Patients are always scoped to themselves.
    let patient_id = if ctx.role == Role::Patient {
        Some(ctx.user_id)
    } else {
        query.patient_id
    };

    let admissions = sqlx::query_as::<_, Admission>(
        r#"
        SELECT * FROM "Admissions"
        WHERE ($1::int IS NULL OR patient_id = $1)
          AND ($2::bool IS NULL OR (discharged_at IS NULL) = $2)
        ORDER BY admitted_at DESC
        "#,
    )
    .bind(patient_id)
    .bind(query.open)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(admissions))
}

pub(crate) async fn fetch_admission(db: &sqlx::PgPool, admission_id: i32) -> AppResult<Admission> {
    sqlx::query_as::<_, Admission>(r#"SELECT * FROM "Admissions" WHERE id = $1"#)
        .bind(admission_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Admission {} not found", admission_id)))
}

/// Only a closed stay has a final charge; the stay bill is raised once.
fn check_invoiceable(admission: &Admission) -> AppResult<()> {
    if admission.is_open() {
        return Err(AppError::Conflict(format!(
            "Admission {} is still open; invoice the stay after discharge",
            admission.id
        )));
    }

    Ok(())
}

async fn compute_charges(db: &sqlx::PgPool, admission: &Admission) -> AppResult<AdmissionCharges> {
    let price_per_day_cents: i64 =
        sqlx::query_scalar(r#"SELECT price_per_day_cents FROM "Accommodations" WHERE id = $1"#)
            .bind(admission.accommodation_id)
            .fetch_one(db)
            .await?;

    Ok(AdmissionCharges::compute(admission, price_per_day_cents, Utc::now()))
}

/// GET /api/admissions/{id}
#[utoipa::path(
    get,
    path = "/api/admissions/{id}",
    params(
        ("id" = i32, Path, description = "Admission ID")
    ),
    responses(
        (status = 200, description = "Admission found", body = Admission),
        (status = 403, description = "Not your admission"),
        (status = 404, description = "Admission not found")
    ),
    tag = "admissions",
    security(("bearer_auth" = []))
)]
pub async fn get_admission(
    State(state): State<Arc<AppState>>,
    Path(admission_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Admission>> {
    let admission = fetch_admission(&state.db, admission_id).await?;
    ctx.require_patient_access(admission.patient_id)?;

    Ok(Json(admission))
}

/// GET /api/admissions/{id}/charges
#[utoipa::path(
    get,
    path = "/api/admissions/{id}/charges",
    params(
        ("id" = i32, Path, description = "Admission ID")
    ),
    responses(
        (status = 200, description = "Stay charge so far (or in full, once discharged)", body = AdmissionCharges),
        (status = 404, description = "Admission not found")
    ),
    tag = "admissions",
    security(("bearer_auth" = []))
)]
pub async fn get_admission_charges(
    State(state): State<Arc<AppState>>,
    Path(admission_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<AdmissionCharges>> {
    let admission = fetch_admission(&state.db, admission_id).await?;
    ctx.require_patient_access(admission.patient_id)?;

    Ok(Json(compute_charges(&state.db, &admission).await?))
}

/// POST /api/admissions/{id}/invoice - raise a bill for the stay
#[utoipa::path(
    post,
    path = "/api/admissions/{id}/invoice",
    params(
        ("id" = i32, Path, description = "Admission ID")
    ),
    responses(
        (status = 200, description = "Bill raised for the stay charge", body = Bill),
        (status = 403, description = "Staff or admin only"),
        (status = 404, description = "Admission not found"),
        (status = 409, description = "Admission still open, or stay already invoiced")
    ),
    tag = "admissions",
    security(("bearer_auth" = []))
)]
pub async fn create_admission_invoice(
    State(state): State<Arc<AppState>>,
    Path(admission_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Bill>> {
    ctx.require_any(WARD_MANAGERS)?;

    let mut tx = state.db.begin().await?;

    let admission = sqlx::query_as::<_, Admission>(r#"SELECT * FROM "Admissions" WHERE id = $1 FOR UPDATE"#)
        .bind(admission_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Admission {} not found", admission_id)))?;

    check_invoiceable(&admission)?;

    let already_invoiced: bool = sqlx::query_scalar(
        r#"SELECT EXISTS(SELECT 1 FROM "Bills" WHERE admission_id = $1 AND is_stay_charge)"#,
    )
    .bind(admission_id)
    .fetch_one(&mut *tx)
    .await?;
    if already_invoiced {
        return Err(AppError::Conflict(format!(
            "Admission {} has already been invoiced",
            admission_id
        )));
    }

    let price_per_day_cents: i64 =
        sqlx::query_scalar(r#"SELECT price_per_day_cents FROM "Accommodations" WHERE id = $1"#)
            .bind(admission.accommodation_id)
            .fetch_one(&mut *tx)
            .await?;
    let charges = AdmissionCharges::compute(&admission, price_per_day_cents, Utc::now());

    let bill = sqlx::query_as::<_, Bill>(
        r#"
        INSERT INTO "Bills" (patient_id, admission_id, description, amount_cents, is_stay_charge)
        VALUES ($1, $2, $3, $4, TRUE)
        RETURNING *
        "#,
    )
    .bind(admission.patient_id)
    .bind(admission_id)
    .bind(format!("Stay charge: {} day(s)", charges.days))
    .bind(charges.total_cents)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(admission_id, bill_id = bill.id, amount_cents = bill.amount_cents, "Stay invoiced");

    Ok(Json(bill))
}
