use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::{
    extractors::{
        permissions::{CLINICIANS, WARD_MANAGERS},
        RequestContext,
    },
    models::{
        Accommodation, AccommodationCommand, AccommodationEvent, AccommodationKind,
        AccommodationStatus, Admission, CreateAccommodationInput,
    },
    services::occupancy,
    AppError, AppResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetAccommodationsQuery {
    pub status: Option<AccommodationStatus>,
    pub kind: Option<AccommodationKind>,
    pub ward_id: Option<i32>,
}

/// Response for an applied occupancy command
#[derive(Debug, Serialize, ToSchema)]
pub struct CommandResponse {
    pub accommodation: Accommodation,
    pub opened_admission: Option<Admission>,
    pub closed_admission: Option<Admission>,
}

/// GET /api/accommodations?status=&kind=&ward_id=
#[utoipa::path(
    get,
    path = "/api/accommodations",
    params(GetAccommodationsQuery),
    responses(
        (status = 200, description = "List of beds and rooms", body = Vec<Accommodation>)
    ),
    tag = "accommodations",
    security(("bearer_auth" = []))
)]
pub async fn get_accommodations(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<GetAccommodationsQuery>,
) -> AppResult<Json<Vec<Accommodation>>> {
    ctx.require_any(CLINICIANS)?;

    let mut sql = r#"SELECT * FROM "Accommodations" WHERE 1=1"#.to_string();
    let mut n = 0;

    if query.status.is_some() {
        n += 1;
        sql.push_str(&format!(" AND status = ${}", n));
    }
    if query.kind.is_some() {
        n += 1;
        sql.push_str(&format!(" AND kind = ${}", n));
    }
    if query.ward_id.is_some() {
        n += 1;
        sql.push_str(&format!(" AND ward_id = ${}", n));
    }
    sql.push_str(" ORDER BY ward_id NULLS LAST, label");

    let mut query_builder = sqlx::query_as::<_, Accommodation>(&sql);
    if let Some(status) = query.status {
        query_builder = query_builder.bind(status);
    }
    if let Some(kind) = query.kind {
        query_builder = query_builder.bind(kind);
    }
    if let Some(ward_id) = query.ward_id {
        query_builder = query_builder.bind(ward_id);
    }

    let accommodations = query_builder.fetch_all(&state.db).await?;

    Ok(Json(accommodations))
}

/// GET /api/accommodations/{id}
#[utoipa::path(
    get,
    path = "/api/accommodations/{id}",
    params(
        ("id" = i32, Path, description = "Accommodation ID")
    ),
    responses(
        (status = 200, description = "Accommodation found", body = Accommodation),
        (status = 404, description = "Accommodation not found")
    ),
    tag = "accommodations",
    security(("bearer_auth" = []))
)]
pub async fn get_accommodation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Accommodation>> {
    ctx.require_any(CLINICIANS)?;

    let accommodation = sqlx::query_as::<_, Accommodation>(r#"SELECT * FROM "Accommodations" WHERE id = $1"#)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Accommodation {} not found", id)))?;

    Ok(Json(accommodation))
}

/// POST /api/accommodations - register a bed or room
#[utoipa::path(
    post,
    path = "/api/accommodations",
    request_body = CreateAccommodationInput,
    responses(
        (status = 200, description = "Accommodation created", body = Accommodation),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Staff or admin only"),
        (status = 409, description = "Label already used in this ward")
    ),
    tag = "accommodations",
    security(("bearer_auth" = []))
)]
pub async fn create_accommodation(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(input): Json<CreateAccommodationInput>,
) -> AppResult<Json<Accommodation>> {
    ctx.require_any(WARD_MANAGERS)?;

    let label = input.label.trim();
    if label.is_empty() {
        return Err(AppError::BadRequest("label is required".to_string()));
    }
    if input.price_per_day_cents < 0 {
        return Err(AppError::BadRequest("price_per_day_cents cannot be negative".to_string()));
    }
    if input.kind == AccommodationKind::Bed && input.ward_id.is_none() {
        return Err(AppError::BadRequest("A bed must belong to a ward".to_string()));
    }

    if let Some(ward_id) = input.ward_id {
        let ward_exists: bool = sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM "Wards" WHERE id = $1)"#)
            .bind(ward_id)
            .fetch_one(&state.db)
            .await?;
        if !ward_exists {
            return Err(AppError::BadRequest(format!("Ward {} does not exist", ward_id)));
        }
    }

    let duplicate: bool = sqlx::query_scalar(
        r#"SELECT EXISTS(SELECT 1 FROM "Accommodations" WHERE COALESCE(ward_id, 0) = COALESCE($1, 0) AND label = $2)"#,
    )
    .bind(input.ward_id)
    .bind(label)
    .fetch_one(&state.db)
    .await?;
    if duplicate {
        return Err(AppError::Conflict(format!("Label {} is already in use", label)));
    }

    let accommodation = sqlx::query_as::<_, Accommodation>(
        r#"
        INSERT INTO "Accommodations" (kind, ward_id, label, price_per_day_cents)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(input.kind)
    .bind(input.ward_id)
    .bind(label)
    .bind(input.price_per_day_cents)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, || format!("Label {} is already in use", label)))?;

    tracing::info!(
        accommodation_id = accommodation.id,
        kind = %accommodation.kind,
        created_by = ctx.user_id,
        "Accommodation created"
    );

    Ok(Json(accommodation))
}

/// POST /api/accommodations/{id}/commands - assign, release or change status
#[utoipa::path(
    post,
    path = "/api/accommodations/{id}/commands",
    params(
        ("id" = i32, Path, description = "Accommodation ID")
    ),
    request_body = AccommodationCommand,
    responses(
        (status = 200, description = "Command applied", body = CommandResponse),
        (status = 403, description = "Staff or admin only"),
        (status = 404, description = "Accommodation, patient or doctor not found"),
        (status = 409, description = "Occupied by another patient, being cleaned, or patient must be discharged first"),
        (status = 422, description = "Invalid target status or user role")
    ),
    tag = "accommodations",
    security(("bearer_auth" = []))
)]
pub async fn apply_command(
    State(state): State<Arc<AppState>>,
    Path(accommodation_id): Path<i32>,
    ctx: RequestContext,
    Json(command): Json<AccommodationCommand>,
) -> AppResult<Json<CommandResponse>> {
    ctx.require_any(WARD_MANAGERS)?;

    let action = command.name();
    let mut tx = state.db.begin().await?;

    let outcome = occupancy::apply_command(&mut tx, ctx.user_id, accommodation_id, command).await?;

    tx.commit().await.map_err(|e| {
        tracing::error!(
            error = %e,
            accommodation_id,
            action,
            "Transaction rollback in apply_command"
        );
        AppError::Internal(format!(
            "Failed to commit {} for accommodation {}",
            action, accommodation_id
        ))
    })?;

    Ok(Json(CommandResponse {
        accommodation: outcome.accommodation,
        opened_admission: outcome.opened,
        closed_admission: outcome.closed,
    }))
}

/// GET /api/accommodations/{id}/events
#[utoipa::path(
    get,
    path = "/api/accommodations/{id}/events",
    params(
        ("id" = i32, Path, description = "Accommodation ID")
    ),
    responses(
        (status = 200, description = "Occupancy event log, newest first", body = Vec<AccommodationEvent>)
    ),
    tag = "accommodations",
    security(("bearer_auth" = []))
)]
pub async fn get_accommodation_events(
    State(state): State<Arc<AppState>>,
    Path(accommodation_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<Vec<AccommodationEvent>>> {
    ctx.require_any(CLINICIANS)?;

    let events = sqlx::query_as::<_, AccommodationEvent>(
        r#"SELECT * FROM "AccommodationEvents" WHERE accommodation_id = $1 ORDER BY created_at DESC, id DESC"#,
    )
    .bind(accommodation_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(events))
}
