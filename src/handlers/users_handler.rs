use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    extractors::{permissions::CLINICIANS, RequestContext},
    models::{CreateUserInput, Role, User},
    services::display_ids,
    AppError, AppResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetUsersQuery {
    pub role: Option<Role>,
}

/// GET /api/users?role=
#[utoipa::path(
    get,
    path = "/api/users",
    params(GetUsersQuery),
    responses(
        (status = 200, description = "List of users, optionally filtered by role", body = Vec<User>),
        (status = 403, description = "Patients cannot list users")
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn get_users(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<GetUsersQuery>,
) -> AppResult<Json<Vec<User>>> {
    ctx.require_any(CLINICIANS)?;

    let users = match query.role {
        Some(role) => {
            sqlx::query_as::<_, User>(r#"SELECT * FROM "Users" WHERE role = $1 ORDER BY display_id"#)
                .bind(role)
                .fetch_all(&state.db)
                .await?
        }
        None => {
            sqlx::query_as::<_, User>(r#"SELECT * FROM "Users" ORDER BY display_id"#)
                .fetch_all(&state.db)
                .await?
        }
    };

    Ok(Json(users))
}

/// GET /api/users/{id}
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 404, description = "User not found")
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<User>> {
    if ctx.user_id != id {
        ctx.require_any(CLINICIANS)?;
    }

    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM "Users" WHERE id = $1"#)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

    Ok(Json(user))
}

/// POST /api/users - create an account and allocate its display id
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserInput,
    responses(
        (status = 200, description = "User created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Email already used or display ids exhausted")
    ),
    tag = "users",
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(input): Json<CreateUserInput>,
) -> AppResult<Json<User>> {
    ctx.require_any(&[Role::Admin])?;

    let full_name = input.full_name.trim();
    if full_name.is_empty() {
        return Err(AppError::BadRequest("full_name is required".to_string()));
    }

    let email = input
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase);

    if let Some(email) = &email {
        if !email.contains('@') {
            return Err(AppError::BadRequest(format!("Invalid email: {}", email)));
        }
    }

    let mut tx = state.db.begin().await?;

    if let Some(email) = &email {
        let taken: bool =
            sqlx::query_scalar(r#"SELECT EXISTS(SELECT 1 FROM "Users" WHERE email = $1)"#)
                .bind(email)
                .fetch_one(&mut *tx)
                .await?;
        if taken {
            return Err(AppError::Conflict(format!("Email {} is already in use", email)));
        }
    }

    let display_id = display_ids::next_display_id(&mut tx, input.role).await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO "Users" (display_id, role, full_name, email)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(&display_id)
    .bind(input.role)
    .bind(full_name)
    .bind(&email)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| AppError::conflict_on_unique(e, || "Email is already in use".to_string()))?;

    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, display_id = %display_id, "Transaction rollback in create_user");
        AppError::Internal(format!("Failed to commit new user {}", display_id))
    })?;

    tracing::info!(user_id = user.id, display_id = %user.display_id, role = %user.role, created_by = ctx.user_id, "User created");

    Ok(Json(user))
}
