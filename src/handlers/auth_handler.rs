use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{
    auth,
    extractors::RequestContext,
    models::{OpenSessionInput, SessionResponse, SuccessResponse, User},
    services::display_ids,
    AppError, AppResult, AppState,
};

/// POST /api/auth/session - identity bridge opens a session for a user
#[utoipa::path(
    post,
    path = "/api/auth/session",
    request_body = OpenSessionInput,
    responses(
        (status = 200, description = "Session opened", body = SessionResponse),
        (status = 400, description = "Malformed display id"),
        (status = 401, description = "Missing or invalid service key, or inactive user")
    ),
    tag = "auth",
    security(("service_key" = []))
)]
pub async fn open_session(
    State(state): State<Arc<AppState>>,
    Json(input): Json<OpenSessionInput>,
) -> AppResult<Json<SessionResponse>> {
    if display_ids::parse_display_id(&input.display_id).is_none() {
        return Err(AppError::BadRequest(format!(
            "Malformed display id: {}",
            input.display_id
        )));
    }

    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM "Users" WHERE display_id = $1"#)
        .bind(&input.display_id)
        .fetch_optional(&state.db)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| {
            tracing::warn!(display_id = %input.display_id, "Session requested for unknown or inactive user");
            AppError::Unauthorized("Unknown or inactive user".to_string())
        })?;

    let sid = state.sessions.open(user.id).await;
    let (token, expires_at) = auth::issue_token(
        &user,
        sid,
        &state.config.session_secret,
        state.config.session_max_age,
    )?;

    tracing::info!(user_id = user.id, display_id = %user.display_id, role = %user.role, "Session opened");

    Ok(Json(SessionResponse {
        token,
        expires_at,
        user,
    }))
}

/// GET /api/auth/me
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current authenticated user", body = User),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> AppResult<Json<User>> {
    let user = sqlx::query_as::<_, User>(r#"SELECT * FROM "Users" WHERE id = $1"#)
        .bind(ctx.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User no longer exists".to_string()))?;

    Ok(Json(user))
}

/// POST /api/auth/logout
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Session closed", body = SuccessResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
) -> AppResult<Json<SuccessResponse>> {
    state.sessions.close(&ctx.session_id).await;
    tracing::info!(user_id = ctx.user_id, "Session closed");

    Ok(Json(SuccessResponse {
        success: true,
        message: Some("Signed out".to_string()),
    }))
}
