use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::IntoParams;

use crate::{
    extractors::RequestContext,
    models::{Message, SendMessageInput, SuccessResponse},
    AppError, AppResult, AppState,
};

const MAX_MESSAGE_LEN: usize = 4_000;

#[derive(Debug, Deserialize, IntoParams)]
pub struct GetMessagesQuery {
    /// Only messages not yet read
    pub unread: Option<bool>,
}

/// GET /api/messages?unread= - caller's inbox
#[utoipa::path(
    get,
    path = "/api/messages",
    params(GetMessagesQuery),
    responses(
        (status = 200, description = "Messages addressed to the caller, newest first", body = Vec<Message>)
    ),
    tag = "messages",
    security(("bearer_auth" = []))
)]
pub async fn get_inbox(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Query(query): Query<GetMessagesQuery>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT m.*, u.display_id AS sender_display_id
        FROM "Messages" m
        LEFT JOIN "Users" u ON m.sender_id = u.id
        WHERE m.recipient_id = $1
          AND (NOT COALESCE($2, FALSE) OR m.read_at IS NULL)
        ORDER BY m.created_at DESC
        "#,
    )
    .bind(ctx.user_id)
    .bind(query.unread)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(messages))
}

/// POST /api/messages
#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = SendMessageInput,
    responses(
        (status = 200, description = "Message sent", body = Message),
        (status = 400, description = "Empty or oversized body, or messaging yourself"),
        (status = 404, description = "Recipient not found")
    ),
    tag = "messages",
    security(("bearer_auth" = []))
)]
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    ctx: RequestContext,
    Json(input): Json<SendMessageInput>,
) -> AppResult<Json<Message>> {
    let body = input.body.trim();
    if body.is_empty() {
        return Err(AppError::BadRequest("Message body is required".to_string()));
    }
    if body.len() > MAX_MESSAGE_LEN {
        return Err(AppError::BadRequest(format!(
            "Message body exceeds {} bytes",
            MAX_MESSAGE_LEN
        )));
    }
    if input.recipient_id == ctx.user_id {
        return Err(AppError::BadRequest("Cannot message yourself".to_string()));
    }

    let recipient_active: Option<bool> =
        sqlx::query_scalar(r#"SELECT is_active FROM "Users" WHERE id = $1"#)
            .bind(input.recipient_id)
            .fetch_optional(&state.db)
            .await?;
    if recipient_active != Some(true) {
        return Err(AppError::NotFound(format!(
            "Recipient {} not found",
            input.recipient_id
        )));
    }

    let message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO "Messages" (sender_id, recipient_id, body)
        VALUES ($1, $2, $3)
        RETURNING *, $4::text AS sender_display_id
        "#,
    )
    .bind(ctx.user_id)
    .bind(input.recipient_id)
    .bind(body)
    .bind(&ctx.display_id)
    .fetch_one(&state.db)
    .await?;

    tracing::debug!(message_id = message.id, sender_id = ctx.user_id, recipient_id = input.recipient_id, "Message sent");

    Ok(Json(message))
}

/// POST /api/messages/{id}/read
#[utoipa::path(
    post,
    path = "/api/messages/{id}/read",
    params(
        ("id" = i32, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message marked read", body = SuccessResponse),
        (status = 404, description = "No such message in your inbox")
    ),
    tag = "messages",
    security(("bearer_auth" = []))
)]
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<i32>,
    ctx: RequestContext,
) -> AppResult<Json<SuccessResponse>> {
    // Only the recipient may mark a message read; others get a 404.
    let result = sqlx::query(
        r#"UPDATE "Messages" SET read_at = COALESCE(read_at, NOW()) WHERE id = $1 AND recipient_id = $2"#,
    )
    .bind(message_id)
    .bind(ctx.user_id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Message {} not found", message_id)));
    }

    Ok(Json(SuccessResponse {
        success: true,
        message: None,
    }))
}
