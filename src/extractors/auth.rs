use axum::{extract::FromRequestParts, http::request::Parts, RequestPartsExt};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{auth, models::Role, AppError, AppState};

/// Authenticated caller for the current request.
///
/// Built from the bearer session token and handed to each handler that needs
/// it; nothing about the caller is kept outside the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: i32,
    pub display_id: String,
    pub role: Role,
    pub session_id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized("Missing bearer session token".to_string()))?;

        let claims = auth::validate_token(bearer.token(), &state.config.session_secret)
            .map_err(AppError::Unauthorized)?;

        let user_id = claims
            .user_id()
            .ok_or_else(|| AppError::Unauthorized("Malformed session subject".to_string()))?;

        if !state.sessions.touch(&claims.sid, user_id).await {
            tracing::debug!(user_id, sid = %claims.sid, "Session expired or closed");
            return Err(AppError::Unauthorized(
                "Session expired, please sign in again".to_string(),
            ));
        }

        Ok(RequestContext {
            user_id,
            display_id: claims.display_id,
            role: claims.role,
            session_id: claims.sid,
        })
    }
}
