use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::time::Duration;
use uuid::Uuid;

use super::claims::SessionClaims;
use crate::{models::User, AppError};

/// Sign a session token for `user` bound to session `sid`.
pub fn issue_token(
    user: &User,
    sid: Uuid,
    secret: &str,
    max_age: Duration,
) -> Result<(String, DateTime<Utc>), AppError> {
    let now = Utc::now();
    let max_age = chrono::Duration::from_std(max_age)
        .map_err(|e| AppError::Internal(format!("Invalid session max age: {}", e)))?;
    let expires_at = now + max_age;

    let claims = SessionClaims {
        sub: user.id.to_string(),
        sid,
        role: user.role,
        display_id: user.display_id.clone(),
        exp: expires_at.timestamp(),
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to sign session token: {}", e)))?;

    Ok((token, expires_at))
}

pub fn validate_token(token: &str, secret: &str) -> Result<SessionClaims, String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| format!("Session token validation failed: {}", e))?;

    Ok(token_data.claims)
}
