//! Role-prefixed sequential identifiers (`A0001`, `D0042`, ...).
//!
//! Each role owns one row in `"RoleCounters"`. Allocation locks that row for
//! the rest of the caller's transaction, so two concurrent allocations for the
//! same role serialize and never observe the same `last_id`.

use sqlx::{Postgres, Transaction};

use crate::{models::Role, AppError, AppResult};

/// Largest number that still fits the four-digit display format.
pub const MAX_DISPLAY_NUMBER: i32 = 9_999;

pub fn format_display_id(role: Role, number: i32) -> String {
    format!("{}{:04}", role.prefix(), number)
}

/// Parse `D0042` back into its role and number.
pub fn parse_display_id(display_id: &str) -> Option<(Role, i32)> {
    let mut chars = display_id.chars();
    let role = match chars.next()? {
        'A' => Role::Admin,
        'D' => Role::Doctor,
        'S' => Role::Staff,
        'U' => Role::Patient,
        _ => return None,
    };

    let digits = chars.as_str();
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((role, digits.parse().ok()?))
}

/// Allocate the next display id for `role` inside `tx`.
///
/// On error the caller must drop (roll back) the transaction.
pub async fn next_display_id(
    tx: &mut Transaction<'_, Postgres>,
    role: Role,
) -> AppResult<String> {
    let prefix = role.prefix().to_string();

    let mut last_id = lock_counter(tx, &prefix).await?;

    if last_id.is_none() {
        tracing::warn!(prefix = %prefix, "Role counter missing, initializing");
        sqlx::query(
            r#"INSERT INTO "RoleCounters" (role_prefix, last_id) VALUES ($1, 0) ON CONFLICT (role_prefix) DO NOTHING"#,
        )
        .bind(&prefix)
        .execute(&mut **tx)
        .await?;

        last_id = lock_counter(tx, &prefix).await?;
    }

    let last_id = last_id.ok_or_else(|| {
        tracing::error!(prefix = %prefix, "Role counter could not be initialized");
        AppError::Internal(format!("No id counter for role {}", role))
    })?;

    let next = last_id + 1;
    if next > MAX_DISPLAY_NUMBER {
        return Err(AppError::Conflict(format!(
            "Display ids for role {} are exhausted",
            role
        )));
    }

    sqlx::query(r#"UPDATE "RoleCounters" SET last_id = $1 WHERE role_prefix = $2"#)
        .bind(next)
        .bind(&prefix)
        .execute(&mut **tx)
        .await?;

    metrics::counter!("display_ids_issued_total", "role" => role.as_str()).increment(1);

    Ok(format_display_id(role, next))
}

async fn lock_counter(
    tx: &mut Transaction<'_, Postgres>,
    prefix: &str,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT last_id FROM "RoleCounters" WHERE role_prefix = $1 FOR UPDATE"#)
        .bind(prefix)
        .fetch_optional(&mut **tx)
        .await
}
