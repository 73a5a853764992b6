//! Helpers for tests that talk to a real PostgreSQL instance.
//!
//! These tests are `#[ignore]`d by default; run them with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Role;

pub async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let pool = super::create_pool(&url).await.expect("failed to connect to test database");
    super::run_migrations(&pool).await.expect("failed to run migrations");
    pool
}

/// Insert an active user, allocating its display id from the role counter.
pub async fn insert_user(pool: &PgPool, role: Role) -> i32 {
    let mut tx = pool.begin().await.unwrap();
    let display_id = crate::services::display_ids::next_display_id(&mut tx, role)
        .await
        .unwrap();
    let id: i32 = sqlx::query_scalar(
        r#"INSERT INTO "Users" (display_id, role, full_name, email) VALUES ($1, $2, $3, $4) RETURNING id"#,
    )
    .bind(&display_id)
    .bind(role.as_str())
    .bind(format!("Test {}", display_id))
    .bind(format!("{}@test.invalid", Uuid::new_v4()))
    .fetch_one(&mut *tx)
    .await
    .unwrap();
    tx.commit().await.unwrap();
    id
}

pub async fn insert_ward(pool: &PgPool) -> i32 {
    sqlx::query_scalar(r#"INSERT INTO "Wards" (name) VALUES ($1) RETURNING id"#)
        .bind(format!("Ward {}", Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn insert_bed(pool: &PgPool, ward_id: i32) -> i32 {
    sqlx::query_scalar(
        r#"INSERT INTO "Accommodations" (kind, ward_id, label, price_per_day_cents) VALUES ('bed', $1, $2, 15000) RETURNING id"#,
    )
    .bind(ward_id)
    .bind(format!("B-{}", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .unwrap()
}
