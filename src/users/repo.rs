//! Direct data access for the `users` table. No business rules here.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

const USER_COLUMNS: &str =
    "id, name, email, username, password_hash, phone, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields needed to insert a user. The password arrives already hashed.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub username: &'a str,
    pub password_hash: &'a str,
    pub phone: Option<&'a str>,
    pub is_active: bool,
}

pub async fn create(db: &PgPool, new: &NewUser<'_>) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (name, email, username, password_hash, phone, is_active)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(new.name)
    .bind(new.email)
    .bind(new.username)
    .bind(new.password_hash)
    .bind(new.phone)
    .bind(new.is_active)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn find_by_id(db: &PgPool, id: i64) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"SELECT {USER_COLUMNS} FROM users WHERE id = $1"#
    ))
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"SELECT {USER_COLUMNS} FROM users WHERE email = $1"#
    ))
    .bind(email)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"SELECT {USER_COLUMNS} FROM users WHERE username = $1"#
    ))
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

/// One page of users, newest first, plus the total row count. `page` is
/// 1-based.
pub async fn find_all(db: &PgPool, page: i64, per_page: i64) -> anyhow::Result<(Vec<User>, i64)> {
    let offset = (page.max(1) - 1) * per_page;
    let users = sqlx::query_as::<_, User>(&format!(
        r#"
        SELECT {USER_COLUMNS}
        FROM users
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#
    ))
    .bind(per_page)
    .bind(offset)
    .fetch_all(db)
    .await?;

    let total = count(db).await?;
    Ok((users, total))
}

/// Uniqueness probe. `exclude_id` skips one row, for "unique among other
/// users" checks during edit.
pub async fn exists_by_email(
    db: &PgPool,
    email: &str,
    exclude_id: Option<i64>,
) -> anyhow::Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM users
            WHERE email = $1 AND ($2::BIGINT IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(email)
    .bind(exclude_id)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

pub async fn exists_by_username(
    db: &PgPool,
    username: &str,
    exclude_id: Option<i64>,
) -> anyhow::Result<bool> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM users
            WHERE username = $1 AND ($2::BIGINT IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(username)
    .bind(exclude_id)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

/// Persists every mutable field and bumps `updated_at`, returning the
/// refreshed row.
pub async fn update(db: &PgPool, user: &User) -> anyhow::Result<User> {
    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET name = $1, email = $2, username = $3, password_hash = $4,
            phone = $5, is_active = $6, updated_at = now()
        WHERE id = $7
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.username)
    .bind(&user.password_hash)
    .bind(&user.phone)
    .bind(user.is_active)
    .bind(user.id)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn delete(db: &PgPool, id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn count(db: &PgPool) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn count_active(db: &PgPool) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
        .fetch_one(db)
        .await?;
    Ok(total)
}

pub async fn count_created_between(
    db: &PgPool,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE created_at >= $1 AND created_at < $2",
    )
    .bind(start)
    .bind(end)
    .fetch_one(db)
    .await?;
    Ok(total)
}

pub async fn count_created_after(db: &PgPool, since: OffsetDateTime) -> anyhow::Result<i64> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE created_at >= $1")
        .bind(since)
        .fetch_one(db)
        .await?;
    Ok(total)
}

/// Registration counts grouped by calendar month since `since`, as
/// `(year, month, count)` in chronological order. Months without
/// registrations are absent; the service layer fills the gaps.
pub async fn monthly_registration_counts(
    db: &PgPool,
    since: OffsetDateTime,
) -> anyhow::Result<Vec<(i32, i32, i64)>> {
    let rows = sqlx::query_as::<_, (i32, i32, i64)>(
        r#"
        SELECT CAST(EXTRACT(YEAR FROM created_at) AS INT) AS year,
               CAST(EXTRACT(MONTH FROM created_at) AS INT) AS month,
               COUNT(*) AS count
        FROM users
        WHERE created_at >= $1
        GROUP BY 1, 2
        ORDER BY 1, 2
        "#,
    )
    .bind(since)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
