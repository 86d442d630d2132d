use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::auth::hash_password;

pub mod outbox;
pub mod pg_store;

pub use outbox::OutboxNotifier;
pub use pg_store::PgBookingStore;

pub async fn connect_pg(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Creates the staff account if no user with that name exists yet.
pub async fn ensure_staff_account(
    pool: &PgPool,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let exists: bool =
        sqlx::query_scalar(r#"SELECT EXISTS (SELECT 1 FROM app_user WHERE username = $1)"#)
            .bind(username)
            .fetch_one(pool)
            .await?;
    if exists {
        return Ok(());
    }

    let password_hash = hash_password(password).map_err(anyhow::Error::msg)?;
    sqlx::query(
        r#"
        INSERT INTO app_user (username, email, password_hash, is_staff)
        VALUES ($1, $2, $3, true)
        "#,
    )
    .bind(username)
    .bind(format!("{username}@staff.local"))
    .bind(&password_hash)
    .execute(pool)
    .await?;

    tracing::info!(%username, "created bootstrap staff account");
    Ok(())
}

/// `true` for Postgres unique-constraint violations.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// `true` for Postgres foreign-key violations (a protected row is still referenced).
pub fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}
