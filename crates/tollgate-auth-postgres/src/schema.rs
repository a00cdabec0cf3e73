//! Table bootstrap.

use sqlx_core::query::query;

use crate::{PgPool, StorageResult};

/// DDL statements, applied in order. Each is idempotent.
pub const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        client_id        TEXT PRIMARY KEY,
        client_secret    TEXT NOT NULL,
        access_token_ttl BIGINT NOT NULL DEFAULT 0,
        allowed_scopes   TEXT NOT NULL DEFAULT '[]'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tokens (
        token_id   TEXT PRIMARY KEY,
        client_id  TEXT NOT NULL,
        issued_at  TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        revoked    BOOLEAN NOT NULL DEFAULT FALSE,
        revoked_at TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS tokens_client_id_idx ON tokens (client_id)",
];

/// Creates the tables if they do not exist.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub async fn ensure_schema(pool: &PgPool) -> StorageResult<()> {
    for statement in STATEMENTS {
        query(*statement).execute(pool).await?;
    }
    tracing::debug!(statements = STATEMENTS.len(), "Schema ensured");
    Ok(())
}
