//! Token metadata and revocation storage for PostgreSQL.
//!
//! Token rows are append-only apart from the revocation columns. Batch
//! inserts skip existing identifiers, and revocation upserts, so the two may
//! land in either order and the row ends up revoked.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use sqlx_core::query_scalar::query_scalar;
use time::OffsetDateTime;

use tollgate_auth::{RevocationRecord, TokenRecord};

use crate::{PgPool, StorageResult};

const INSERT_TOKEN: &str = r#"
    INSERT INTO tokens (token_id, client_id, issued_at, expires_at, revoked, revoked_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (token_id) DO NOTHING
"#;

type TokenTuple = (
    String,
    String,
    OffsetDateTime,
    OffsetDateTime,
    bool,
    Option<OffsetDateTime>,
);

/// Token storage operations.
pub struct TokenStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> TokenStorage<'a> {
    /// Create a new token storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert one token row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database insert fails.
    pub async fn insert(&self, record: &TokenRecord) -> StorageResult<()> {
        query(INSERT_TOKEN)
            .bind(&record.token_id)
            .bind(&record.client_id)
            .bind(record.issued_at)
            .bind(record.expires_at)
            .bind(record.revoked)
            .bind(record.revoked_at)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Insert token rows in one transaction.
    ///
    /// Either every row is committed or, on error, none is.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert or the commit fails.
    pub async fn insert_batch(&self, records: &[TokenRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            query(INSERT_TOKEN)
                .bind(&record.token_id)
                .bind(&record.client_id)
                .bind(record.issued_at)
                .bind(record.expires_at)
                .bind(record.revoked)
                .bind(record.revoked_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::debug!(count = records.len(), "Token batch committed");
        Ok(())
    }

    /// Mark a token revoked, inserting the row if it is not stored yet.
    ///
    /// Idempotent; the first `revoked_at` wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn revoke(&self, revocation: &RevocationRecord) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO tokens (token_id, client_id, issued_at, expires_at, revoked, revoked_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            ON CONFLICT (token_id) DO UPDATE
               SET revoked = TRUE,
                   revoked_at = COALESCE(tokens.revoked_at, EXCLUDED.revoked_at)
            "#,
        )
        .bind(&revocation.token_id)
        .bind(&revocation.client_id)
        .bind(revocation.issued_at)
        .bind(revocation.expires_at)
        .bind(revocation.revoked_at)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Check whether a token is revoked. Unknown tokens are not.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn is_revoked(&self, token_id: &str) -> StorageResult<bool> {
        let revoked: Option<bool> =
            query_scalar("SELECT revoked FROM tokens WHERE token_id = $1")
                .bind(token_id)
                .fetch_optional(self.pool)
                .await?;
        Ok(revoked.unwrap_or(false))
    }

    /// Fetch one token row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find(&self, token_id: &str) -> StorageResult<Option<TokenRecord>> {
        let row: Option<TokenTuple> = query_as(
            r#"
            SELECT token_id, client_id, issued_at, expires_at, revoked, revoked_at
            FROM tokens
            WHERE token_id = $1
            "#,
        )
        .bind(token_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| TokenRecord {
            token_id: r.0,
            client_id: r.1,
            issued_at: r.2,
            expires_at: r.3,
            revoked: r.4,
            revoked_at: r.5,
        }))
    }
}
