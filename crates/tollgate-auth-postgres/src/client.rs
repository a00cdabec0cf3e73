//! Client storage for PostgreSQL.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;

use tollgate_auth::{Client, encode_scope_list, parse_scope_list};

use crate::{PgPool, StorageResult};

// =============================================================================
// Types
// =============================================================================

/// Client record from the `clients` table.
#[derive(Debug, Clone)]
pub struct ClientRow {
    /// Client identifier.
    pub client_id: String,
    /// Stored secret (PHC string or plain).
    pub client_secret: String,
    /// Token lifetime in seconds; zero means the service default.
    pub access_token_ttl: i64,
    /// Raw scope list text.
    pub allowed_scopes: String,
}

impl ClientRow {
    fn from_tuple(row: (String, String, i64, String)) -> Self {
        Self {
            client_id: row.0,
            client_secret: row.1,
            access_token_ttl: row.2,
            allowed_scopes: row.3,
        }
    }

    /// Converts into the domain type, parsing the scope list.
    #[must_use]
    pub fn into_client(self) -> Client {
        Client {
            allowed_scopes: parse_scope_list(&self.allowed_scopes),
            client_id: self.client_id,
            client_secret: self.client_secret,
            access_token_ttl: self.access_token_ttl,
        }
    }
}

// =============================================================================
// Client Storage
// =============================================================================

/// Client storage operations.
pub struct ClientStorage<'a> {
    pool: &'a PgPool,
}

impl<'a> ClientStorage<'a> {
    /// Create a new client storage with a connection pool reference.
    #[must_use]
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find a client by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_by_client_id(&self, client_id: &str) -> StorageResult<Option<ClientRow>> {
        let row: Option<(String, String, i64, String)> = query_as(
            r#"
            SELECT client_id, client_secret, access_token_ttl, allowed_scopes
            FROM clients
            WHERE client_id = $1
            "#,
        )
        .bind(client_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(ClientRow::from_tuple))
    }

    /// Insert or replace a client. Scopes are written as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn upsert(&self, client: &Client) -> StorageResult<()> {
        query(
            r#"
            INSERT INTO clients (client_id, client_secret, access_token_ttl, allowed_scopes)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (client_id) DO UPDATE
               SET client_secret = EXCLUDED.client_secret,
                   access_token_ttl = EXCLUDED.access_token_ttl,
                   allowed_scopes = EXCLUDED.allowed_scopes
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.client_secret)
        .bind(client.access_token_ttl)
        .bind(encode_scope_list(&client.allowed_scopes))
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Delete a client. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn delete(&self, client_id: &str) -> StorageResult<bool> {
        let result = query("DELETE FROM clients WHERE client_id = $1")
            .bind(client_id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
