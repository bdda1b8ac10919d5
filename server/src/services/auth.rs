//! Join-time authentication seam.
//!
//! DESIGN
//! ======
//! Session issuance lives outside this system; the sync server only
//! verifies that a presented token maps to a known user before admitting
//! the connection to a room. The seam is a trait so the WebSocket layer
//! never touches the database directly and tests can swap in a static
//! table.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid or expired session token")]
    InvalidToken,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// User identity attached to an authenticated session.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuthedUser {
    pub id: Uuid,
    pub username: String,
}

/// Validates session tokens presented during the join handshake.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<AuthedUser, AuthError>;
}

// =============================================================================
// POSTGRES-BACKED AUTHENTICATOR
// =============================================================================

/// Validates tokens against the `sessions`/`users` tables populated by
/// the external session issuer.
pub struct PgAuthenticator {
    pool: PgPool,
}

impl PgAuthenticator {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Authenticator for PgAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<AuthedUser, AuthError> {
        let row = sqlx::query(
            r"SELECT u.id, u.username
              FROM sessions s
              JOIN users u ON u.id = s.user_id
              WHERE s.token = $1 AND s.expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(AuthedUser { id: r.get("id"), username: r.get("username") }),
            None => Err(AuthError::InvalidToken),
        }
    }
}

// =============================================================================
// STATIC AUTHENTICATOR
// =============================================================================

/// Fixed token table for tests and local development.
pub struct StaticAuthenticator {
    tokens: std::collections::HashMap<String, AuthedUser>,
}

impl StaticAuthenticator {
    pub fn new(entries: impl IntoIterator<Item = (String, AuthedUser)>) -> Self {
        Self { tokens: entries.into_iter().collect() }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<AuthedUser, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
