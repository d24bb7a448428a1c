//! PostgreSQL refresh-token repository.
//!
//! Rotation is one transaction: a compare-and-swap `UPDATE … WHERE revoked =
//! false` on the parent followed by the child `INSERT`. If the update
//! touches no row, the transaction is rolled back and the caller sees
//! [`RotateOutcome::AlreadyRevoked`].

use crate::error::{IdentityError, Result};
use crate::model::{RefreshTokenRecord, UserId};
use crate::providers::{RefreshTokenRepository, RotateOutcome};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

const SELECT_COLUMNS: &str = "id, user_id, family_id, token_hash, revoked, expires_at, \
                              created_at, last_used_at, user_agent, ip_address";

/// PostgreSQL refresh-token repository.
#[derive(Clone)]
pub struct PostgresRefreshTokenRepository {
    pool: PgPool,
}

impl PostgresRefreshTokenRepository {
    /// Create a new repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: row.get("id"),
            user_id: UserId(row.get("user_id")),
            family_id: row.get("family_id"),
            token_hash: row.get("token_hash"),
            revoked: row.get("revoked"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
            last_used_at: row.get("last_used_at"),
            user_agent: row.get("user_agent"),
            ip_address: row.get("ip_address"),
        }
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        record: &RefreshTokenRecord,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO refresh_tokens
                (id, user_id, family_id, token_hash, revoked, expires_at,
                 created_at, last_used_at, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(&record.id)
        .bind(record.user_id.0)
        .bind(&record.family_id)
        .bind(&record.token_hash)
        .bind(record.revoked)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.last_used_at)
        .bind(&record.user_agent)
        .bind(&record.ip_address)
        .execute(&mut **tx)
        .await
        .map(|_| ())
    }
}

fn db_error(context: &str, e: &sqlx::Error) -> IdentityError {
    IdentityError::Database(format!("{context}: {e}"))
}

impl RefreshTokenRepository for PostgresRefreshTokenRepository {
    async fn create(&self, record: &RefreshTokenRecord) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", &e))?;
        Self::insert(&mut tx, record)
            .await
            .map_err(|e| db_error("Failed to create refresh token", &e))?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit refresh token", &e))
    }

    async fn find(&self, id: &str) -> Result<Option<RefreshTokenRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM refresh_tokens WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get refresh token", &e))?;

        Ok(row.as_ref().map(Self::row_to_record))
    }

    async fn rotate(
        &self,
        parent_id: &str,
        child: &RefreshTokenRecord,
        now: DateTime<Utc>,
    ) -> Result<RotateOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", &e))?;

        let revoked = sqlx::query(
            r"
            UPDATE refresh_tokens
            SET revoked = TRUE, last_used_at = $2
            WHERE id = $1 AND revoked = FALSE
            ",
        )
        .bind(parent_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to revoke parent token", &e))?
        .rows_affected();

        if revoked == 0 {
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back rotation", &e))?;
            return Ok(RotateOutcome::AlreadyRevoked);
        }

        Self::insert(&mut tx, child)
            .await
            .map_err(|e| db_error("Failed to insert rotated token", &e))?;
        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit rotation", &e))?;

        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1 AND revoked = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to revoke refresh token", &e))?
        .rows_affected();

        Ok(affected > 0)
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64> {
        let affected = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE family_id = $1 AND revoked = FALSE",
        )
        .bind(family_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to revoke token family", &e))?
        .rows_affected();

        Ok(affected)
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> Result<u64> {
        let affected = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE",
        )
        .bind(user_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to revoke user tokens", &e))?
        .rows_affected();

        Ok(affected)
    }

    async fn list_active(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM refresh_tokens \
             WHERE user_id = $1 AND revoked = FALSE AND expires_at > $2 \
             ORDER BY last_used_at DESC"
        ))
        .bind(user_id.0)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list sessions", &e))?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let affected = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete expired tokens", &e))?
            .rows_affected();

        Ok(affected)
    }
}
