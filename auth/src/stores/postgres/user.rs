//! PostgreSQL user repository.
//!
//! # Example
//!
//! ```no_run
//! use travio_identity::stores::postgres::PostgresUserRepository;
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PgPool::connect("postgresql://localhost/identity").await?;
//! let repo = PostgresUserRepository::new(pool);
//! repo.migrate().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{IdentityError, Result};
use crate::model::{Role, User, UserId};
use crate::providers::UserRepository;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// PostgreSQL user repository.
#[derive(Clone)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Create a new PostgreSQL user repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations.
    ///
    /// # Errors
    ///
    /// Returns error if migrations fail.
    pub async fn migrate(&self) -> Result<()> {
        // Other services migrate the same database.
        let mut migrator = sqlx::migrate!("./migrations");
        migrator
            .set_ignore_missing(true)
            .run(&self.pool)
            .await
            .map_err(|e| IdentityError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    fn row_to_user(row: &PgRow) -> Result<User> {
        let role: String = row.get("role");
        Ok(User {
            id: UserId(row.get("id")),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            organization_id: row.get("organization_id"),
            role: role
                .parse::<Role>()
                .map_err(|e| IdentityError::Database(format!("Corrupt user row: {e}")))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

impl UserRepository for PostgresUserRepository {
    async fn create(&self, user: &User) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO users
                (id, email, password_hash, organization_id, role, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(user.id.0)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.organization_id)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            match &e {
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                    IdentityError::AlreadyExists
                }
                _ => IdentityError::Database(format!("Failed to create user: {e}")),
            }
        })?;

        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r"
            SELECT id, email, password_hash, organization_id, role, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            ",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IdentityError::Database(format!("Failed to get user: {e}")))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r"
            SELECT id, email, password_hash, organization_id, role, created_at, updated_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IdentityError::Database(format!("Failed to get user: {e}")))?;

        row.as_ref().map(Self::row_to_user).transpose()
    }
}
