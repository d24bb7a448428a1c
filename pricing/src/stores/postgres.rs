//! PostgreSQL rule repository.
//!
//! ```rust,ignore
//! let pool = PgPool::connect("postgresql://localhost/pricing").await?;
//! let repo = PostgresRuleRepository::new(pool);
//! repo.migrate().await?;
//! ```

use crate::error::{PricingError, Result};
use crate::model::Rule;
use crate::providers::{RuleRepository, RuleScope};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

const SELECT_COLUMNS: &str = "id, organization_id, name, description, condition, multiplier, \
                              priority, is_active, created_at, updated_at";

/// PostgreSQL rule repository.
#[derive(Clone)]
pub struct PostgresRuleRepository {
    pool: PgPool,
}

impl PostgresRuleRepository {
    /// Create a new repository on `pool`.
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
        let mut migrator = sqlx::migrate!("./migrations");
        migrator
            .set_ignore_missing(true)
            .run(&self.pool)
            .await
            .map_err(|e| PricingError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    fn row_to_rule(row: &PgRow) -> Rule {
        Rule {
            id: row.get("id"),
            organization_id: row.get("organization_id"),
            name: row.get("name"),
            description: row.get("description"),
            condition: row.get("condition"),
            multiplier: row.get("multiplier"),
            priority: row.get("priority"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

fn db_error(context: &str, e: &sqlx::Error) -> PricingError {
    PricingError::Database(format!("{context}: {e}"))
}

impl RuleRepository for PostgresRuleRepository {
    async fn list(&self, scope: &RuleScope, include_inactive: bool) -> Result<Vec<Rule>> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM pricing_rules WHERE TRUE");
        if !include_inactive {
            sql.push_str(" AND is_active = TRUE");
        }
        match scope {
            RuleScope::All => {}
            RuleScope::Global => sql.push_str(" AND organization_id IS NULL"),
            RuleScope::Organization(_) => sql.push_str(" AND organization_id = $1"),
        }
        sql.push_str(" ORDER BY priority ASC, created_at ASC");

        let mut query = sqlx::query(&sql);
        if let RuleScope::Organization(org) = scope {
            query = query.bind(org);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to list pricing rules", &e))?;

        Ok(rows.iter().map(Self::row_to_rule).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Rule>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM pricing_rules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get pricing rule", &e))?;

        Ok(row.as_ref().map(Self::row_to_rule))
    }

    async fn create(&self, rule: &Rule) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO pricing_rules
                (id, organization_id, name, description, condition, multiplier,
                 priority, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(&rule.id)
        .bind(&rule.organization_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.condition)
        .bind(rule.multiplier)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to create pricing rule", &e))?;

        Ok(())
    }

    async fn update(&self, rule: &Rule) -> Result<bool> {
        let affected = sqlx::query(
            r"
            UPDATE pricing_rules
            SET organization_id = $2, name = $3, description = $4, condition = $5,
                multiplier = $6, priority = $7, is_active = $8, updated_at = $9
            WHERE id = $1
            ",
        )
        .bind(&rule.id)
        .bind(&rule.organization_id)
        .bind(&rule.name)
        .bind(&rule.description)
        .bind(&rule.condition)
        .bind(rule.multiplier)
        .bind(rule.priority)
        .bind(rule.is_active)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update pricing rule", &e))?
        .rows_affected();

        Ok(affected > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM pricing_rules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete pricing rule", &e))?
            .rows_affected();

        Ok(affected > 0)
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pricing_rules")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to count pricing rules", &e))?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
