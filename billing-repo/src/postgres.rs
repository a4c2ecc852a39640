//! PostgreSQL repository adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use billing_types::{
    BillingRepository, DetailsFieldFilter, FilterOp, FindParams, Gateway, RepoError, SortOrder,
    Transaction, TransactionId,
};

use crate::types::{COLUMNS, StoredTransaction, check_update, details_json, stale, write_error};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// `billing_transactions` row with native UUID, JSONB and TIMESTAMPTZ columns.
#[derive(FromRow)]
struct PgTransactionRow {
    id: Uuid,
    tenant_id: Uuid,
    status: String,
    gateway: String,
    quantity: i64,
    refunded_quantity: i64,
    currency: String,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl PgTransactionRow {
    fn into_domain(self) -> Result<Transaction, RepoError> {
        StoredTransaction {
            id: self.id,
            tenant_id: self.tenant_id,
            status: self.status,
            gateway: self.gateway,
            quantity: self.quantity,
            refunded_quantity: self.refunded_quantity,
            currency: self.currency,
            details: self.details,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        }
        .into_domain()
    }
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_billing_transactions_pg.sql"),
        "0001",
    )
    .await
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Renders `details -> 'a' ->> 'b'` over a validated path.
fn json_path(filter: &DetailsFieldFilter) -> Result<String, RepoError> {
    filter.validate()?;
    let mut expr = String::from("details");
    let last = filter.path.len() - 1;
    for (i, segment) in filter.path.iter().enumerate() {
        let arrow = if i == last { "->>" } else { "->" };
        expr.push_str(&format!(" {arrow} '{segment}'"));
    }
    Ok(expr)
}

fn push_find_params(qb: &mut QueryBuilder<'_, Postgres>, params: &FindParams) {
    qb.push(" WHERE 1 = 1");
    if let Some(tenant) = params.tenant_id {
        qb.push(" AND tenant_id = ").push_bind(tenant.into_uuid());
    }
    if let Some(gateway) = params.gateway {
        qb.push(" AND gateway = ").push_bind(gateway.as_str());
    }
    if let Some(status) = params.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl BillingRepository for PostgresRepo {
    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let row: Option<PgTransactionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM billing_transactions WHERE id = $1"
        ))
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(PgTransactionRow::into_domain).transpose()
    }

    async fn get_by_details_fields(
        &self,
        gateway: Gateway,
        filters: &[DetailsFieldFilter],
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM billing_transactions WHERE gateway = "
        ));
        qb.push_bind(gateway.as_str());

        for filter in filters {
            let expr = json_path(filter)?;
            match &filter.op {
                FilterOp::Equal(value) => {
                    qb.push(format!(" AND ({expr}) = ")).push_bind(value.clone());
                }
                FilterOp::Between(from, to) => {
                    qb.push(format!(" AND ({expr})::bigint BETWEEN "))
                        .push_bind(*from)
                        .push(" AND ")
                        .push_bind(*to);
                }
            }
        }
        qb.push(" ORDER BY created_at ASC");

        let rows: Vec<PgTransactionRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(PgTransactionRow::into_domain).collect()
    }

    async fn save(&self, transaction: &Transaction) -> Result<Transaction, RepoError> {
        let details = details_json(transaction)?;

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        // Lock the row so concurrent callbacks for the same transaction
        // apply one after the other.
        let existing: Option<PgTransactionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM billing_transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(transaction.id().into_uuid())
        .fetch_optional(&mut *db_tx)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let saved = match existing {
            Some(row) => {
                let stored = row.into_domain()?;
                check_update(&stored, transaction)?;
                let version = stored.version() + 1;

                let result = sqlx::query(
                    r#"UPDATE billing_transactions
                       SET status = $1, refunded_quantity = $2, details = $3, updated_at = $4, version = $5
                       WHERE id = $6 AND version = $7"#,
                )
                .bind(transaction.status().as_str())
                .bind(transaction.refunded().quantity())
                .bind(&details)
                .bind(transaction.updated_at())
                .bind(version)
                .bind(transaction.id().into_uuid())
                .bind(stored.version())
                .execute(&mut *db_tx)
                .await
                .map_err(write_error)?;
                if result.rows_affected() == 0 {
                    return Err(stale(transaction));
                }
                transaction.clone().with_version(version)
            }
            None if transaction.version() > 0 => return Err(RepoError::NotFound),
            None => {
                sqlx::query(
                    r#"INSERT INTO billing_transactions
                       (id, tenant_id, status, gateway, quantity, refunded_quantity, currency, details, created_at, updated_at, version)
                       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0)"#,
                )
                .bind(transaction.id().into_uuid())
                .bind(transaction.tenant_id().into_uuid())
                .bind(transaction.status().as_str())
                .bind(transaction.gateway().as_str())
                .bind(transaction.amount().quantity())
                .bind(transaction.refunded().quantity())
                .bind(transaction.amount().currency().as_str())
                .bind(&details)
                .bind(transaction.created_at())
                .bind(transaction.updated_at())
                .execute(&mut *db_tx)
                .await
                .map_err(write_error)?;
                transaction.clone().with_version(0)
            }
        };

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        Ok(saved)
    }

    async fn delete(&self, id: TransactionId) -> Result<bool, RepoError> {
        let result = sqlx::query(r#"DELETE FROM billing_transactions WHERE id = $1"#)
            .bind(id.into_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, params: &FindParams) -> Result<i64, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM billing_transactions");
        push_find_params(&mut qb, params);

        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(count)
    }

    async fn get_paginated(&self, params: &FindParams) -> Result<Vec<Transaction>, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM billing_transactions"));
        push_find_params(&mut qb, params);
        qb.push(match params.sort {
            SortOrder::Desc => " ORDER BY created_at DESC",
            SortOrder::Asc => " ORDER BY created_at ASC",
        });
        qb.push(" LIMIT ")
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset);

        let rows: Vec<PgTransactionRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(PgTransactionRow::into_domain).collect()
    }
}
