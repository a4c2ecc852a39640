//! SQLite repository adapter.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use billing_types::{
    BillingRepository, DetailsFieldFilter, FilterOp, FindParams, Gateway, RepoError, SortOrder,
    Transaction, TransactionId,
};

use crate::types::{
    COLUMNS, StoredTransaction, check_update, details_json, parse_timestamp, stale, timestamp,
    write_error,
};

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001",
    include_str!("../migrations/0001_create_billing_transactions.sql"),
)];

/// `billing_transactions` row as SQLite returns it: ids, timestamps and the
/// details document are all text.
#[derive(FromRow)]
struct SqliteTransactionRow {
    id: String,
    tenant_id: String,
    status: String,
    gateway: String,
    quantity: i64,
    refunded_quantity: i64,
    currency: String,
    details: String,
    created_at: String,
    updated_at: String,
    version: i64,
}

impl SqliteTransactionRow {
    fn into_domain(self) -> Result<Transaction, RepoError> {
        let parse_uuid =
            |s: &str| Uuid::parse_str(s).map_err(|e| RepoError::Database(e.to_string()));
        StoredTransaction {
            id: parse_uuid(&self.id)?,
            tenant_id: parse_uuid(&self.tenant_id)?,
            status: self.status,
            gateway: self.gateway,
            quantity: self.quantity,
            refunded_quantity: self.refunded_quantity,
            currency: self.currency,
            details: serde_json::from_str(&self.details)
                .map_err(|e| RepoError::Database(e.to_string()))?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            version: self.version,
        }
        .into_domain()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        let repo = Self { pool };
        repo.create_schema().await?;
        Ok(repo)
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the database schema (for testing with existing pool).
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        for (name, sql) in MIGRATIONS {
            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| RepoError::Database(format!("migration {name}: {e}")))?;
            }
        }
        Ok(())
    }
}

/// Renders `json_extract` over a validated details path.
fn json_path(filter: &DetailsFieldFilter) -> Result<String, RepoError> {
    filter.validate()?;
    Ok(format!("json_extract(details, '$.{}')", filter.path.join(".")))
}

/// Text form of the value at a validated details path. `json_extract`
/// yields booleans as `1`/`0`; they are rendered `true`/`false` instead.
fn json_text(filter: &DetailsFieldFilter) -> Result<String, RepoError> {
    let expr = json_path(filter)?;
    let path = format!("'$.{}'", filter.path.join("."));
    Ok(format!(
        "CASE json_type(details, {path}) WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' ELSE CAST({expr} AS TEXT) END"
    ))
}

fn push_find_params(qb: &mut QueryBuilder<'_, Sqlite>, params: &FindParams) {
    qb.push(" WHERE 1 = 1");
    if let Some(tenant) = params.tenant_id {
        qb.push(" AND tenant_id = ").push_bind(tenant.to_string());
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
impl BillingRepository for SqliteRepo {
    async fn get_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let row: Option<SqliteTransactionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM billing_transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(SqliteTransactionRow::into_domain).transpose()
    }

    async fn get_by_details_fields(
        &self,
        gateway: Gateway,
        filters: &[DetailsFieldFilter],
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM billing_transactions WHERE gateway = "
        ));
        qb.push_bind(gateway.as_str());

        for filter in filters {
            match &filter.op {
                FilterOp::Equal(value) => {
                    qb.push(format!(" AND {} = ", json_text(filter)?))
                        .push_bind(value.clone());
                }
                FilterOp::Between(from, to) => {
                    let expr = json_path(filter)?;
                    qb.push(format!(" AND CAST({expr} AS INTEGER) BETWEEN "))
                        .push_bind(*from)
                        .push(" AND ")
                        .push_bind(*to);
                }
            }
        }
        qb.push(" ORDER BY created_at ASC");

        let rows: Vec<SqliteTransactionRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter()
            .map(SqliteTransactionRow::into_domain)
            .collect()
    }

    async fn save(&self, transaction: &Transaction) -> Result<Transaction, RepoError> {
        let id_str = transaction.id().to_string();
        let details = details_json(transaction)?.to_string();

        // SQLite serializes writers at the database level; the read below
        // happens inside the same transaction as the write.
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        let existing: Option<SqliteTransactionRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM billing_transactions WHERE id = ?"
        ))
        .bind(&id_str)
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
                       SET status = ?, refunded_quantity = ?, details = ?, updated_at = ?, version = ?
                       WHERE id = ? AND version = ?"#,
                )
                .bind(transaction.status().as_str())
                .bind(transaction.refunded().quantity())
                .bind(&details)
                .bind(timestamp(transaction.updated_at()))
                .bind(version)
                .bind(&id_str)
                .bind(stored.version())
                .execute(&mut *db_tx)
                .await
                .map_err(write_error)?;
                if result.rows_affected() == 0 {
                    return Err(stale(transaction));
                }
                transaction.clone().with_version(version)
            }
            // A row that was read once and has since been deleted is not
            // brought back.
            None if transaction.version() > 0 => return Err(RepoError::NotFound),
            None => {
                sqlx::query(
                    r#"INSERT INTO billing_transactions
                       (id, tenant_id, status, gateway, quantity, refunded_quantity, currency, details, created_at, updated_at, version)
                       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)"#,
                )
                .bind(&id_str)
                .bind(transaction.tenant_id().to_string())
                .bind(transaction.status().as_str())
                .bind(transaction.gateway().as_str())
                .bind(transaction.amount().quantity())
                .bind(transaction.refunded().quantity())
                .bind(transaction.amount().currency().as_str())
                .bind(&details)
                .bind(timestamp(transaction.created_at()))
                .bind(timestamp(transaction.updated_at()))
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
        let result = sqlx::query(r#"DELETE FROM billing_transactions WHERE id = ?"#)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn count(&self, params: &FindParams) -> Result<i64, RepoError> {
        let mut qb: QueryBuilder<'_, Sqlite> =
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
        let mut qb: QueryBuilder<'_, Sqlite> =
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

        let rows: Vec<SqliteTransactionRow> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter()
            .map(SqliteTransactionRow::into_domain)
            .collect()
    }
}
