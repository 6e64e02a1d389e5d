//! PostgreSQL implementation of the order store.
//!
//! Per-order serialization is provided by `SELECT … FOR UPDATE` inside a
//! transaction: a status transition is a read-modify-write under a
//! consistent snapshot of the row. Cross-order writes run in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::{OrderFilter, OrderSort, apply_update};
use crate::audit::{AuditRecord, NewAuditRecord};
use crate::domain::{NewOrder, Order, OrderId, OrderStatus, OrderUpdate};
use crate::error::EngineError;
use crate::store::OrderStore;

/// PostgreSQL-backed [`OrderStore`] using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

/// Raw row from the `orders` table.
#[derive(Debug, sqlx::FromRow)]
struct OrderRowDb {
    id: Uuid,
    token_in: String,
    token_out: String,
    amount: Decimal,
    status: String,
    slippage_tolerance: Decimal,
    max_retries: i32,
    retry_count: i32,
    selected_venue: Option<String>,
    executed_price: Option<Decimal>,
    transaction_hash: Option<String>,
    error_message: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRowDb {
    fn into_order(self) -> Result<Order, EngineError> {
        let status: OrderStatus = self
            .status
            .parse()
            .map_err(EngineError::Persistence)?;
        Ok(Order {
            id: OrderId::from_uuid(self.id),
            token_in: self.token_in,
            token_out: self.token_out,
            amount: self.amount,
            status,
            slippage_tolerance: self.slippage_tolerance,
            max_retries: u32::try_from(self.max_retries).unwrap_or(0),
            retry_count: u32::try_from(self.retry_count).unwrap_or(0),
            selected_venue: self.selected_venue,
            executed_price: self.executed_price,
            transaction_hash: self.transaction_hash,
            error_message: self.error_message,
            confirmed_at: self.confirmed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ORDER_COLUMNS: &str = "id, token_in, token_out, amount, status, slippage_tolerance, \
     max_retries, retry_count, selected_venue, executed_price, transaction_hash, \
     error_message, confirmed_at, created_at, updated_at";

fn db_err(e: sqlx::Error) -> EngineError {
    EngineError::Persistence(e.to_string())
}

impl PgOrderStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the filter's WHERE constraints to a query builder.
    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(token_in) = &filter.token_in {
            builder
                .push(" AND token_in = ")
                .push_bind(token_in.clone());
        }
        if let Some(token_out) = &filter.token_out {
            builder
                .push(" AND token_out = ")
                .push_bind(token_out.clone());
        }
        if let Some(min) = filter.amount_min {
            builder.push(" AND amount >= ").push_bind(min);
        }
        if let Some(max) = filter.amount_max {
            builder.push(" AND amount <= ").push_bind(max);
        }
        if let Some(after) = filter.created_after {
            builder.push(" AND created_at >= ").push_bind(after);
        }
        if let Some(before) = filter.created_before {
            builder.push(" AND created_at <= ").push_bind(before);
        }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn create(&self, input: NewOrder) -> Result<Order, EngineError> {
        let id = OrderId::new();
        let row = sqlx::query_as::<_, OrderRowDb>(&format!(
            "INSERT INTO orders (id, token_in, token_out, amount, status, \
             slippage_tolerance, max_retries, retry_count) \
             VALUES ($1, $2, $3, $4, 'pending', $5, $6, 0) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(&input.token_in)
        .bind(&input.token_out)
        .bind(input.amount)
        .bind(input.slippage_tolerance)
        .bind(i32::try_from(input.max_retries).unwrap_or(0))
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.into_order()
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, EngineError> {
        let row = sqlx::query_as::<_, OrderRowDb>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(OrderRowDb::into_order).transpose()
    }

    async fn update(&self, id: OrderId, update: OrderUpdate) -> Result<Order, EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query_as::<_, OrderRowDb>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(EngineError::OrderNotFound(id))?;

        let current = row.into_order()?;
        let next = apply_update(&current, &update)?;

        let updated = sqlx::query_as::<_, OrderRowDb>(&format!(
            "UPDATE orders SET status = $2, retry_count = $3, selected_venue = $4, \
             executed_price = $5, transaction_hash = $6, error_message = $7, \
             confirmed_at = $8 WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(next.status.as_str())
        .bind(i32::try_from(next.retry_count).unwrap_or(0))
        .bind(&next.selected_venue)
        .bind(next.executed_price)
        .bind(&next.transaction_hash)
        .bind(&next.error_message)
        .bind(next.confirmed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        updated.into_order()
    }

    async fn delete(&self, id: OrderId) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(
            "SELECT status, enqueued_at FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or(EngineError::OrderNotFound(id))?;

        let status: String = row.try_get("status").map_err(db_err)?;
        let enqueued_at: Option<DateTime<Utc>> =
            row.try_get("enqueued_at").map_err(db_err)?;
        if status != "pending" || enqueued_at.is_some() {
            return Err(EngineError::Conflict {
                order_id: id,
                status,
                reason: "delete is only permitted for never-enqueued pending orders".to_string(),
            });
        }

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn mark_enqueued(&self, id: OrderId) -> Result<(), EngineError> {
        let result = sqlx::query("UPDATE orders SET enqueued_at = now() WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(EngineError::OrderNotFound(id));
        }
        Ok(())
    }

    async fn count(&self, filter: &OrderFilter) -> Result<u64, EngineError> {
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM orders");
        Self::push_filter(&mut builder, filter);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn find_all(&self, filter: &OrderFilter) -> Result<Vec<Order>, EngineError> {
        let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        Self::push_filter(&mut builder, filter);
        match filter.sort {
            OrderSort::CreatedAtDesc => builder.push(" ORDER BY created_at DESC"),
            OrderSort::CreatedAtAsc => builder.push(" ORDER BY created_at ASC"),
        };
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }
        if let Some(offset) = filter.offset {
            builder.push(" OFFSET ").push_bind(i64::from(offset));
        }

        let rows: Vec<OrderRowDb> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.into_iter().map(OrderRowDb::into_order).collect()
    }

    async fn append_audit(&self, record: NewAuditRecord) -> Result<AuditRecord, EngineError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if let Some(version) = record.event_version {
            // Idempotent path: return the existing row when this
            // (order_id, event_version) was already appended.
            let existing = sqlx::query_as::<
                _,
                (i64, Uuid, String, serde_json::Value, i32, DateTime<Utc>, Option<serde_json::Value>),
            >(
                "SELECT id, order_id, event_type, event_data, event_version, timestamp, metadata \
                 FROM order_history WHERE order_id = $1 AND event_version = $2",
            )
            .bind(record.order_id.as_uuid())
            .bind(i32::try_from(version).unwrap_or(0))
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;

            if let Some(row) = existing {
                tx.commit().await.map_err(db_err)?;
                return Ok(audit_from_row(row));
            }
        }

        let row = sqlx::query_as::<
            _,
            (i64, Uuid, String, serde_json::Value, i32, DateTime<Utc>, Option<serde_json::Value>),
        >(
            "INSERT INTO order_history (order_id, event_type, event_data, event_version, timestamp, metadata) \
             SELECT $1, $2, $3, \
                    COALESCE($4::integer, (SELECT COALESCE(MAX(event_version), 0) + 1 \
                                  FROM order_history WHERE order_id = $1)), \
                    $5, $6 \
             RETURNING id, order_id, event_type, event_data, event_version, timestamp, metadata",
        )
        .bind(record.order_id.as_uuid())
        .bind(&record.event_type)
        .bind(&record.event_data)
        .bind(record.event_version.map(|v| i32::try_from(v).unwrap_or(0)))
        .bind(record.timestamp)
        .bind(&record.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(audit_from_row(row))
    }

    async fn load_audit(&self, order_id: OrderId) -> Result<Vec<AuditRecord>, EngineError> {
        let rows = sqlx::query_as::<
            _,
            (i64, Uuid, String, serde_json::Value, i32, DateTime<Utc>, Option<serde_json::Value>),
        >(
            "SELECT id, order_id, event_type, event_data, event_version, timestamp, metadata \
             FROM order_history WHERE order_id = $1 \
             ORDER BY timestamp ASC, event_version ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(audit_from_row).collect())
    }
}

type AuditRowDb = (
    i64,
    Uuid,
    String,
    serde_json::Value,
    i32,
    DateTime<Utc>,
    Option<serde_json::Value>,
);

fn audit_from_row(row: AuditRowDb) -> AuditRecord {
    let (id, order_id, event_type, event_data, event_version, timestamp, metadata) = row;
    AuditRecord {
        id,
        order_id: OrderId::from_uuid(order_id),
        event_type,
        event_data,
        event_version: u32::try_from(event_version).unwrap_or(0),
        timestamp,
        metadata,
    }
}
