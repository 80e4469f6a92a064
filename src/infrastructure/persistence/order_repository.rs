//! Order ledger persistence: the Execution Gateway's sole source of truth.
//!
//! Grounded on the teacher's `SqliteOrderRepository` (pool-held repository
//! struct, `ON CONFLICT DO NOTHING` insert idiom) generalized to the full
//! order state machine and its CAS transition (`OrderRepository::
//! apply_transition`, spec §4.2).

use crate::domain::errors::AppError;
use crate::domain::fill::Fill;
use crate::domain::order::{Order, OrderSide, OrderStatus, OrderType, StatusSource};
use crate::domain::ports::{OrderFilters, OrderRepository, OrderTransition, PortResult};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use std::str::FromStr;

pub struct SqliteOrderRepository {
    pool: SqlitePool,
}

impl SqliteOrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_order(row: SqliteRow) -> Result<Order, AppError> {
    let side: String = row.try_get("side").map_err(AppError::from)?;
    let order_type: String = row.try_get("order_type").map_err(AppError::from)?;
    let status: String = row.try_get("status").map_err(AppError::from)?;
    let status_source: String = row.try_get("status_source").map_err(AppError::from)?;
    let limit_price: Option<String> = row.try_get("limit_price").map_err(AppError::from)?;
    let avg_fill_price: String = row.try_get("avg_fill_price").map_err(AppError::from)?;
    let created_at: String = row.try_get("created_at").map_err(AppError::from)?;
    let updated_at: String = row.try_get("updated_at").map_err(AppError::from)?;
    let trade_date: String = row.try_get("trade_date").map_err(AppError::from)?;

    Ok(Order {
        client_order_id: row.try_get("client_order_id").map_err(AppError::from)?,
        broker_order_id: row.try_get("broker_order_id").map_err(AppError::from)?,
        symbol: row.try_get("symbol").map_err(AppError::from)?,
        side: OrderSide::from_str(&side).map_err(AppError::Internal)?,
        qty: row.try_get("qty").map_err(AppError::from)?,
        order_type: OrderType::from_str(&order_type).map_err(AppError::Internal)?,
        limit_price: limit_price
            .map(|p| Decimal::from_str(&p))
            .transpose()
            .map_err(|e| AppError::Internal(e.to_string()))?,
        time_in_force: row.try_get("time_in_force").map_err(AppError::from)?,
        status: OrderStatus::from_str(&status).map_err(AppError::Internal)?,
        filled_qty: row.try_get("filled_qty").map_err(AppError::from)?,
        avg_fill_price: Decimal::from_str(&avg_fill_price)
            .map_err(|e| AppError::Internal(e.to_string()))?,
        strategy_id: row.try_get("strategy_id").map_err(AppError::from)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .with_timezone(&Utc),
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map_err(|e| AppError::Internal(e.to_string()))?
            .with_timezone(&Utc),
        status_source: StatusSource::from_str(&status_source).map_err(AppError::Internal)?,
        status_sequence: row.try_get("status_sequence").map_err(AppError::from)?,
        trade_date: NaiveDate::parse_from_str(&trade_date, "%Y-%m-%d")
            .map_err(|e| AppError::Internal(e.to_string()))?,
    })
}

#[async_trait]
impl OrderRepository for SqliteOrderRepository {
    async fn insert_pending(&self, order: &Order) -> PortResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                client_order_id, broker_order_id, symbol, side, qty, order_type,
                limit_price, time_in_force, status, filled_qty, avg_fill_price,
                strategy_id, created_at, updated_at, status_source, status_sequence,
                trade_date
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(client_order_id) DO NOTHING
            "#,
        )
        .bind(&order.client_order_id)
        .bind(&order.broker_order_id)
        .bind(&order.symbol)
        .bind(order.side.to_string())
        .bind(order.qty)
        .bind(order.order_type.to_string())
        .bind(order.limit_price.map(|p| p.to_string()))
        .bind(&order.time_in_force)
        .bind(order.status.to_string())
        .bind(order.filled_qty)
        .bind(order.avg_fill_price.to_string())
        .bind(&order.strategy_id)
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .bind(order.status_source.to_string())
        .bind(order.status_sequence)
        .bind(order.trade_date.to_string())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn get(&self, client_order_id: &str) -> PortResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE client_order_id = ?")
            .bind(client_order_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        row.map(row_to_order).transpose()
    }

    async fn list(&self, filters: OrderFilters) -> PortResult<Vec<Order>> {
        let mut sql = String::from("SELECT * FROM orders WHERE 1=1");
        if filters.symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if filters.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filters.strategy_id.is_some() {
            sql.push_str(" AND strategy_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filters.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(symbol) = &filters.symbol {
            query = query.bind(symbol);
        }
        if let Some(status) = filters.status {
            query = query.bind(status.to_string());
        }
        if let Some(strategy_id) = &filters.strategy_id {
            query = query.bind(strategy_id);
        }
        if let Some(limit) = filters.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(AppError::from)?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn list_non_terminal(&self) -> PortResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE status NOT IN ('filled', 'canceled', 'rejected', 'error')",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;
        rows.into_iter().map(row_to_order).collect()
    }

    async fn apply_transition(&self, transition: OrderTransition) -> PortResult<bool> {
        let is_reconciliation_correction = transition.source == StatusSource::Reconciliation;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?,
                filled_qty = ?,
                avg_fill_price = ?,
                broker_order_id = COALESCE(?, broker_order_id),
                status_source = ?,
                status_sequence = status_sequence + 1,
                updated_at = ?
            WHERE client_order_id = ?
              AND status_sequence = ?
              AND (status NOT IN ('filled', 'canceled', 'rejected', 'error') OR ?)
            "#,
        )
        .bind(transition.new_status.to_string())
        .bind(transition.filled_qty)
        .bind(transition.avg_fill_price.to_string())
        .bind(&transition.broker_order_id)
        .bind(transition.source.to_string())
        .bind(Utc::now().to_rfc3339())
        .bind(&transition.client_order_id)
        .bind(transition.expected_sequence)
        .bind(is_reconciliation_correction)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_fill(&self, fill: &Fill) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO order_fills (fill_id, client_order_id, qty, price, timestamp) \
             VALUES (?, ?, ?, ?, ?) ON CONFLICT(fill_id) DO NOTHING",
        )
        .bind(&fill.fill_id)
        .bind(&fill.client_order_id)
        .bind(fill.qty)
        .bind(fill.price.to_string())
        .bind(fill.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn fills_for_order(&self, client_order_id: &str) -> PortResult<Vec<Fill>> {
        let rows = sqlx::query(
            "SELECT fill_id, client_order_id, qty, price, timestamp FROM order_fills \
             WHERE client_order_id = ? ORDER BY timestamp ASC",
        )
        .bind(client_order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::from)?;

        rows.into_iter()
            .map(|row| {
                let price: String = row.try_get("price").map_err(AppError::from)?;
                let timestamp: String = row.try_get("timestamp").map_err(AppError::from)?;
                Ok(Fill {
                    fill_id: row.try_get("fill_id").map_err(AppError::from)?,
                    client_order_id: row.try_get("client_order_id").map_err(AppError::from)?,
                    qty: row.try_get("qty").map_err(AppError::from)?,
                    price: Decimal::from_str(&price).map_err(|e| AppError::Internal(e.to_string()))?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .map_err(|e| AppError::Internal(e.to_string()))?
                        .with_timezone(&Utc),
                })
            })
            .collect()
    }

    async fn has_webhook_event(&self, client_order_id: &str, broker_event_id: &str) -> PortResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM webhook_events WHERE client_order_id = ? AND broker_event_id = ?",
        )
        .bind(client_order_id)
        .bind(broker_event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.is_some())
    }

    async fn record_webhook_event(&self, client_order_id: &str, broker_event_id: &str) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO webhook_events (client_order_id, broker_event_id, received_at) \
             VALUES (?, ?, ?) ON CONFLICT(client_order_id, broker_event_id) DO NOTHING",
        )
        .bind(client_order_id)
        .bind(broker_event_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
