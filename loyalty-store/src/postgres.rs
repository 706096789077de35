//! PostgreSQL store.
//!
//! Uses dynamic queries (sqlx::query) instead of compile-time checked
//! macros (sqlx::query!) to allow compilation without DATABASE_URL.
//!
//! Credits and debits run inside a transaction together with the order or
//! withdrawal write that causes them. The `balances_current_check` constraint
//! keeps balances non-negative.

use crate::error::{ConflictKind, StoreError};
use crate::repository::{
    BalanceRepository, OrderRepository, OrderUpdate, Store, WithdrawalRepository,
};
use async_trait::async_trait;
use loyalty_domain::{
    Balance, Order, OrderId, OrderNumber, OrderStatus, Points, UserId, Withdrawal,
};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

/// PostgreSQL-backed store
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Resolve a unique violation on an order number into the right conflict.
    async fn number_conflict(
        &self,
        table: &str,
        number: &OrderNumber,
        user_id: UserId,
    ) -> Result<StoreError, StoreError> {
        let sql = match table {
            "withdrawals" => "SELECT user_id FROM withdrawals WHERE order_number = $1",
            _ => "SELECT user_id FROM orders WHERE number = $1",
        };
        let owner: Option<UserId> = sqlx::query_scalar(sql)
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let kind = if owner == Some(user_id) {
            ConflictKind::OrderNumberTaken
        } else {
            ConflictKind::OrderTakenByOther
        };
        Ok(StoreError::Conflict(kind))
    }

    async fn insert_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO withdrawals (id, user_id, order_number, sum, processed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.user_id)
        .bind(withdrawal.order_number.as_str())
        .bind(withdrawal.sum.as_decimal())
        .bind(withdrawal.processed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO balances (user_id, current, withdrawn)
            VALUES ($1, 0, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(withdrawal.user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE balances
            SET current = current - $2, withdrawn = withdrawn + $2
            WHERE user_id = $1
            "#,
        )
        .bind(withdrawal.user_id)
        .bind(withdrawal.sum.as_decimal())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

fn parse_order_row(row: &PgRow) -> Result<Order, StoreError> {
    let number: String = row.try_get("number")?;
    let status: String = row.try_get("status")?;
    let accrual: Option<Decimal> = row.try_get("accrual")?;

    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        number: OrderNumber::parse(&number)?,
        status: status.parse::<OrderStatus>()?,
        accrual: accrual.map(Points::new).transpose()?,
        uploaded_at: row.try_get("uploaded_at")?,
    })
}

fn parse_withdrawal_row(row: &PgRow) -> Result<Withdrawal, StoreError> {
    let number: String = row.try_get("order_number")?;
    let sum: Decimal = row.try_get("sum")?;

    Ok(Withdrawal {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        order_number: OrderNumber::parse(&number)?,
        sum: Points::new(sum)?,
        processed_at: row.try_get("processed_at")?,
    })
}

const ORDER_COLUMNS: &str = "id, user_id, number, status, accrual, uploaded_at";

// =============================================================================
// Order Repository Implementation
// =============================================================================

#[async_trait]
impl OrderRepository for PgStore {
    async fn create_order(&self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, number, status, accrual, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.number.as_str())
        .bind(order.status.as_str())
        .bind(order.accrual.map(|p| p.as_decimal()))
        .bind(order.uploaded_at)
        .execute(&self.pool)
        .await;

        match result.map_err(StoreError::from) {
            Ok(_) => Ok(()),
            Err(StoreError::Conflict(ConflictKind::OrderNumberTaken)) => {
                Err(self.number_conflict("orders", &order.number, order.user_id).await?)
            },
            Err(e) => Err(e),
        }
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(parse_order_row).transpose()
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY uploaded_at DESC, id DESC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        rows.iter().map(parse_order_row).collect()
    }

    async fn get_pending_orders(&self) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {} FROM orders WHERE status IN ('NEW', 'PROCESSING') ORDER BY uploaded_at ASC, id ASC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(parse_order_row).collect()
    }

    async fn update_order(&self, order: &Order) -> Result<OrderUpdate, StoreError> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<UserId> = sqlx::query_scalar(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3
            WHERE id = $1 AND status IN ('NEW', 'PROCESSING')
            RETURNING user_id
            "#,
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.accrual.map(|p| p.as_decimal()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = owner else {
            let exists: Option<OrderId> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?;
            return match exists {
                Some(_) => {
                    debug!(order_number = %order.number, "Order already final, update skipped");
                    Ok(OrderUpdate::AlreadyFinal)
                },
                None => Err(StoreError::not_found("order", order.id.to_string())),
            };
        };

        if order.status == OrderStatus::Processed {
            let accrual = order.accrual.unwrap_or(Points::ZERO);
            sqlx::query(
                r#"
                INSERT INTO balances (user_id, current, withdrawn)
                VALUES ($1, $2, 0)
                ON CONFLICT (user_id) DO UPDATE SET current = balances.current + EXCLUDED.current
                "#,
            )
            .bind(user_id)
            .bind(accrual.as_decimal())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(OrderUpdate::Applied)
    }
}

// =============================================================================
// Balance Repository Implementation
// =============================================================================

#[async_trait]
impl BalanceRepository for PgStore {
    async fn get_balance(&self, user_id: UserId) -> Result<Balance, StoreError> {
        let row = sqlx::query("SELECT current, withdrawn FROM balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Balance {
                user_id,
                current: Points::new(row.try_get("current")?)?,
                withdrawn: Points::new(row.try_get("withdrawn")?)?,
            }),
            None => Ok(Balance::empty(user_id)),
        }
    }
}

// =============================================================================
// Withdrawal Repository Implementation
// =============================================================================

#[async_trait]
impl WithdrawalRepository for PgStore {
    async fn create_withdrawal(&self, withdrawal: &Withdrawal) -> Result<(), StoreError> {
        match self.insert_withdrawal(withdrawal).await {
            Err(StoreError::Conflict(ConflictKind::OrderNumberTaken)) => Err(self
                .number_conflict("withdrawals", &withdrawal.order_number, withdrawal.user_id)
                .await?),
            other => other,
        }
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, order_number, sum, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_withdrawal_row).collect()
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for PgStore {
    fn orders(&self) -> &dyn OrderRepository {
        self
    }

    fn balances(&self) -> &dyn BalanceRepository {
        self
    }

    fn withdrawals(&self) -> &dyn WithdrawalRepository {
        self
    }
}
