//! Read side of the order ledger. Writes to `orders` belong to the
//! inventory manager.

use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use shared::Order;

use crate::db::{with_deadline, DbPool};
use crate::error::{Result, ShopError};
use crate::models::OrderRow;
use crate::schema::orders;

#[async_trait]
pub trait OrderLedger: Send + Sync {
    async fn order(&self, order_id: i64) -> Result<Order>;

    /// Orders of `user_id`, most recent first.
    async fn order_history(&self, user_id: i64) -> Result<Vec<Order>>;
}

#[derive(Clone)]
pub struct PgOrderLedger {
    pool: DbPool,
    deadline: Duration,
}

impl PgOrderLedger {
    pub fn new(pool: DbPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl OrderLedger for PgOrderLedger {
    async fn order(&self, order_id: i64) -> Result<Order> {
        let row = with_deadline(self.deadline, async {
            let mut conn = self.pool.get().await?;
            let row = orders::table
                .find(order_id)
                .select(OrderRow::as_select())
                .first::<OrderRow>(&mut conn)
                .await
                .optional()?;
            Ok::<_, ShopError>(row)
        })
        .await
        .inspect_err(|e| tracing::error!(order_id, error = %e, "failed to load order"))?;

        row.ok_or(ShopError::OrderNotFound(order_id))?.try_into()
    }

    async fn order_history(&self, user_id: i64) -> Result<Vec<Order>> {
        let rows = with_deadline(self.deadline, async {
            let mut conn = self.pool.get().await?;
            let rows = orders::table
                .filter(orders::user_id.eq(user_id))
                .order((orders::created_at.desc(), orders::order_id.desc()))
                .select(OrderRow::as_select())
                .load::<OrderRow>(&mut conn)
                .await?;
            Ok::<_, ShopError>(rows)
        })
        .await
        .inspect_err(|e| tracing::error!(user_id, error = %e, "failed to load order history"))?;

        rows.into_iter().map(Order::try_from).collect()
    }
}
