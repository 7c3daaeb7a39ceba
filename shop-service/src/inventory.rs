//! Inventory manager: the only writer of `products.stock` and
//! `orders.status`.
//!
//! Every operation is one transaction on one pooled connection. The
//! transaction closure commits on `Ok` and rolls back on `Err`, and the whole
//! unit is bounded by the configured deadline (see [`with_deadline`]).
//!
//! Locking discipline:
//! - `reserve` locks the product row with `SELECT ... FOR UPDATE` in the same
//!   statement that reads the stock it decides on.
//! - `cancel` locks the order row, then the product row through the stock
//!   update.
//! - `confirm` is a single conditional update on the order row.
//!
//! No path locks a product and then an existing order, so the two orders of
//! acquisition never cross.

use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use shared::{order_sum, Order, OrderStatus};
use tracing::{info, warn};

use crate::db::{with_deadline, DbPool};
use crate::error::{Result, ShopError};
use crate::models::{NewOrder, OrderRow};
use crate::schema::{orders, products};

#[async_trait]
pub trait InventoryTransactor: Send + Sync {
    /// Atomically decrements stock and records a `RESERVED` order.
    async fn reserve(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<Order>;

    /// `RESERVED -> CONFIRMED`. Replaying on a terminal order returns it
    /// unchanged.
    async fn confirm(&self, order_id: i64) -> Result<Order>;

    /// `RESERVED -> CANCELED` with the reserved quantity put back on stock.
    /// Replaying on a terminal order is a no-op.
    async fn cancel(&self, order_id: i64) -> Result<()>;
}

pub(crate) fn ensure_positive_quantity(quantity: i32) -> Result<()> {
    if quantity <= 0 {
        return Err(ShopError::InvalidArgument(format!(
            "quantity must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

fn trace_failure(
    err: &ShopError,
    operation: &'static str,
    order_id: Option<i64>,
    product_id: Option<i64>,
) {
    if err.is_internal() {
        tracing::error!(
            operation,
            ?order_id,
            ?product_id,
            error = %err,
            "inventory transaction rolled back"
        );
    }
}

enum Confirmation {
    Applied(OrderRow),
    Replayed(OrderRow),
}

enum Cancellation {
    Applied { product_id: i64, quantity: i32 },
    Replayed(OrderStatus),
}

#[derive(Clone)]
pub struct PgInventoryManager {
    pool: DbPool,
    deadline: Duration,
}

impl PgInventoryManager {
    pub fn new(pool: DbPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl InventoryTransactor for PgInventoryManager {
    async fn reserve(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<Order> {
        ensure_positive_quantity(quantity)?;

        let row = with_deadline(self.deadline, async {
            let mut conn = self.pool.get().await?;

            conn.transaction::<_, ShopError, _>(|conn| {
                Box::pin(async move {
                    let locked = products::table
                        .find(product_id)
                        .select((products::price, products::stock))
                        .for_update()
                        .first::<(BigDecimal, i32)>(conn)
                        .await
                        .optional()?;

                    let (price, stock) = locked.ok_or(ShopError::ProductNotFound(product_id))?;

                    if stock < quantity {
                        return Err(ShopError::InsufficientStock {
                            product_id,
                            requested: quantity,
                            available: stock,
                        });
                    }

                    let new_order = NewOrder {
                        user_id,
                        product_id,
                        quantity,
                        total: order_sum(&price, quantity),
                        status: OrderStatus::Reserved.as_str().to_string(),
                        created_at: Utc::now(),
                    };

                    let order = diesel::insert_into(orders::table)
                        .values(&new_order)
                        .returning(OrderRow::as_returning())
                        .get_result::<OrderRow>(conn)
                        .await?;

                    diesel::update(products::table.find(product_id))
                        .set(products::stock.eq(products::stock - quantity))
                        .execute(conn)
                        .await?;

                    Ok(order)
                })
            })
            .await
        })
        .await
        .inspect_err(|e| trace_failure(e, "reserve", None, Some(product_id)))?;

        info!(
            "Order {} reserved {} of product {} for user {}",
            row.order_id, quantity, product_id, user_id
        );
        row.try_into()
    }

    async fn confirm(&self, order_id: i64) -> Result<Order> {
        let outcome = with_deadline(self.deadline, async {
            let mut conn = self.pool.get().await?;

            let confirmed = diesel::update(
                orders::table
                    .find(order_id)
                    .filter(orders::status.eq(OrderStatus::Reserved.as_str())),
            )
            .set((
                orders::status.eq(OrderStatus::Confirmed.as_str()),
                orders::updated_at.eq(Some(Utc::now())),
            ))
            .returning(OrderRow::as_returning())
            .get_result::<OrderRow>(&mut conn)
            .await
            .optional()?;

            if let Some(row) = confirmed {
                return Ok::<_, ShopError>(Confirmation::Applied(row));
            }

            // Nothing matched: either the order is missing or it already left
            // RESERVED. A terminal status never changes again, so this read
            // cannot race back into the reserved state.
            let existing = orders::table
                .find(order_id)
                .select(OrderRow::as_select())
                .first::<OrderRow>(&mut conn)
                .await
                .optional()?;

            existing
                .map(Confirmation::Replayed)
                .ok_or(ShopError::OrderNotFound(order_id))
        })
        .await
        .inspect_err(|e| trace_failure(e, "confirm", Some(order_id), None))?;

        match outcome {
            Confirmation::Applied(row) => {
                info!("Order {} confirmed", order_id);
                row.try_into()
            }
            Confirmation::Replayed(row) => {
                let order: Order = row.try_into()?;
                if order.status != OrderStatus::Confirmed {
                    warn!(
                        "Confirmation for order {} ignored, order is already {}",
                        order_id, order.status
                    );
                } else {
                    info!("Order {} already confirmed, replay ignored", order_id);
                }
                Ok(order)
            }
        }
    }

    async fn cancel(&self, order_id: i64) -> Result<()> {
        let outcome = with_deadline(self.deadline, async {
            let mut conn = self.pool.get().await?;

            conn.transaction::<_, ShopError, _>(|conn| {
                Box::pin(async move {
                    let order = orders::table
                        .find(order_id)
                        .select(OrderRow::as_select())
                        .for_update()
                        .first::<OrderRow>(conn)
                        .await
                        .optional()?
                        .ok_or(ShopError::OrderNotFound(order_id))?;

                    let status: OrderStatus = order.status.parse()?;
                    if status.is_terminal() {
                        return Ok(Cancellation::Replayed(status));
                    }

                    diesel::update(products::table.find(order.product_id))
                        .set(products::stock.eq(products::stock + order.quantity))
                        .execute(conn)
                        .await?;

                    diesel::update(orders::table.find(order_id))
                        .set((
                            orders::status.eq(OrderStatus::Canceled.as_str()),
                            orders::updated_at.eq(Some(Utc::now())),
                        ))
                        .execute(conn)
                        .await?;

                    Ok(Cancellation::Applied {
                        product_id: order.product_id,
                        quantity: order.quantity,
                    })
                })
            })
            .await
        })
        .await
        .inspect_err(|e| trace_failure(e, "cancel", Some(order_id), None))?;

        match outcome {
            Cancellation::Applied { product_id, quantity } => {
                info!(
                    "Order {} canceled, {} of product {} returned to stock",
                    order_id, quantity, product_id
                );
            }
            Cancellation::Replayed(status) => {
                info!("Cancellation for order {} ignored, order is already {}", order_id, status);
            }
        }
        Ok(())
    }
}
