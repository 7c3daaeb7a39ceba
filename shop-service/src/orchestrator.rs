use std::sync::Arc;

use shared::{Order, Product};
use tracing::{info, instrument};

use crate::catalog::CatalogReader;
use crate::error::{Result, ShopError};
use crate::inventory::InventoryTransactor;
use crate::ledger::OrderLedger;

/// Sequences a purchase over the catalog, the ledger and the inventory
/// manager. Holds no state of its own between calls.
#[derive(Clone)]
pub struct ShopOrchestrator {
    catalog: Arc<dyn CatalogReader>,
    ledger: Arc<dyn OrderLedger>,
    inventory: Arc<dyn InventoryTransactor>,
    payment_base_url: String,
}

impl ShopOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        ledger: Arc<dyn OrderLedger>,
        inventory: Arc<dyn InventoryTransactor>,
        payment_base_url: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            inventory,
            payment_base_url: payment_base_url.into(),
        }
    }

    pub async fn list_products(&self, limit: i32, offset: i32) -> Result<Vec<Product>> {
        self.catalog.list_products(limit, offset).await
    }

    pub async fn get_product(&self, product_id: i64) -> Result<Product> {
        self.catalog.product(product_id).await
    }

    pub async fn get_order_history(&self, user_id: i64) -> Result<Vec<Order>> {
        let orders = self.ledger.order_history(user_id).await?;
        Ok(orders
            .into_iter()
            .map(|order| order.with_payment_handle(&self.payment_base_url))
            .collect())
    }

    /// Reserves stock for a new order and hands back its payment handle.
    ///
    /// The catalog check only yields an early, precise rejection and may be
    /// stale. The reservation re-checks stock under the row lock.
    #[instrument(skip(self))]
    pub async fn make_order(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<Order> {
        let product = self.catalog.product(product_id).await?;
        if !product.can_fulfil(quantity) {
            return Err(ShopError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.stock,
            });
        }

        let order = self
            .inventory
            .reserve(user_id, product_id, quantity)
            .await?
            .with_payment_handle(&self.payment_base_url);

        info!(
            order_id = order.id,
            payment_handle = %order.payment_handle.as_ref().map(|h| h.as_str()).unwrap_or_default(),
            "order awaiting payment"
        );
        Ok(order)
    }

    /// Applies a payment outcome reported by the payment provider.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, order_id: i64, success: bool) -> Result<()> {
        if success {
            self.inventory.confirm(order_id).await?;
        } else {
            self.inventory.cancel(order_id).await?;
        }
        Ok(())
    }
}
