//! In-memory shop storage for testing.
//!
//! One mutex guards products and orders together and is held for the whole
//! of each operation, which gives the same serialization the database row
//! locks give the Postgres implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;
use shared::{order_sum, Order, OrderStatus, Product};
use tokio::sync::Mutex;

use crate::catalog::{effective_limit, CatalogReader};
use crate::error::{Result, ShopError};
use crate::inventory::{ensure_positive_quantity, InventoryTransactor};
use crate::ledger::OrderLedger;

const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Debug, Default)]
struct ShopState {
    products: BTreeMap<i64, Product>,
    orders: BTreeMap<i64, Order>,
    next_product_id: i64,
    next_order_id: i64,
    storage_fault: bool,
}

impl ShopState {
    fn check_fault(&self) -> Result<()> {
        if self.storage_fault {
            return Err(ShopError::Internal("injected storage fault".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryShop {
    state: Arc<Mutex<ShopState>>,
}

impl InMemoryShop {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_product(&self, name: &str, price: BigDecimal, stock: i32) -> Product {
        let mut state = self.state.lock().await;
        state.next_product_id += 1;
        let product = Product {
            id: state.next_product_id,
            name: name.to_string(),
            price,
            stock,
        };
        state.products.insert(product.id, product.clone());
        product
    }

    pub async fn stock_of(&self, product_id: i64) -> Option<i32> {
        self.state
            .lock()
            .await
            .products
            .get(&product_id)
            .map(|p| p.stock)
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }

    /// Makes every following mutating call fail with `Internal` before it
    /// touches any state.
    pub async fn set_storage_fault(&self, fault: bool) {
        self.state.lock().await.storage_fault = fault;
    }
}

#[async_trait]
impl CatalogReader for InMemoryShop {
    async fn list_products(&self, limit: i32, offset: i32) -> Result<Vec<Product>> {
        let limit = effective_limit(limit, DEFAULT_PAGE_SIZE) as usize;
        let offset = offset.max(0) as usize;
        let state = self.state.lock().await;
        Ok(state
            .products
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn product(&self, product_id: i64) -> Result<Product> {
        let state = self.state.lock().await;
        state
            .products
            .get(&product_id)
            .cloned()
            .ok_or(ShopError::ProductNotFound(product_id))
    }
}

#[async_trait]
impl OrderLedger for InMemoryShop {
    async fn order(&self, order_id: i64) -> Result<Order> {
        let state = self.state.lock().await;
        state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(ShopError::OrderNotFound(order_id))
    }

    async fn order_history(&self, user_id: i64) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }
}

#[async_trait]
impl InventoryTransactor for InMemoryShop {
    async fn reserve(&self, user_id: i64, product_id: i64, quantity: i32) -> Result<Order> {
        ensure_positive_quantity(quantity)?;
        let mut state = self.state.lock().await;

        let product = state
            .products
            .get(&product_id)
            .ok_or(ShopError::ProductNotFound(product_id))?;

        if product.stock < quantity {
            return Err(ShopError::InsufficientStock {
                product_id,
                requested: quantity,
                available: product.stock,
            });
        }
        let sum = order_sum(&product.price, quantity);

        state.check_fault()?;

        let order_id = state.next_order_id + 1;
        if state.orders.contains_key(&order_id) {
            return Err(ShopError::AlreadyExists);
        }

        let order = Order {
            id: order_id,
            user_id,
            product_id,
            quantity,
            sum,
            status: OrderStatus::Reserved,
            created_at: Utc::now(),
            updated_at: None,
            payment_handle: None,
        };

        state.next_order_id = order_id;
        state.orders.insert(order_id, order.clone());
        if let Some(product) = state.products.get_mut(&product_id) {
            product.stock -= quantity;
        }
        Ok(order)
    }

    async fn confirm(&self, order_id: i64) -> Result<Order> {
        let mut state = self.state.lock().await;
        state.check_fault()?;

        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(ShopError::OrderNotFound(order_id))?;

        if order.status.can_transition_to(OrderStatus::Confirmed) {
            order.status = OrderStatus::Confirmed;
            order.updated_at = Some(Utc::now());
        }
        Ok(order.clone())
    }

    async fn cancel(&self, order_id: i64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check_fault()?;

        let (product_id, quantity) = {
            let order = state
                .orders
                .get_mut(&order_id)
                .ok_or(ShopError::OrderNotFound(order_id))?;

            if !order.status.can_transition_to(OrderStatus::Canceled) {
                return Ok(());
            }
            order.status = OrderStatus::Canceled;
            order.updated_at = Some(Utc::now());
            (order.product_id, order.quantity)
        };

        if let Some(product) = state.products.get_mut(&product_id) {
            product.stock += quantity;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn shop_with_stock(stock: i32) -> (InMemoryShop, Product) {
        let shop = InMemoryShop::new();
        let product = shop.insert_product("Widget", BigDecimal::from(10), stock).await;
        (shop, product)
    }

    #[tokio::test]
    async fn reserve_decrements_stock_and_records_order() {
        let (shop, product) = shop_with_stock(5).await;

        let order = shop.reserve(1, product.id, 3).await.unwrap();

        assert_eq!(order.status, OrderStatus::Reserved);
        assert_eq!(order.sum, BigDecimal::from(30));
        assert_eq!(shop.stock_of(product.id).await, Some(2));
        assert_eq!(shop.order_count().await, 1);
    }

    #[tokio::test]
    async fn failed_reserve_leaves_no_trace() {
        let (shop, product) = shop_with_stock(2).await;

        let err = shop.reserve(1, product.id, 3).await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock { available: 2, .. }));

        let err = shop.reserve(1, 999, 1).await.unwrap_err();
        assert!(matches!(err, ShopError::ProductNotFound(999)));

        shop.set_storage_fault(true).await;
        let err = shop.reserve(1, product.id, 1).await.unwrap_err();
        assert!(err.is_internal());

        assert_eq!(shop.stock_of(product.id).await, Some(2));
        assert_eq!(shop.order_count().await, 0);
    }

    #[tokio::test]
    async fn confirm_is_idempotent() {
        let (shop, product) = shop_with_stock(5).await;
        let order = shop.reserve(1, product.id, 2).await.unwrap();

        let first = shop.confirm(order.id).await.unwrap();
        let second = shop.confirm(order.id).await.unwrap();

        assert_eq!(first.status, OrderStatus::Confirmed);
        assert_eq!(second.status, OrderStatus::Confirmed);
        assert_eq!(shop.stock_of(product.id).await, Some(3));
    }

    #[tokio::test]
    async fn cancel_restores_stock_once() {
        let (shop, product) = shop_with_stock(5).await;
        let order = shop.reserve(1, product.id, 4).await.unwrap();

        shop.cancel(order.id).await.unwrap();
        shop.cancel(order.id).await.unwrap();

        assert_eq!(shop.stock_of(product.id).await, Some(5));
        assert_eq!(shop.order(order.id).await.unwrap().status, OrderStatus::Canceled);
    }

    #[tokio::test]
    async fn terminal_orders_never_switch_outcome() {
        let (shop, product) = shop_with_stock(5).await;
        let confirmed = shop.reserve(1, product.id, 1).await.unwrap();
        let canceled = shop.reserve(1, product.id, 1).await.unwrap();

        shop.confirm(confirmed.id).await.unwrap();
        shop.cancel(canceled.id).await.unwrap();

        shop.cancel(confirmed.id).await.unwrap();
        let replay = shop.confirm(canceled.id).await.unwrap();

        assert_eq!(shop.order(confirmed.id).await.unwrap().status, OrderStatus::Confirmed);
        assert_eq!(replay.status, OrderStatus::Canceled);
        assert_eq!(shop.stock_of(product.id).await, Some(4));
    }

    #[tokio::test]
    async fn unknown_orders_are_not_found() {
        let shop = InMemoryShop::new();
        assert!(matches!(shop.confirm(3).await, Err(ShopError::OrderNotFound(3))));
        assert!(matches!(shop.cancel(3).await, Err(ShopError::OrderNotFound(3))));
    }

    #[tokio::test]
    async fn products_are_listed_by_id_with_default_page() {
        let shop = InMemoryShop::new();
        for i in 0..12 {
            shop.insert_product(&format!("p{}", i), BigDecimal::from(1), 1).await;
        }

        let page = shop.list_products(0, 0).await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].id, 1);

        let tail = shop.list_products(5, 10).await.unwrap();
        let ids: Vec<i64> = tail.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![11, 12]);
    }
}
