//! Purchase scenarios against the in-memory store.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use futures::future::join_all;
use shared::OrderStatus;
use shop_service::{
    in_memory_orchestrator, InMemoryShop, OrderLedger, ShopError, ShopOrchestrator,
};

const PAYMENTS: &str = "https://payments.test/orders";

async fn shop_with(stock: i32) -> (InMemoryShop, Arc<ShopOrchestrator>, i64) {
    let store = InMemoryShop::new();
    let product = store
        .insert_product("Mechanical keyboard", "89.50".parse().unwrap(), stock)
        .await;
    let shop = Arc::new(in_memory_orchestrator(&store, PAYMENTS));
    (store, shop, product.id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_buyers_race_for_the_same_stock() {
    let (store, shop, product_id) = shop_with(5).await;

    let first = tokio::spawn({
        let shop = shop.clone();
        async move { shop.make_order(1, product_id, 3).await }
    });
    let second = tokio::spawn({
        let shop = shop.clone();
        async move { shop.make_order(2, product_id, 3).await }
    });

    let results = [first.await.unwrap(), second.await.unwrap()];
    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let losers: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].status, OrderStatus::Reserved);
    assert_eq!(losers.len(), 1);
    assert!(matches!(losers[0], ShopError::InsufficientStock { .. }));
    assert_eq!(store.stock_of(product_id).await, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_reservations_never_oversell() {
    let initial = 37;
    let (store, shop, product_id) = shop_with(initial).await;

    let attempts = (0..60).map(|i| {
        let shop = shop.clone();
        let quantity = (i % 4) + 1;
        tokio::spawn(async move {
            let result = shop.make_order(i64::from(i) + 1, product_id, quantity).await;
            (quantity, result)
        })
    });

    let mut reserved = 0;
    for outcome in join_all(attempts).await {
        let (quantity, result) = outcome.unwrap();
        match result {
            Ok(_) => reserved += quantity,
            Err(ShopError::InsufficientStock { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(reserved <= initial);
    assert_eq!(store.stock_of(product_id).await, Some(initial - reserved));
}

#[tokio::test]
async fn failed_payment_returns_stock() {
    let (store, shop, product_id) = shop_with(2).await;

    let order = shop.make_order(7, product_id, 2).await.unwrap();
    assert_eq!(store.stock_of(product_id).await, Some(0));

    shop.confirm_payment(order.id, false).await.unwrap();

    assert_eq!(store.order(order.id).await.unwrap().status, OrderStatus::Canceled);
    assert_eq!(store.stock_of(product_id).await, Some(2));
}

#[tokio::test]
async fn payment_callbacks_can_be_redelivered() {
    let (store, shop, product_id) = shop_with(4).await;
    let order = shop.make_order(7, product_id, 1).await.unwrap();

    shop.confirm_payment(order.id, true).await.unwrap();
    shop.confirm_payment(order.id, true).await.unwrap();
    // A late failure report must not undo the confirmed payment.
    shop.confirm_payment(order.id, false).await.unwrap();

    assert_eq!(store.order(order.id).await.unwrap().status, OrderStatus::Confirmed);
    assert_eq!(store.stock_of(product_id).await, Some(3));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callbacks_converge_on_one_outcome() {
    let (store, shop, product_id) = shop_with(3).await;
    let order_id = shop.make_order(7, product_id, 3).await.unwrap().id;

    let callbacks = (0..10).map(|i| {
        let shop = shop.clone();
        tokio::spawn(async move { shop.confirm_payment(order_id, i % 2 == 0).await })
    });
    for result in join_all(callbacks).await {
        result.unwrap().unwrap();
    }

    let settled = store.order(order_id).await.unwrap();
    match settled.status {
        OrderStatus::Confirmed => assert_eq!(store.stock_of(product_id).await, Some(0)),
        OrderStatus::Canceled => assert_eq!(store.stock_of(product_id).await, Some(3)),
        OrderStatus::Reserved => panic!("order left reserved"),
    }
}

#[tokio::test]
async fn unknown_order_callback_is_an_error() {
    let (_, shop, _) = shop_with(1).await;
    let err = shop.confirm_payment(12345, true).await.unwrap_err();
    assert!(matches!(err, ShopError::OrderNotFound(12345)));
}

#[tokio::test]
async fn storage_fault_during_reserve_is_atomic() {
    let (store, shop, product_id) = shop_with(5).await;
    store.set_storage_fault(true).await;

    let err = shop.make_order(1, product_id, 2).await.unwrap_err();

    assert!(err.is_internal());
    assert_eq!(store.order_count().await, 0);
    assert_eq!(store.stock_of(product_id).await, Some(5));
}

#[tokio::test]
async fn missing_product_is_not_found() {
    let (_, shop, _) = shop_with(1).await;
    assert!(matches!(shop.get_product(999).await, Err(ShopError::ProductNotFound(999))));
}

#[tokio::test]
async fn sum_is_fixed_at_reservation_time() {
    let (_, shop, product_id) = shop_with(5).await;
    let order = shop.make_order(1, product_id, 2).await.unwrap();
    let expected: BigDecimal = "179.00".parse().unwrap();
    assert_eq!(order.sum, expected);
}

#[tokio::test]
async fn history_is_most_recent_first() {
    let (_, shop, product_id) = shop_with(10).await;
    let older = shop.make_order(3, product_id, 1).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = shop.make_order(3, product_id, 2).await.unwrap();
    shop.make_order(4, product_id, 1).await.unwrap();

    let history = shop.get_order_history(3).await.unwrap();
    let ids: Vec<i64> = history.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);
}
