//! Integration test: orders left pending in PostgreSQL by a previous run are
//! reconciled by discovery after restart.
//!
//! Run with: `cargo test -p loyaltyd --features postgres pg_restart`

#![cfg(feature = "postgres")]

use std::sync::Arc;
use std::time::Duration;

use loyalty_domain::{Order, OrderNumber, OrderStatus};
use loyalty_reconcile::{NoopObserver, OracleStatus, ReconcileConfig, StubAccrual};
use loyalty_store::{OrderRepository, PgStore};
use loyaltyd::LoyaltyService;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[sqlx::test(migrations = "../migrations")]
async fn test_pg_restart_recovers_pending_orders(pool: sqlx::PgPool) {
    let store = Arc::new(PgStore::new(pool));
    let user = Uuid::now_v7();

    // Left behind by a previous run that never reached the accrual system
    let order = Order::new(user, OrderNumber::parse("79927398713").unwrap());
    store.create_order(&order).await.unwrap();

    let accrual = Arc::new(StubAccrual::new());
    accrual.respond("79927398713", OracleStatus::Processed, Some(dec!(350.5)));

    let config = ReconcileConfig {
        queue_capacity: 8,
        flush_interval: Duration::from_millis(20),
        discovery_interval: Duration::from_millis(50),
    };
    let service =
        LoyaltyService::start("pg-key", store.clone(), accrual, config, Arc::new(NoopObserver))
            .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let saved = store.find_by_id(order.id).await.unwrap().unwrap();
        if saved.status == OrderStatus::Processed {
            assert_eq!(saved.accrual.unwrap().as_decimal(), dec!(350.5));
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "pending order never reconciled");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let balance = service.balance(user).await.unwrap();
    assert_eq!(balance.current.as_decimal(), dec!(350.5));

    service.shutdown().await;
}
