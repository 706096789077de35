//! End-to-end tests: HTTP API, loyalty service and reconciliation pipeline
//! running together over the in-memory store and the stub accrual system.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{EncodingKey, Header};
use loyalty_domain::{Order, OrderStatus, UserId};
use loyalty_reconcile::{AccrualError, NoopObserver, OracleStatus, ReconcileConfig, StubAccrual};
use loyalty_store::{MemoryStore, OrderRepository};
use loyaltyd::{Claims, Config, Daemon, LoyaltyService};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn token(config: &Config, user_id: UserId) -> String {
    let exp = (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64;
    jsonwebtoken::encode(
        &Header::default(),
        &Claims { sub: user_id, exp },
        &EncodingKey::from_secret(config.token_key.as_bytes()),
    )
    .unwrap()
}

async fn wait_for_status(store: &MemoryStore, order: &Order, status: OrderStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let saved = store.find_by_id(order.id).await.unwrap().unwrap();
        if saved.status == status {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "order {} stuck in {}, expected {}",
            saved.number,
            saved.status,
            status
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_uploaded_order_is_credited_over_http() {
    let config = Config::test();
    let store = Arc::new(MemoryStore::new());
    let accrual = Arc::new(StubAccrual::new());
    accrual.respond("79927398713", OracleStatus::Processed, Some(dec!(500)));

    let daemon = Daemon::new(config.clone(), store, accrual).unwrap();
    let shutdown = CancellationToken::new();
    let (addr, server) = daemon.start_api_server(shutdown.clone()).await.unwrap();
    let base = format!("http://{}", addr);

    let client = reqwest::Client::new();
    let user = Uuid::now_v7();
    let bearer = token(&config, user);

    let response = client
        .post(format!("{}/api/user/orders", base))
        .bearer_auth(&bearer)
        .header("Content-Type", "text/plain")
        .body("79927398713")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let balance: serde_json::Value = client
            .get(format!("{}/api/user/balance", base))
            .bearer_auth(&bearer)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if balance["current"] == 500.0 {
            assert_eq!(balance["withdrawn"], 0.0);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "balance never credited");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let response = client
        .post(format!("{}/api/user/balance/withdraw", base))
        .bearer_auth(&bearer)
        .json(&serde_json::json!({ "order": "2377225624", "sum": 120.5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let withdrawals: Vec<serde_json::Value> = client
        .get(format!("{}/api/user/withdrawals", base))
        .bearer_auth(&bearer)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0]["sum"], 120.5);

    let metrics = client.get(format!("{}/metrics", base)).send().await.unwrap().text().await.unwrap();
    assert!(metrics.contains(r#"loyalty_oracle_responses_total{outcome="report"}"#));

    daemon.shutdown(shutdown, server).await;
}

#[tokio::test]
async fn test_discovery_recovers_dropped_submissions() {
    let store = Arc::new(MemoryStore::new());
    let accrual = Arc::new(StubAccrual::new());
    accrual.set_latency(Duration::from_millis(20));

    let numbers = ["79927398713", "4561261212345467", "2377225624", "18", "26"];
    for number in numbers {
        accrual.respond(number, OracleStatus::Processed, Some(dec!(10)));
    }

    let config = ReconcileConfig {
        queue_capacity: 1,
        flush_interval: Duration::from_millis(20),
        discovery_interval: Duration::from_millis(50),
    };
    let service =
        LoyaltyService::start("e2e-key", store.clone(), accrual, config, Arc::new(NoopObserver))
            .unwrap();

    let user = Uuid::now_v7();
    let mut orders = Vec::new();
    for number in numbers {
        orders.push(service.create_order(user, number).await.unwrap());
    }

    for order in &orders {
        wait_for_status(&store, order, OrderStatus::Processed).await;
    }
    let balance = service.balance(user).await.unwrap();
    assert_eq!(balance.current.as_decimal(), dec!(50));

    service.shutdown().await;
}

#[tokio::test]
async fn test_rate_limited_order_is_retried_later() {
    let store = Arc::new(MemoryStore::new());
    let accrual = Arc::new(StubAccrual::new());
    accrual.fail("79927398713", AccrualError::RateLimited { retry_after: None });

    let config = ReconcileConfig {
        queue_capacity: 8,
        flush_interval: Duration::from_millis(20),
        discovery_interval: Duration::from_millis(50),
    };
    let service = LoyaltyService::start(
        "e2e-key",
        store.clone(),
        accrual.clone(),
        config,
        Arc::new(NoopObserver),
    )
    .unwrap();

    let user = Uuid::now_v7();
    let order = service.create_order(user, "79927398713").await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let saved = store.find_by_id(order.id).await.unwrap().unwrap();
    assert_eq!(saved.status, OrderStatus::New);
    assert!(!accrual.calls().is_empty());

    accrual.respond("79927398713", OracleStatus::Processing, None);
    wait_for_status(&store, &order, OrderStatus::Processing).await;

    accrual.respond("79927398713", OracleStatus::Invalid, None);
    wait_for_status(&store, &order, OrderStatus::Invalid).await;

    let balance = service.balance(user).await.unwrap();
    assert_eq!(balance.current.as_decimal(), dec!(0));

    service.shutdown().await;
}
