//! Application service behind the HTTP API.
//!
//! Validates user input, talks to the store and hands fresh orders to the
//! reconciliation pipeline. Owns the running [`Reconciler`].

use std::sync::{Arc, Mutex};

use jsonwebtoken::{DecodingKey, Validation};
use loyalty_domain::{
    Balance, DomainError, Order, OrderNumber, Points, UserId, Withdrawal,
};
use loyalty_reconcile::{
    AccrualPort, DropReason, ReconcileConfig, ReconcileError, ReconcileObserver, Reconciler,
    Submission,
};
use loyalty_store::{ConflictKind, Store, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced to API callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Service started without a token key
    #[error("empty token key")]
    EmptyTokenKey,

    /// Order number is malformed or fails the check digit
    #[error("invalid order number: {0}")]
    InvalidOrderNumber(String),

    /// This user already used the number
    #[error("order number has already been uploaded by this user")]
    OrderAlreadyUploaded,

    /// Another user already used the number
    #[error("order number has already been uploaded by another user")]
    OrderTakenByOther,

    /// Balance cannot cover the withdrawal
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Withdrawal sum is not a positive amount
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Missing, malformed, expired or forged bearer token
    #[error("unauthorized")]
    Unauthorized,

    /// Reconciliation pipeline could not start
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Any other store failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err.conflict_kind() {
            Some(ConflictKind::OrderNumberTaken) => ServiceError::OrderAlreadyUploaded,
            Some(ConflictKind::OrderTakenByOther) => ServiceError::OrderTakenByOther,
            Some(ConflictKind::InsufficientFunds) => ServiceError::InsufficientFunds,
            None => ServiceError::Store(err),
        }
    }
}

fn invalid_number(err: DomainError) -> ServiceError {
    ServiceError::InvalidOrderNumber(err.to_string())
}

// =============================================================================
// Tokens
// =============================================================================

/// Claims carried by bearer tokens from the auth service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: UserId,
    /// Expiration (Unix timestamp seconds)
    pub exp: u64,
}

// =============================================================================
// Loyalty Service
// =============================================================================

/// User-facing loyalty operations.
pub struct LoyaltyService<S: Store + ?Sized> {
    store: Arc<S>,
    decoding_key: DecodingKey,
    validation: Validation,
    reconciler: Mutex<Option<Reconciler>>,
}

impl<S: Store + ?Sized + 'static> LoyaltyService<S> {
    /// Validate the token key and start the reconciliation pipeline.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<A>(
        token_key: &str,
        store: Arc<S>,
        accrual: Arc<A>,
        reconcile: ReconcileConfig,
        observer: Arc<dyn ReconcileObserver>,
    ) -> Result<Self, ServiceError>
    where
        A: AccrualPort + ?Sized + 'static,
    {
        if token_key.is_empty() {
            return Err(ServiceError::EmptyTokenKey);
        }

        let reconciler =
            Reconciler::spawn_with_observer(reconcile, store.clone(), accrual, observer)?;

        Ok(Self {
            store,
            decoding_key: DecodingKey::from_secret(token_key.as_bytes()),
            validation: Validation::default(),
            reconciler: Mutex::new(Some(reconciler)),
        })
    }

    /// Register an uploaded order and queue it for reconciliation.
    ///
    /// # Errors
    /// - `InvalidOrderNumber` when the number is malformed or fails Luhn
    /// - `OrderAlreadyUploaded` when this user already uploaded it
    /// - `OrderTakenByOther` when another user did
    pub async fn create_order(&self, user_id: UserId, raw: &str) -> Result<Order, ServiceError> {
        let number = OrderNumber::parse(raw).map_err(invalid_number)?;
        let order = Order::new(user_id, number);

        self.store.orders().create_order(&order).await?;
        info!(order_number = %order.number, user_id = %user_id, "Order uploaded");

        self.submit(order.clone());
        Ok(order)
    }

    fn submit(&self, order: Order) -> Submission {
        let reconciler = self.reconciler.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match reconciler.as_ref() {
            Some(reconciler) => reconciler.submit(order),
            None => {
                debug!(order_number = %order.number, "Service stopped, order left for discovery");
                Submission::Dropped(DropReason::QueueClosed)
            },
        }
    }

    /// Orders uploaded by a user, newest first.
    pub async fn orders(&self, user_id: UserId) -> Result<Vec<Order>, ServiceError> {
        Ok(self.store.orders().find_by_user(user_id).await?)
    }

    /// Current and withdrawn points of a user.
    pub async fn balance(&self, user_id: UserId) -> Result<Balance, ServiceError> {
        Ok(self.store.balances().get_balance(user_id).await?)
    }

    /// Withdrawals made by a user, newest first.
    pub async fn withdrawals(&self, user_id: UserId) -> Result<Vec<Withdrawal>, ServiceError> {
        Ok(self.store.withdrawals().find_by_user(user_id).await?)
    }

    /// Spend `sum` points against a new order number.
    ///
    /// # Errors
    /// - `InvalidOrderNumber` when the number is malformed or fails Luhn
    /// - `InvalidAmount` when `sum` is not positive
    /// - `InsufficientFunds` when the balance cannot cover `sum`
    /// - `OrderAlreadyUploaded` / `OrderTakenByOther` when the number was
    ///   already used for a withdrawal
    pub async fn withdraw(
        &self,
        user_id: UserId,
        raw: &str,
        sum: Decimal,
    ) -> Result<Withdrawal, ServiceError> {
        let number = OrderNumber::parse(raw).map_err(invalid_number)?;
        let sum = Points::positive(sum).map_err(|e| ServiceError::InvalidAmount(e.to_string()))?;
        let withdrawal = Withdrawal::new(user_id, number, sum);

        match self.store.withdrawals().create_withdrawal(&withdrawal).await {
            Ok(()) => {
                info!(order_number = %withdrawal.order_number, sum = %sum, "Points withdrawn");
                Ok(withdrawal)
            },
            Err(e) => {
                warn!(order_number = %withdrawal.order_number, error = %e, "Withdrawal rejected");
                Err(e.into())
            },
        }
    }

    /// Check a bearer token and return the user it was issued to.
    pub fn verify_token(&self, token: &str) -> Result<UserId, ServiceError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims.sub)
            .map_err(|e| {
                debug!("JWT validation failed: {e}");
                ServiceError::Unauthorized
            })
    }

    /// Stop the reconciliation pipeline. Idempotent.
    pub async fn shutdown(&self) {
        let reconciler = self
            .reconciler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(reconciler) = reconciler {
            reconciler.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use loyalty_domain::OrderStatus;
    use loyalty_reconcile::{NoopObserver, OracleStatus, StubAccrual};
    use loyalty_store::{MemoryStore, OrderRepository};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use uuid::Uuid;

    const KEY: &str = "service-test-key";

    fn config() -> ReconcileConfig {
        ReconcileConfig {
            queue_capacity: 8,
            flush_interval: Duration::from_millis(20),
            discovery_interval: Duration::from_secs(60),
        }
    }

    fn start(
        store: Arc<MemoryStore>,
        accrual: Arc<StubAccrual>,
    ) -> LoyaltyService<MemoryStore> {
        LoyaltyService::start(KEY, store, accrual, config(), Arc::new(NoopObserver)).unwrap()
    }

    fn token(user_id: UserId, key: &str, exp: u64) -> String {
        let claims = Claims { sub: user_id, exp };
        jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(key.as_bytes()))
            .unwrap()
    }

    fn in_an_hour() -> u64 {
        (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64
    }

    async fn wait_for_status(store: &MemoryStore, order: &Order, status: OrderStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let saved = store.find_by_id(order.id).await.unwrap().unwrap();
            if saved.status == status {
                return;
            }
            assert!(tokio::time::Instant::now() < deadline, "order never reached {status}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_empty_token_key_rejected() {
        let result = LoyaltyService::start(
            "",
            Arc::new(MemoryStore::new()),
            Arc::new(StubAccrual::new()),
            config(),
            Arc::new(NoopObserver),
        );
        assert!(matches!(result, Err(ServiceError::EmptyTokenKey)));
    }

    #[tokio::test]
    async fn test_uploaded_order_is_credited() {
        let store = Arc::new(MemoryStore::new());
        let accrual = Arc::new(StubAccrual::new());
        accrual.respond("79927398713", OracleStatus::Processed, Some(dec!(500)));
        let service = start(store.clone(), accrual);
        let user = Uuid::now_v7();

        let order = service.create_order(user, "79927398713").await.unwrap();
        assert_eq!(order.status, OrderStatus::New);

        wait_for_status(&store, &order, OrderStatus::Processed).await;
        let balance = service.balance(user).await.unwrap();
        assert_eq!(balance.current.as_decimal(), dec!(500));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_order_errors() {
        let store = Arc::new(MemoryStore::new());
        let service = start(store, Arc::new(StubAccrual::new()));
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();

        assert!(matches!(
            service.create_order(alice, "12345").await,
            Err(ServiceError::InvalidOrderNumber(_))
        ));
        assert!(matches!(
            service.create_order(alice, "79927398a13").await,
            Err(ServiceError::InvalidOrderNumber(_))
        ));

        service.create_order(alice, "79927398713").await.unwrap();
        assert!(matches!(
            service.create_order(alice, "79927398713").await,
            Err(ServiceError::OrderAlreadyUploaded)
        ));
        assert!(matches!(
            service.create_order(bob, "79927398713").await,
            Err(ServiceError::OrderTakenByOther)
        ));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_withdraw() {
        let store = Arc::new(MemoryStore::new());
        let accrual = Arc::new(StubAccrual::new());
        accrual.respond("79927398713", OracleStatus::Processed, Some(dec!(729.98)));
        let service = start(store.clone(), accrual);
        let user = Uuid::now_v7();

        let order = service.create_order(user, "79927398713").await.unwrap();
        wait_for_status(&store, &order, OrderStatus::Processed).await;

        assert!(matches!(
            service.withdraw(user, "2377225624", dec!(1000)).await,
            Err(ServiceError::InsufficientFunds)
        ));
        assert!(matches!(
            service.withdraw(user, "2377225624", dec!(0)).await,
            Err(ServiceError::InvalidAmount(_))
        ));
        assert!(matches!(
            service.withdraw(user, "2377225625", dec!(1)).await,
            Err(ServiceError::InvalidOrderNumber(_))
        ));

        service.withdraw(user, "2377225624", dec!(229.98)).await.unwrap();
        assert!(matches!(
            service.withdraw(user, "2377225624", dec!(1)).await,
            Err(ServiceError::OrderAlreadyUploaded)
        ));

        let balance = service.balance(user).await.unwrap();
        assert_eq!(balance.current.as_decimal(), dec!(500));
        assert_eq!(balance.withdrawn.as_decimal(), dec!(229.98));
        assert_eq!(service.withdrawals(user).await.unwrap().len(), 1);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_verify_token() {
        let service = start(Arc::new(MemoryStore::new()), Arc::new(StubAccrual::new()));
        let user = Uuid::now_v7();

        assert_eq!(service.verify_token(&token(user, KEY, in_an_hour())).unwrap(), user);
        assert!(matches!(
            service.verify_token(&token(user, "other-key", in_an_hour())),
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(
            service.verify_token(&token(user, KEY, 1_000_000)),
            Err(ServiceError::Unauthorized)
        ));
        assert!(matches!(service.verify_token("not-a-jwt"), Err(ServiceError::Unauthorized)));

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_upload_after_shutdown_still_stored() {
        let store = Arc::new(MemoryStore::new());
        let service = start(store.clone(), Arc::new(StubAccrual::new()));
        service.shutdown().await;
        service.shutdown().await;

        let order = service.create_order(Uuid::now_v7(), "79927398713").await.unwrap();
        let saved = store.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(saved.status, OrderStatus::New);
    }
}
