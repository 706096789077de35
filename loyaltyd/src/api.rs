//! HTTP API for loyalty clients.
//!
//! Provides REST endpoints for:
//! - Health check and Prometheus metrics
//! - Uploading and listing orders
//! - Balance, withdrawals and withdrawal history
//!
//! Every `/api/user` route requires `Authorization: Bearer <jwt>`. Gzip
//! request bodies are accepted and responses are gzipped when the client
//! sends `Accept-Encoding: gzip`.

use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::SecondsFormat;
use loyalty_domain::{Balance, Order, OrderStatus, Points, UserId, Withdrawal};
use loyalty_store::Store;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::metrics::Metrics;
use crate::service::{LoyaltyService, ServiceError};

// =============================================================================
// State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: Store + ?Sized> {
    /// Loyalty operations
    pub service: Arc<LoyaltyService<S>>,
    /// Metrics exposed on `/metrics`
    pub metrics: Metrics,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An uploaded order as shown to its owner.
#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Points>,
    pub uploaded_at: String,
}

/// Balance response.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub current: Points,
    pub withdrawn: Points,
}

/// Request to spend points.
#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: Decimal,
}

/// A past withdrawal.
#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: Points,
    pub processed_at: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// =============================================================================
// Authentication
// =============================================================================

/// The user a verified bearer token was issued to.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<Arc<ApiState<S>>> for AuthUser
where
    S: Store + ?Sized + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ApiState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| to_error_response(ServiceError::Unauthorized))?;

        state.service.verify_token(token.trim()).map(AuthUser).map_err(to_error_response)
    }
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: Store + ?Sized + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler::<S>))
        .route("/api/user/orders", post(upload_order_handler::<S>).get(orders_handler::<S>))
        .route("/api/user/balance", get(balance_handler::<S>))
        .route("/api/user/balance/withdraw", post(withdraw_handler::<S>))
        .route("/api/user/withdrawals", get(withdrawals_handler::<S>))
        .layer(RequestDecompressionLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Prometheus text exposition.
async fn metrics_handler<S>(State(state): State<Arc<ApiState<S>>>) -> Result<Response, ApiError>
where
    S: Store + ?Sized + 'static,
{
    let text = state.metrics.encode_text().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: e.to_string() }))
    })?;

    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
}

/// Upload an order number (plain text body).
async fn upload_order_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthUser(user_id): AuthUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError>
where
    S: Store + ?Sized + 'static,
{
    let is_text = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/plain"));
    if !is_text {
        return Err(bad_request("Content-Type must be text/plain"));
    }

    let number = std::str::from_utf8(&body)
        .map_err(|_| bad_request("Request body is not valid UTF-8"))?
        .trim();
    if number.is_empty() {
        return Err(bad_request("Request body is empty"));
    }

    match state.service.create_order(user_id, number).await {
        Ok(_) => Ok(StatusCode::ACCEPTED),
        Err(ServiceError::OrderAlreadyUploaded) => Ok(StatusCode::OK),
        Err(e) => Err(to_error_response(e)),
    }
}

/// List the caller's orders, newest first.
async fn orders_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthUser(user_id): AuthUser,
) -> Result<Response, ApiError>
where
    S: Store + ?Sized + 'static,
{
    let orders = state.service.orders(user_id).await.map_err(to_error_response)?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<OrderResponse> = orders.iter().map(order_to_response).collect();
    Ok(Json(body).into_response())
}

/// Get the caller's balance.
async fn balance_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<BalanceResponse>, ApiError>
where
    S: Store + ?Sized + 'static,
{
    let balance = state.service.balance(user_id).await.map_err(to_error_response)?;
    Ok(Json(balance_to_response(&balance)))
}

/// Spend points against a new order number.
async fn withdraw_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthUser(user_id): AuthUser,
    request: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError>
where
    S: Store + ?Sized + 'static,
{
    let Json(req) = request.map_err(|e| bad_request(&e.body_text()))?;

    match state.service.withdraw(user_id, &req.order, req.sum).await {
        Ok(_) => Ok(StatusCode::OK),
        Err(ServiceError::OrderAlreadyUploaded) => Ok(StatusCode::OK),
        Err(e) => Err(to_error_response(e)),
    }
}

/// List the caller's withdrawals, newest first.
async fn withdrawals_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    AuthUser(user_id): AuthUser,
) -> Result<Response, ApiError>
where
    S: Store + ?Sized + 'static,
{
    let withdrawals = state.service.withdrawals(user_id).await.map_err(to_error_response)?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals.iter().map(withdrawal_to_response).collect();
    Ok(Json(body).into_response())
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: ServiceError) -> ApiError {
    let status = match &error {
        ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
        ServiceError::InvalidOrderNumber(_) | ServiceError::InvalidAmount(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        },
        ServiceError::OrderAlreadyUploaded | ServiceError::OrderTakenByOther => {
            StatusCode::CONFLICT
        },
        ServiceError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
        ServiceError::EmptyTokenKey | ServiceError::Reconcile(_) | ServiceError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    };

    if status.is_server_error() {
        error!(error = %error, "Request failed");
    } else if status == StatusCode::UNAUTHORIZED {
        debug!("Request rejected: {}", error);
    } else {
        warn!(error = %error, "Request rejected");
    }

    (status, Json(ErrorResponse { error: error.to_string() }))
}

fn bad_request(message: &str) -> ApiError {
    warn!(reason = message, "Bad request");
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message.to_string() }))
}

fn order_to_response(order: &Order) -> OrderResponse {
    OrderResponse {
        number: order.number.to_string(),
        status: order.status,
        accrual: order.accrual,
        uploaded_at: order.uploaded_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

fn balance_to_response(balance: &Balance) -> BalanceResponse {
    BalanceResponse { current: balance.current, withdrawn: balance.withdrawn }
}

fn withdrawal_to_response(withdrawal: &Withdrawal) -> WithdrawalResponse {
    WithdrawalResponse {
        order: withdrawal.order_number.to_string(),
        sum: withdrawal.sum,
        processed_at: withdrawal.processed_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

// =============================================================================
// Tests
// =============================================================================
