//! HTTP request handlers with OpenAPI documentation.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::Value;
use tracing::{error, warn};
use utoipa::OpenApi;

use super::auth::AuthUser;
use super::{payments, wallets};
use crate::app::AppState;
use crate::domain::{
    AppError, BlockchainError, DatabaseError, ErrorDetail, ErrorResponse, ExternalServiceError,
    HealthResponse, HealthStatus, PremiumInfo, RateLimitResponse, WebhookAck, WebhookError,
};

/// Header carrying the hex HMAC-SHA256 of the canonical request body
pub const SIGNATURE_HEADER: &str = "x-signature";

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CORIA Backend API",
        version = "0.1.0",
        description = "Wallets, SOL payments, premium subscriptions and webhook ingestion for the CORIA app",
        license(
            name = "MIT"
        )
    ),
    paths(
        health_check_handler,
        liveness_handler,
        readiness_handler,
        solana_webhook_handler,
        payment_webhook_handler,
        premium_status_handler,
        cancel_premium_handler,
        payments::create_payment_handler,
        payments::list_payments_handler,
        payments::get_payment_handler,
        payments::confirm_payment_handler,
        payments::attach_signature_handler,
        payments::payment_stats_handler,
        payments::donation_total_handler,
        payments::payment_config_handler,
        payments::sol_to_lamports_handler,
        payments::lamports_to_sol_handler,
        wallets::connect_wallet_handler,
        wallets::list_wallets_handler,
        wallets::wallet_summary_handler,
        wallets::get_wallet_handler,
        wallets::update_wallet_handler,
        wallets::remove_wallet_handler,
        wallets::set_primary_wallet_handler,
        wallets::refresh_balance_handler,
        wallets::wallet_activity_handler,
    ),
    components(
        schemas(
            crate::domain::SolanaWallet,
            crate::domain::SolanaPayment,
            crate::domain::WalletActivity,
            crate::domain::WalletType,
            crate::domain::PaymentKind,
            crate::domain::PaymentStatus,
            crate::domain::PremiumStatus,
            crate::domain::ConnectWalletRequest,
            crate::domain::UpdateWalletRequest,
            crate::domain::CreatePaymentRequest,
            crate::domain::AttachSignatureRequest,
            crate::domain::PaymentConfirmationResult,
            crate::domain::ConfirmationOutcome,
            crate::domain::PaginatedResponse<crate::domain::SolanaPayment>,
            crate::domain::PoolConfig,
            crate::domain::DonationTotal,
            crate::domain::Balance,
            crate::domain::WalletSummary,
            crate::domain::PaymentStats,
            crate::domain::UserPaymentStats,
            crate::domain::SolToLamportsResponse,
            crate::domain::LamportsToSolResponse,
            crate::domain::PaymentWebhookEvent,
            crate::domain::SolanaWebhookEvent,
            PremiumInfo,
            WebhookAck,
            HealthResponse,
            HealthStatus,
            crate::domain::HealthServices,
            crate::domain::ServiceCheck,
            crate::domain::CheckStatus,
            ErrorResponse,
            ErrorDetail,
            RateLimitResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "webhooks", description = "Signed inbound notifications"),
        (name = "payments", description = "SOL donations and premium payments"),
        (name = "wallets", description = "Connected Solana wallets"),
        (name = "premium", description = "Premium subscription status")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` security scheme used by authenticated routes
struct BearerAuth;

impl utoipa::Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// Detailed health check
///
/// Always answers 200; a failing dependency shows up as `degraded`.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Health status", body = HealthResponse)
    )
)]
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness check
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Application is alive")
    )
)]
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness check
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies are reachable"),
        (status = 503, description = "At least one dependency is failing")
    )
)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn signature_header(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Webhook(WebhookError::MissingSignature))
}

fn parse_webhook_body(body: &Bytes) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Webhook body is not valid JSON");
        AppError::Webhook(WebhookError::MalformedPayload(e.to_string()))
    })
}

/// Receive a blockchain indexer notification
///
/// The body is a transaction event or an array of them. Signatures that
/// match a pending payment trigger its confirmation.
#[utoipa::path(
    post,
    path = "/webhooks/solana",
    tag = "webhooks",
    request_body = Vec<crate::domain::SolanaWebhookEvent>,
    params(
        ("x-signature" = String, Header, description = "Hex HMAC-SHA256 of the canonical JSON body")
    ),
    responses(
        (status = 200, description = "Delivery accepted", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature, or body is not JSON", body = ErrorResponse)
    )
)]
pub async fn solana_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = signature_header(&headers)?;
    let payload = parse_webhook_body(&body)?;
    let ack = state
        .service
        .handle_solana_webhook(&payload, Some(signature))
        .await?;
    Ok(Json(ack))
}

/// Receive a payment processor notification
#[utoipa::path(
    post,
    path = "/webhooks/payment",
    tag = "webhooks",
    request_body = crate::domain::PaymentWebhookEvent,
    params(
        ("x-signature" = String, Header, description = "Hex HMAC-SHA256 of the canonical JSON body")
    ),
    responses(
        (status = 200, description = "Delivery accepted", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature, or body is not JSON", body = ErrorResponse)
    )
)]
pub async fn payment_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = signature_header(&headers)?;
    let payload = parse_webhook_body(&body)?;
    let ack = state
        .service
        .handle_payment_webhook(&payload, Some(signature))
        .await?;
    Ok(Json(ack))
}

/// Premium subscription status of the caller
#[utoipa::path(
    get,
    path = "/premium/status",
    tag = "premium",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Premium status", body = PremiumInfo),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    )
)]
pub async fn premium_status_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<PremiumInfo>, AppError> {
    let info = state.service.premium_status(user.user_id).await?;
    Ok(Json(info))
}

/// Cancel the caller's running premium subscription
///
/// The subscription ends immediately; a later premium payment starts a new
/// period from the time it is confirmed.
#[utoipa::path(
    delete,
    path = "/premium/cancel",
    tag = "premium",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Subscription cancelled", body = PremiumInfo),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 404, description = "No active premium subscription", body = ErrorResponse)
    )
)]
pub async fn cancel_premium_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<PremiumInfo>, AppError> {
    let info = state.service.cancel_premium(user.user_id).await?;
    Ok(Json(info))
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_type, message) = match &self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database_error",
                    self.to_string(),
                ),
                DatabaseError::NotFound(what) => {
                    (StatusCode::NOT_FOUND, "not_found", format!("{} not found", what))
                }
                DatabaseError::Duplicate(detail) => {
                    (StatusCode::CONFLICT, "duplicate", detail.clone())
                }
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    self.to_string(),
                ),
            },
            AppError::Blockchain(bc_err) => match bc_err {
                BlockchainError::Connection(_) => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "blockchain_error",
                    self.to_string(),
                ),
                BlockchainError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                BlockchainError::InvalidAddress(_) => (
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    self.to_string(),
                ),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "blockchain_error",
                    self.to_string(),
                ),
            },
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::Unavailable(_) => (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    self.to_string(),
                ),
                ExternalServiceError::Timeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", self.to_string())
                }
                ExternalServiceError::RateLimited(_) => (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    self.to_string(),
                ),
                _ => (
                    StatusCode::BAD_GATEWAY,
                    "external_service_error",
                    self.to_string(),
                ),
            },
            AppError::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
                self.to_string(),
            ),
            AppError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            AppError::Webhook(hook_err) => {
                (StatusCode::BAD_REQUEST, "webhook_error", hook_err.to_string())
            }
            AppError::Authentication(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_error",
                self.to_string(),
            ),
            AppError::Authorization(_) => (
                StatusCode::FORBIDDEN,
                "authorization_error",
                self.to_string(),
            ),
            AppError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error",
                self.to_string(),
            ),
            AppError::Deserialization(_) => (
                StatusCode::BAD_REQUEST,
                "deserialization_error",
                self.to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                self.to_string(),
            ),
            AppError::NotSupported(_) => (
                StatusCode::NOT_IMPLEMENTED,
                "not_supported",
                self.to_string(),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Rate limit exceeded".to_string(),
            ),
        };

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}
