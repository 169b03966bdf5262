//! Payment endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use super::auth::AuthUser;
use crate::app::AppState;
use crate::domain::{
    AppError, AttachSignatureRequest, CreatePaymentRequest, DonationTotal, ErrorResponse,
    LamportsToSolResponse, PaginatedResponse, PaymentConfirmationResult, PaymentKind,
    PaymentListParams, PoolConfig, RateLimitResponse, SolToLamportsResponse, SolanaPayment,
    StatsParams, UserPaymentStats,
};

/// Create a pending payment
///
/// Repeating a request with the same `idempotencyKey` within 24 hours
/// returns the original payment with status 200 instead of 201.
#[utoipa::path(
    post,
    path = "/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    request_body = CreatePaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = SolanaPayment),
        (status = 200, description = "Existing payment for this idempotency key", body = SolanaPayment),
        (status = 400, description = "Invalid amount, wallet or signature", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse),
        (status = 409, description = "Transaction signature already used", body = ErrorResponse),
        (status = 429, description = "Rate limit exceeded", body = RateLimitResponse)
    )
)]
pub async fn create_payment_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<SolanaPayment>), AppError> {
    let (payment, created) = state.service.create_payment(user.user_id, &payload).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(payment)))
}

/// List own payments, newest first
#[utoipa::path(
    get,
    path = "/payments",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("limit" = Option<i64>, Query, description = "Maximum number of payments to return (1-100, default: 20)"),
        ("cursor" = Option<Uuid>, Query, description = "Id of the last payment of the previous page"),
        ("type" = Option<PaymentKind>, Query, description = "Only payments of this kind, e.g. `donation` for the donation history")
    ),
    responses(
        (status = 200, description = "Page of payments", body = PaginatedResponse<SolanaPayment>),
        (status = 400, description = "Invalid pagination parameters", body = ErrorResponse),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    )
)]
pub async fn list_payments_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<PaymentListParams>,
) -> Result<Json<PaginatedResponse<SolanaPayment>>, AppError> {
    let page = state.service.list_payments(user.user_id, &params).await?;
    Ok(Json(page))
}

/// Get one of the caller's payments
#[utoipa::path(
    get,
    path = "/payments/{id}",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Payment found", body = SolanaPayment),
        (status = 404, description = "Payment not found", body = ErrorResponse)
    )
)]
pub async fn get_payment_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SolanaPayment>, AppError> {
    let payment = state.service.get_payment(user.user_id, id).await?;
    Ok(Json(payment))
}

/// Check a payment against the chain
///
/// A pending payment with an attached signature is verified on-chain and
/// either confirmed (ledger entry, premium activation) or failed. Payments
/// that already left `pending` are reported with reason `Already processed`.
#[utoipa::path(
    post,
    path = "/payments/{id}/confirm",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    responses(
        (status = 200, description = "Outcome of the confirmation check", body = PaymentConfirmationResult),
        (status = 404, description = "Payment not found", body = ErrorResponse),
        (status = 503, description = "Solana RPC unavailable", body = ErrorResponse)
    )
)]
pub async fn confirm_payment_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentConfirmationResult>, AppError> {
    let result = state.service.confirm_payment_for_user(user.user_id, id).await?;
    Ok(Json(result))
}

/// Attach the paying transaction signature to a pending payment
#[utoipa::path(
    patch,
    path = "/payments/{id}/signature",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Payment ID")
    ),
    request_body = AttachSignatureRequest,
    responses(
        (status = 200, description = "Signature attached", body = SolanaPayment),
        (status = 400, description = "Invalid signature or payment not pending", body = ErrorResponse),
        (status = 404, description = "Payment not found", body = ErrorResponse),
        (status = 409, description = "Signature used by another payment", body = ErrorResponse)
    )
)]
pub async fn attach_signature_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AttachSignatureRequest>,
) -> Result<Json<SolanaPayment>, AppError> {
    let payment = state
        .service
        .attach_signature(user.user_id, id, &payload)
        .await?;
    Ok(Json(payment))
}

/// Payment totals of the caller over the last `days` days
#[utoipa::path(
    get,
    path = "/payments/stats",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("days" = Option<i64>, Query, description = "Look-back window in days (1-365, default: 30)")
    ),
    responses(
        (status = 200, description = "Payment statistics", body = UserPaymentStats),
        (status = 400, description = "Invalid window", body = ErrorResponse)
    )
)]
pub async fn payment_stats_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<StatsParams>,
) -> Result<Json<UserPaymentStats>, AppError> {
    let stats = state.service.payment_stats(user.user_id, params.days).await?;
    Ok(Json(stats))
}

/// Sum and count of the caller's confirmed donations
#[utoipa::path(
    get,
    path = "/payments/donations/total",
    tag = "payments",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Confirmed donation total", body = DonationTotal),
        (status = 401, description = "Missing or invalid access token", body = ErrorResponse)
    )
)]
pub async fn donation_total_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<DonationTotal>, AppError> {
    let total = state.service.donation_total(user.user_id).await?;
    Ok(Json(total))
}

/// Pool addresses and premium pricing
#[utoipa::path(
    get,
    path = "/payments/config",
    tag = "payments",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Payment configuration", body = PoolConfig)
    )
)]
pub async fn payment_config_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Json<PoolConfig> {
    Json(state.service.pool_config())
}

#[utoipa::path(
    get,
    path = "/payments/convert/sol-to-lamports/{sol}",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("sol" = f64, Path, description = "Positive SOL amount")
    ),
    responses(
        (status = 200, description = "Converted amount", body = SolToLamportsResponse),
        (status = 400, description = "Amount is not a positive number", body = ErrorResponse)
    )
)]
pub async fn sol_to_lamports_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(sol): Path<String>,
) -> Result<Json<SolToLamportsResponse>, AppError> {
    let sol: f64 = sol
        .trim()
        .parse()
        .map_err(|_| AppError::invalid_field("sol", "Amount must be a positive number"))?;
    Ok(Json(state.service.sol_to_lamports(sol)?))
}

#[utoipa::path(
    get,
    path = "/payments/convert/lamports-to-sol/{lamports}",
    tag = "payments",
    security(("bearer_auth" = [])),
    params(
        ("lamports" = i64, Path, description = "Positive lamport amount")
    ),
    responses(
        (status = 200, description = "Converted amount", body = LamportsToSolResponse),
        (status = 400, description = "Amount is not a positive integer", body = ErrorResponse)
    )
)]
pub async fn lamports_to_sol_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(lamports): Path<String>,
) -> Result<Json<LamportsToSolResponse>, AppError> {
    let lamports: i64 = lamports
        .trim()
        .parse()
        .map_err(|_| AppError::invalid_field("lamports", "Amount must be a positive integer"))?;
    Ok(Json(state.service.lamports_to_sol(lamports)?))
}
