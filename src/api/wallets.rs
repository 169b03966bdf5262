//! Wallet endpoints.

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
    ActivityParams, AppError, Balance, ConnectWalletRequest, ErrorResponse, SolanaWallet,
    UpdateWalletRequest, WalletActivity, WalletSummary,
};

/// Connect an external wallet by public key
///
/// The first wallet a user connects becomes primary.
#[utoipa::path(
    post,
    path = "/wallets/connect",
    tag = "wallets",
    security(("bearer_auth" = [])),
    request_body = ConnectWalletRequest,
    responses(
        (status = 201, description = "Wallet connected", body = SolanaWallet),
        (status = 400, description = "Invalid public key", body = ErrorResponse),
        (status = 409, description = "Wallet already connected", body = ErrorResponse)
    )
)]
pub async fn connect_wallet_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<ConnectWalletRequest>,
) -> Result<(StatusCode, Json<SolanaWallet>), AppError> {
    let wallet = state
        .wallet_service
        .connect_wallet(user.user_id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(wallet)))
}

#[utoipa::path(
    get,
    path = "/wallets",
    tag = "wallets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active wallets, primary first", body = Vec<SolanaWallet>)
    )
)]
pub async fn list_wallets_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<SolanaWallet>>, AppError> {
    let wallets = state.wallet_service.list_wallets(user.user_id).await?;
    Ok(Json(wallets))
}

/// Wallets of the caller with the primary one and the total stored balance
#[utoipa::path(
    get,
    path = "/wallets/me",
    tag = "wallets",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Wallet summary", body = WalletSummary)
    )
)]
pub async fn wallet_summary_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<WalletSummary>, AppError> {
    let summary = state.wallet_service.wallet_summary(user.user_id).await?;
    Ok(Json(summary))
}

#[utoipa::path(
    get,
    path = "/wallets/{id}",
    tag = "wallets",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Wallet ID")
    ),
    responses(
        (status = 200, description = "Wallet found", body = SolanaWallet),
        (status = 404, description = "Wallet not found", body = ErrorResponse)
    )
)]
pub async fn get_wallet_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SolanaWallet>, AppError> {
    let wallet = state.wallet_service.get_wallet(user.user_id, id).await?;
    Ok(Json(wallet))
}

#[utoipa::path(
    patch,
    path = "/wallets/{id}",
    tag = "wallets",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Wallet ID")
    ),
    request_body = UpdateWalletRequest,
    responses(
        (status = 200, description = "Wallet updated", body = SolanaWallet),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 404, description = "Wallet not found", body = ErrorResponse)
    )
)]
pub async fn update_wallet_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateWalletRequest>,
) -> Result<Json<SolanaWallet>, AppError> {
    let wallet = state
        .wallet_service
        .update_wallet(user.user_id, id, payload)
        .await?;
    Ok(Json(wallet))
}

/// Disconnect a wallet (soft delete)
#[utoipa::path(
    delete,
    path = "/wallets/{id}",
    tag = "wallets",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Wallet ID")
    ),
    responses(
        (status = 204, description = "Wallet disconnected"),
        (status = 404, description = "Wallet not found", body = ErrorResponse)
    )
)]
pub async fn remove_wallet_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.wallet_service.remove_wallet(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Make a wallet the caller's primary wallet
#[utoipa::path(
    post,
    path = "/wallets/{id}/primary",
    tag = "wallets",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Wallet ID")
    ),
    responses(
        (status = 200, description = "Primary wallet set", body = SolanaWallet),
        (status = 404, description = "Wallet not found", body = ErrorResponse)
    )
)]
pub async fn set_primary_wallet_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SolanaWallet>, AppError> {
    let wallet = state.wallet_service.set_primary(user.user_id, id).await?;
    Ok(Json(wallet))
}

/// Re-read the on-chain balance of a wallet
#[utoipa::path(
    post,
    path = "/wallets/{id}/refresh-balance",
    tag = "wallets",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Wallet ID")
    ),
    responses(
        (status = 200, description = "Current balance", body = Balance),
        (status = 404, description = "Wallet not found", body = ErrorResponse),
        (status = 503, description = "Solana RPC unavailable", body = ErrorResponse)
    )
)]
pub async fn refresh_balance_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Balance>, AppError> {
    let balance = state.wallet_service.refresh_balance(user.user_id, id).await?;
    Ok(Json(balance))
}

#[utoipa::path(
    get,
    path = "/wallets/activity",
    tag = "wallets",
    security(("bearer_auth" = [])),
    params(
        ("limit" = Option<i64>, Query, description = "Entries to return (1-100, default: 20)")
    ),
    responses(
        (status = 200, description = "Recent wallet activity", body = Vec<WalletActivity>)
    )
)]
pub async fn wallet_activity_handler(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(params): Query<ActivityParams>,
) -> Result<Json<Vec<WalletActivity>>, AppError> {
    let activity = state
        .wallet_service
        .recent_activity(user.user_id, params.limit)
        .await?;
    Ok(Json(activity))
}
