//! Wallet bookkeeping for user-connected Solana wallets.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    AppError, Balance, BlockchainClient, ConnectWalletRequest, DatabaseClient, DatabaseError,
    NewActivity, NewWallet, SolanaWallet, UpdateWalletRequest, ValidationError, WalletActivity,
    WalletSummary, WalletType, WalletUpdate,
};

/// Service for connecting, updating and inspecting wallets
pub struct WalletService {
    db_client: Arc<dyn DatabaseClient>,
    blockchain_client: Arc<dyn BlockchainClient>,
}

impl WalletService {
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        blockchain_client: Arc<dyn BlockchainClient>,
    ) -> Self {
        Self {
            db_client,
            blockchain_client,
        }
    }

    /// Connect an external wallet. The user's first wallet becomes primary.
    #[instrument(skip(self, request), fields(user_id = %user_id, public_key = %request.public_key))]
    pub async fn connect_wallet(
        &self,
        user_id: Uuid,
        request: &ConnectWalletRequest,
    ) -> Result<SolanaWallet, AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            AppError::Validation(ValidationError::Multiple(e.to_string()))
        })?;

        if self
            .db_client
            .get_active_wallet_by_public_key(&request.public_key)
            .await?
            .is_some()
        {
            return Err(already_connected());
        }

        let requested_primary = request.is_primary.unwrap_or(false);
        let has_wallets = !self.db_client.list_wallets(user_id).await?.is_empty();
        let mut new_wallet = NewWallet {
            user_id,
            public_key: request.public_key.clone(),
            wallet_type: WalletType::External,
            provider: request.provider.clone(),
            name: request.name.clone(),
            is_primary: requested_primary || !has_wallets,
            metadata: request.metadata.clone().unwrap_or_else(|| json!({})),
        };

        let wallet = match self.db_client.create_wallet(&new_wallet).await {
            Ok(wallet) => wallet,
            Err(AppError::Database(DatabaseError::Duplicate(detail))) => {
                if !new_wallet.is_primary
                    || self
                        .db_client
                        .get_active_wallet_by_public_key(&request.public_key)
                        .await?
                        .is_some()
                {
                    return Err(already_connected());
                }
                // A concurrent connect of the same user took the primary slot
                debug!(detail = %detail, "Primary wallet claimed concurrently, retrying insert");
                new_wallet.is_primary = requested_primary;
                match self.db_client.create_wallet(&new_wallet).await {
                    Ok(wallet) => wallet,
                    Err(AppError::Database(DatabaseError::Duplicate(_))) => {
                        return Err(already_connected());
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        info!(wallet_id = %wallet.id, is_primary = wallet.is_primary, "Wallet connected");

        let mut activity = NewActivity::new(user_id, "wallet_connected");
        activity.wallet_id = Some(wallet.id);
        activity.description = Some(format!(
            "Connected {} wallet",
            wallet.provider.as_deref().unwrap_or("external")
        ));
        activity.metadata = json!({ "publicKey": wallet.public_key });
        self.log_activity(activity).await;

        Ok(wallet)
    }

    /// Active wallets of the user, primary first then newest first
    #[instrument(skip(self))]
    pub async fn list_wallets(&self, user_id: Uuid) -> Result<Vec<SolanaWallet>, AppError> {
        self.db_client.list_wallets(user_id).await
    }

    /// Wallets with the primary one and the stored total balance
    #[instrument(skip(self))]
    pub async fn wallet_summary(&self, user_id: Uuid) -> Result<WalletSummary, AppError> {
        let wallets = self.db_client.list_wallets(user_id).await?;
        let primary = wallets.iter().find(|w| w.is_primary).cloned();
        let total: i64 = wallets.iter().map(|w| w.balance_lamports).sum();
        Ok(WalletSummary {
            wallets,
            primary,
            total_balance: Balance::from_lamports(total),
        })
    }

    /// An active wallet owned by the user
    #[instrument(skip(self))]
    pub async fn get_wallet(&self, user_id: Uuid, id: Uuid) -> Result<SolanaWallet, AppError> {
        self.db_client
            .get_wallet(id)
            .await?
            .filter(|w| w.user_id == user_id && w.is_active)
            .ok_or_else(|| AppError::not_found(format!("Wallet {}", id)))
    }

    #[instrument(skip(self, request))]
    pub async fn update_wallet(
        &self,
        user_id: Uuid,
        id: Uuid,
        request: UpdateWalletRequest,
    ) -> Result<SolanaWallet, AppError> {
        request
            .validate()
            .map_err(|e| AppError::Validation(ValidationError::Multiple(e.to_string())))?;
        self.get_wallet(user_id, id).await?;

        let update = WalletUpdate::from(request);
        let wallet = self
            .db_client
            .update_wallet(id, &update)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Wallet {}", id)))?;

        let mut activity = NewActivity::new(user_id, "wallet_updated");
        activity.wallet_id = Some(id);
        self.log_activity(activity).await;

        Ok(wallet)
    }

    /// Soft-delete a wallet; it stops being primary
    #[instrument(skip(self))]
    pub async fn remove_wallet(&self, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
        let wallet = self.get_wallet(user_id, id).await?;
        if !self.db_client.deactivate_wallet(id).await? {
            return Err(AppError::not_found(format!("Wallet {}", id)));
        }

        info!(wallet_id = %id, "Wallet disconnected");
        let mut activity = NewActivity::new(user_id, "wallet_disconnected");
        activity.wallet_id = Some(id);
        activity.metadata = json!({ "publicKey": wallet.public_key });
        self.log_activity(activity).await;
        Ok(())
    }

    /// Make a wallet the user's only primary wallet
    #[instrument(skip(self))]
    pub async fn set_primary(&self, user_id: Uuid, id: Uuid) -> Result<SolanaWallet, AppError> {
        let current = self.get_wallet(user_id, id).await?;
        if current.is_primary {
            return Ok(current);
        }

        let update = WalletUpdate {
            is_primary: Some(true),
            ..Default::default()
        };
        let wallet = self
            .db_client
            .update_wallet(id, &update)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Wallet {}", id)))?;

        let mut activity = NewActivity::new(user_id, "primary_wallet_changed");
        activity.wallet_id = Some(id);
        self.log_activity(activity).await;

        Ok(wallet)
    }

    /// Fetch the on-chain balance and store it on the wallet
    #[instrument(skip(self))]
    pub async fn refresh_balance(&self, user_id: Uuid, id: Uuid) -> Result<Balance, AppError> {
        let wallet = self.get_wallet(user_id, id).await?;
        let lamports = self.blockchain_client.get_balance(&wallet.public_key).await?;
        self.db_client.update_wallet_balance(id, lamports).await?;
        info!(wallet_id = %id, lamports = lamports, "Wallet balance refreshed");
        Ok(Balance::from_lamports(lamports))
    }

    /// Most recent activity entries of the user
    #[instrument(skip(self))]
    pub async fn recent_activity(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<WalletActivity>, AppError> {
        self.db_client
            .list_activities(user_id, limit.clamp(1, 100))
            .await
    }

    async fn log_activity(&self, activity: NewActivity) {
        if let Err(e) = self.db_client.record_activity(&activity).await {
            warn!(error = ?e, activity_type = %activity.activity_type, "Failed to record activity");
        }
    }
}

fn already_connected() -> AppError {
    AppError::Database(DatabaseError::Duplicate(
        "Wallet already connected".to_string(),
    ))
}
