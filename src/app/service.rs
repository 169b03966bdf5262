//! Application service: payments, webhooks and health.

use chrono::{Duration as ChronoDuration, Utc};
use secrecy::ExposeSecret;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::signature;
use crate::domain::types::{
    MAX_CONFIRMATION_ATTEMPTS, PAYMENT_TTL_HOURS, is_valid_tx_signature, lamports_to_sol,
    sol_to_lamports,
};
use crate::domain::{
    AppError, AttachSignatureRequest, BlockchainClient, BlockchainError, CacheClient,
    ConfirmationOutcome, ConfirmedTransaction, CreatePaymentRequest, DatabaseClient,
    DatabaseError, DonationTotal, ExternalServiceError, HealthResponse, HealthServices, LamportsToSolResponse,
    NewActivity, NewPayment, PaginatedResponse, PaymentConfirmationResult, PaymentListParams,
    PaymentKind, PaymentStatus, PaymentWebhookEvent, PaymentWebhookStatus, PoolConfig,
    PremiumInfo, ServiceCheck, SignatureState, SolToLamportsResponse, SolanaPayment,
    SolanaWebhookPayload, TransferInfo, UserPaymentStats, ValidationError, WebhookAck,
    WebhookError,
};

use super::replay::ReplayGuard;
use super::state::AppSettings;

pub const REASON_ALREADY_PROCESSED: &str = "Already processed";
pub const REASON_ATTEMPTS_EXHAUSTED: &str = "Confirmation attempts exhausted";
pub const REASON_PAYMENT_EXPIRED: &str = "Payment expired";
pub const REASON_NO_SIGNATURE: &str = "No transaction signature attached";

/// Counts from one maintenance sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_payments: u64,
    pub purged_idempotency_keys: u64,
    pub expired_premiums: u64,
}

impl MaintenanceReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired_payments == 0 && self.purged_idempotency_keys == 0 && self.expired_premiums == 0
    }
}

/// Which webhook endpoint a delivery arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookSource {
    Solana,
    Payment,
}

impl WebhookSource {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Solana => "solana",
            Self::Payment => "payment",
        }
    }
}

/// Check that a confirmed transaction pays exactly what the payment expects,
/// from the wallet the payment was created with.
///
/// Returns the mismatch reason on failure.
pub fn verify_transaction_details(
    payment: &SolanaPayment,
    payer: &str,
    tx: &ConfirmedTransaction,
) -> Result<(), String> {
    if let Some(err) = &tx.error {
        return Err(format!("Transaction failed: {}", err));
    }

    let to_pool: Vec<&TransferInfo> = tx
        .transfers
        .iter()
        .filter(|t| t.destination == payment.destination_address)
        .collect();
    if to_pool.is_empty() {
        return Err(format!(
            "No transfer to destination pool {}",
            payment.destination_address
        ));
    }

    let from_payer: Vec<i64> = to_pool
        .iter()
        .filter(|t| t.source == payer)
        .map(|t| t.lamports)
        .collect();
    if from_payer.is_empty() {
        return Err(format!("No transfer from paying wallet {}", payer));
    }
    if !from_payer.contains(&payment.amount_lamports) {
        return Err(format!(
            "Amount mismatch: expected {} lamports, found {}",
            payment.amount_lamports,
            from_payer
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    Ok(())
}

/// Message shown for a failed dependency check
fn check_failure_message(err: &AppError) -> String {
    match err {
        AppError::Database(DatabaseError::Connection(m) | DatabaseError::Query(m))
        | AppError::Blockchain(
            BlockchainError::RpcError(m)
            | BlockchainError::Connection(m)
            | BlockchainError::Timeout(m)
            | BlockchainError::InvalidResponse(m),
        )
        | AppError::ExternalService(
            ExternalServiceError::Cache(m) | ExternalServiceError::Unavailable(m),
        ) => m.clone(),
        other => other.to_string(),
    }
}

async fn check_dependency<F>(timeout: Duration, check: F) -> ServiceCheck
where
    F: Future<Output = Result<(), AppError>>,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(())) => ServiceCheck::ok(),
        Ok(Err(e)) => ServiceCheck::error(check_failure_message(&e)),
        Err(_) => ServiceCheck::error(format!("Timed out after {}ms", timeout.as_millis())),
    }
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation(ValidationError::Multiple(e.to_string()))
}

/// Application service containing business logic
pub struct AppService {
    db_client: Arc<dyn DatabaseClient>,
    blockchain_client: Arc<dyn BlockchainClient>,
    cache_client: Arc<dyn CacheClient>,
    settings: AppSettings,
    replay_guard: ReplayGuard,
}

impl AppService {
    #[must_use]
    pub fn new(
        db_client: Arc<dyn DatabaseClient>,
        blockchain_client: Arc<dyn BlockchainClient>,
        cache_client: Arc<dyn CacheClient>,
        settings: AppSettings,
    ) -> Self {
        let replay_guard = ReplayGuard::new(settings.replay_window);
        Self {
            db_client,
            blockchain_client,
            cache_client,
            settings,
            replay_guard,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    /// Pool addresses and premium pricing
    #[must_use]
    pub fn pool_config(&self) -> PoolConfig {
        self.settings.pools.clone()
    }

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    /// Create a pending payment. Returns the payment and whether it is new;
    /// a repeated idempotency key yields the original payment unchanged.
    #[instrument(skip(self, request), fields(user_id = %user_id, kind = %request.kind, amount = request.amount_lamports))]
    pub async fn create_payment(
        &self,
        user_id: Uuid,
        request: &CreatePaymentRequest,
    ) -> Result<(SolanaPayment, bool), AppError> {
        request.validate().map_err(|e| {
            warn!(error = %e, "Validation failed");
            validation_error(e)
        })?;

        if let Some(existing) = self
            .db_client
            .get_payment_by_idempotency_key(user_id, &request.idempotency_key)
            .await?
        {
            info!(payment_id = %existing.id, "Idempotent replay, returning existing payment");
            return Ok((existing, false));
        }

        let wallet = self
            .db_client
            .get_wallet(request.wallet_id)
            .await?
            .filter(|w| w.user_id == user_id && w.is_active)
            .ok_or_else(|| AppError::invalid_field("walletId", "Wallet not found or inactive"))?;

        if request.kind == PaymentKind::Premium {
            let price = self.settings.pools.premium_price_lamports();
            if request.amount_lamports < price {
                return Err(AppError::invalid_field(
                    "amountLamports",
                    format!(
                        "Premium requires at least {} SOL ({} lamports)",
                        self.settings.pools.premium_price_sol, price
                    ),
                ));
            }
        }

        let new_payment = NewPayment {
            user_id,
            wallet_id: wallet.id,
            kind: request.kind,
            amount_lamports: request.amount_lamports,
            destination_address: self
                .settings
                .pools
                .destination_for(request.kind)
                .to_string(),
            tx_signature: request.tx_signature.clone(),
            idempotency_key: request.idempotency_key.clone(),
            metadata: request.metadata.clone().unwrap_or_else(|| json!({})),
            expires_at: Utc::now() + ChronoDuration::hours(PAYMENT_TTL_HOURS),
        };

        let payment = match self.db_client.create_payment(&new_payment).await {
            Ok(payment) => payment,
            Err(AppError::Database(DatabaseError::Duplicate(detail))) => {
                // A concurrent request with the same key may have won the insert
                if let Some(existing) = self
                    .db_client
                    .get_payment_by_idempotency_key(user_id, &request.idempotency_key)
                    .await?
                {
                    return Ok((existing, false));
                }
                warn!(detail = %detail, "Payment conflicts with an existing payment");
                return Err(AppError::Database(DatabaseError::Duplicate(
                    "Transaction signature already used by another payment".to_string(),
                )));
            }
            Err(e) => return Err(e),
        };

        info!(payment_id = %payment.id, "Payment created");

        let mut activity = NewActivity::new(user_id, "payment_created");
        activity.wallet_id = Some(wallet.id);
        activity.description = Some(format!("{} payment created", payment.kind));
        activity.amount_lamports = Some(payment.amount_lamports);
        activity.tx_signature = payment.tx_signature.clone();
        activity.metadata = json!({ "paymentId": payment.id });
        self.log_activity(activity).await;

        Ok((payment, true))
    }

    /// Get a payment owned by the user
    #[instrument(skip(self))]
    pub async fn get_payment(&self, user_id: Uuid, id: Uuid) -> Result<SolanaPayment, AppError> {
        self.db_client
            .get_payment(id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::not_found(format!("Payment {}", id)))
    }

    /// List the user's payments, newest first
    #[instrument(skip(self))]
    pub async fn list_payments(
        &self,
        user_id: Uuid,
        params: &PaymentListParams,
    ) -> Result<PaginatedResponse<SolanaPayment>, AppError> {
        params.validate().map_err(validation_error)?;
        self.db_client
            .list_payments(user_id, params.kind, params.limit, params.cursor)
            .await
    }

    /// Attach the paying transaction to a pending payment
    #[instrument(skip(self, request), fields(user_id = %user_id, payment_id = %id))]
    pub async fn attach_signature(
        &self,
        user_id: Uuid,
        id: Uuid,
        request: &AttachSignatureRequest,
    ) -> Result<SolanaPayment, AppError> {
        request.validate().map_err(validation_error)?;
        let payment = self.get_payment(user_id, id).await?;

        if payment.status != PaymentStatus::Pending {
            return Err(AppError::invalid_field("status", "Payment is not pending"));
        }
        match payment.tx_signature.as_deref() {
            Some(existing) if existing == request.tx_signature => return Ok(payment),
            Some(_) => {
                return Err(AppError::invalid_field(
                    "txSignature",
                    "A different transaction is already attached",
                ));
            }
            None => {}
        }

        let updated = self
            .db_client
            .attach_payment_signature(id, &request.tx_signature)
            .await?
            .ok_or_else(|| AppError::invalid_field("status", "Payment is not pending"))?;

        info!(signature = %request.tx_signature, "Transaction signature attached");
        Ok(updated)
    }

    /// Confirm a payment on behalf of its owner
    #[instrument(skip(self))]
    pub async fn confirm_payment_for_user(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<PaymentConfirmationResult, AppError> {
        self.get_payment(user_id, id).await?;
        self.confirm_payment(id).await
    }

    /// Run one confirmation check of a payment against the chain.
    ///
    /// Only a `pending` payment changes state. Each on-chain check counts as
    /// an attempt; the payment fails once attempts run out while the
    /// transaction is still unsettled.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, id: Uuid) -> Result<PaymentConfirmationResult, AppError> {
        let payment = self
            .db_client
            .get_payment(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Payment {}", id)))?;

        if payment.status != PaymentStatus::Pending {
            return Ok(already_processed(&payment));
        }

        if payment.is_expired(Utc::now()) {
            return self.fail(&payment, REASON_PAYMENT_EXPIRED, ConfirmationOutcome::Failed).await;
        }

        let Some(signature) = payment.tx_signature.clone() else {
            return Ok(PaymentConfirmationResult::with_reason(
                id,
                ConfirmationOutcome::Pending,
                REASON_NO_SIGNATURE,
            ));
        };

        let attempts = self.db_client.record_confirmation_attempt(id).await?;
        let exhausted = attempts >= MAX_CONFIRMATION_ATTEMPTS;

        let state = match self.blockchain_client.get_signature_status(&signature).await {
            Ok(state) => state,
            Err(e) if exhausted => {
                warn!(error = ?e, attempts = attempts, "RPC failed on final confirmation attempt");
                return self
                    .fail(&payment, REASON_ATTEMPTS_EXHAUSTED, ConfirmationOutcome::Failed)
                    .await;
            }
            Err(e) => return Err(e),
        };

        let tx = match state {
            SignatureState::Failed(err) => {
                let reason = format!("Transaction failed: {}", err);
                return self.fail(&payment, &reason, ConfirmationOutcome::Failed).await;
            }
            SignatureState::Unknown | SignatureState::Pending => None,
            SignatureState::Confirmed => {
                match self.blockchain_client.get_transaction(&signature).await {
                    Ok(tx) => tx,
                    Err(e) if exhausted => {
                        warn!(error = ?e, attempts = attempts, "RPC failed on final confirmation attempt");
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        let Some(tx) = tx else {
            if exhausted {
                return self
                    .fail(&payment, REASON_ATTEMPTS_EXHAUSTED, ConfirmationOutcome::Failed)
                    .await;
            }
            debug!(attempts = attempts, "Transaction not yet confirmed");
            return Ok(PaymentConfirmationResult::with_reason(
                id,
                ConfirmationOutcome::Pending,
                format!(
                    "Transaction not yet confirmed (attempt {} of {})",
                    attempts, MAX_CONFIRMATION_ATTEMPTS
                ),
            ));
        };

        let payer = self
            .db_client
            .get_wallet(payment.wallet_id)
            .await?
            .map(|w| w.public_key)
            .unwrap_or_default();
        if let Err(reason) = verify_transaction_details(&payment, &payer, &tx) {
            warn!(payment_id = %id, reason = %reason, "On-chain transfer does not match payment");
            return self.fail(&payment, &reason, ConfirmationOutcome::Mismatch).await;
        }

        let Some(record) = self
            .db_client
            .confirm_payment(&payment, self.settings.pools.premium_duration_days)
            .await?
        else {
            // Lost the race against another confirmer
            let current = self.db_client.get_payment(id).await?.unwrap_or(payment);
            return Ok(already_processed(&current));
        };

        info!(
            payment_id = %id,
            ledger_entry_id = %record.ledger_entry_id,
            premium_expires_at = ?record.premium_expires_at,
            "Payment confirmed"
        );

        let mut activity = NewActivity::new(payment.user_id, "payment_confirmed");
        activity.wallet_id = Some(payment.wallet_id);
        activity.description = Some(format!("{} payment confirmed", payment.kind));
        activity.tx_signature = Some(signature);
        activity.amount_lamports = Some(payment.amount_lamports);
        activity.metadata = json!({ "paymentId": id, "ledgerEntryId": record.ledger_entry_id });
        self.log_activity(activity).await;

        let is_premium = payment.kind == PaymentKind::Premium;
        Ok(PaymentConfirmationResult {
            payment_id: id,
            status: ConfirmationOutcome::Confirmed,
            reason: None,
            ledger_entry_id: Some(record.ledger_entry_id),
            premium_activated: is_premium.then_some(true),
            premium_expires_at: record.premium_expires_at,
        })
    }

    async fn fail(
        &self,
        payment: &SolanaPayment,
        reason: &str,
        outcome: ConfirmationOutcome,
    ) -> Result<PaymentConfirmationResult, AppError> {
        if !self.db_client.fail_payment(payment.id, reason).await? {
            let current = self
                .db_client
                .get_payment(payment.id)
                .await?
                .unwrap_or_else(|| payment.clone());
            return Ok(already_processed(&current));
        }
        info!(payment_id = %payment.id, reason = %reason, "Payment failed");
        Ok(PaymentConfirmationResult::with_reason(
            payment.id, outcome, reason,
        ))
    }

    async fn log_activity(&self, activity: NewActivity) {
        if let Err(e) = self.db_client.record_activity(&activity).await {
            warn!(error = ?e, activity_type = %activity.activity_type, "Failed to record activity");
        }
    }

    /// Confirm a batch of pending payments (called by background worker)
    #[instrument(skip(self))]
    pub async fn process_pending_confirmations(&self, batch_size: i64) -> Result<usize, AppError> {
        let payments = self.db_client.get_confirmable_payments(batch_size).await?;
        let count = payments.len();
        if count == 0 {
            return Ok(0);
        }

        debug!(count = count, "Checking pending payments");
        for payment in payments {
            match self.confirm_payment(payment.id).await {
                Ok(result) if result.status != ConfirmationOutcome::Pending => {
                    info!(payment_id = %payment.id, status = ?result.status, "Payment settled by worker");
                }
                Ok(_) => {}
                Err(e) => {
                    error!(payment_id = %payment.id, error = ?e, "Failed to check pending payment")
                }
            }
        }
        Ok(count)
    }

    /// Expire stale payments, idempotency records and premium subscriptions
    #[instrument(skip(self))]
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, AppError> {
        let now = Utc::now();
        Ok(MaintenanceReport {
            expired_payments: self.db_client.expire_stale_payments(now).await?,
            purged_idempotency_keys: self.db_client.purge_expired_idempotency_keys(now).await?,
            expired_premiums: self.db_client.expire_premium_profiles(now).await?,
        })
    }

    // ------------------------------------------------------------------
    // Premium and statistics
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn premium_status(&self, user_id: Uuid) -> Result<PremiumInfo, AppError> {
        let profile = self.db_client.get_user_profile(user_id).await?;
        Ok(PremiumInfo::from_profile(profile.as_ref(), Utc::now()))
    }

    /// End the caller's running premium subscription
    #[instrument(skip(self))]
    pub async fn cancel_premium(&self, user_id: Uuid) -> Result<PremiumInfo, AppError> {
        let now = Utc::now();
        let profile = self
            .db_client
            .cancel_premium(user_id, now)
            .await?
            .ok_or_else(|| AppError::not_found("Active premium subscription"))?;

        info!(user_id = %user_id, "Premium subscription cancelled");
        let mut activity = NewActivity::new(user_id, "premium_cancelled");
        activity.description = Some("Premium subscription cancelled".to_string());
        self.log_activity(activity).await;

        Ok(PremiumInfo::from_profile(Some(&profile), now))
    }

    /// All-time confirmed donations of the user
    #[instrument(skip(self))]
    pub async fn donation_total(&self, user_id: Uuid) -> Result<DonationTotal, AppError> {
        self.db_client.donation_total(user_id).await
    }

    #[instrument(skip(self))]
    pub async fn payment_stats(
        &self,
        user_id: Uuid,
        days: i64,
    ) -> Result<UserPaymentStats, AppError> {
        if !(1..=365).contains(&days) {
            return Err(AppError::invalid_field(
                "days",
                "Days must be between 1 and 365",
            ));
        }
        let now = Utc::now();
        let since = now - ChronoDuration::days(days);
        let (stats, profile) = tokio::try_join!(
            self.db_client.payment_stats(user_id, since),
            self.db_client.get_user_profile(user_id),
        )?;

        Ok(UserPaymentStats {
            user_id,
            period_days: days,
            period_start: since,
            total_amount_sol: lamports_to_sol(stats.total_amount_lamports),
            donation_amount_sol: lamports_to_sol(stats.donation_amount_lamports),
            premium_amount_sol: lamports_to_sol(stats.premium_amount_lamports),
            payment_stats: stats,
            premium_info: PremiumInfo::from_profile(profile.as_ref(), now),
        })
    }

    /// Convert a positive SOL amount to lamports
    pub fn sol_to_lamports(&self, sol: f64) -> Result<SolToLamportsResponse, AppError> {
        let lamports = sol_to_lamports(sol);
        if !sol.is_finite() || sol <= 0.0 || lamports <= 0 || lamports == i64::MAX {
            return Err(AppError::invalid_field(
                "sol",
                "Amount must be a positive number",
            ));
        }
        Ok(SolToLamportsResponse { sol, lamports })
    }

    /// Convert a positive lamport amount to SOL
    pub fn lamports_to_sol(&self, lamports: i64) -> Result<LamportsToSolResponse, AppError> {
        if lamports <= 0 {
            return Err(AppError::invalid_field(
                "lamports",
                "Amount must be a positive integer",
            ));
        }
        Ok(LamportsToSolResponse {
            lamports,
            sol: lamports_to_sol(lamports),
        })
    }

    // ------------------------------------------------------------------
    // Webhooks
    // ------------------------------------------------------------------

    /// Verify a delivery and claim it against replays.
    ///
    /// Returns the claim key, or `None` when the delivery was already accepted.
    fn authenticate_webhook(
        &self,
        source: WebhookSource,
        payload: &Value,
        signature: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingSignature)?;

        if !signature::verify(
            payload,
            signature,
            self.settings.webhook_secret.expose_secret().as_bytes(),
        ) {
            warn!(source = source.as_str(), "Rejected webhook with invalid signature");
            return Err(WebhookError::InvalidSignature.into());
        }

        let claim = format!("{}:{}", source.as_str(), signature.to_ascii_lowercase());
        if !self.replay_guard.try_claim(&claim) {
            info!(source = source.as_str(), "Duplicate webhook delivery acknowledged");
            return Ok(None);
        }
        Ok(Some(claim))
    }

    /// Verify and process a chain indexer notification
    #[instrument(skip(self, payload, signature))]
    pub async fn handle_solana_webhook(
        &self,
        payload: &Value,
        signature: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        let Some(claim) = self.authenticate_webhook(WebhookSource::Solana, payload, signature)?
        else {
            return Ok(WebhookAck { success: true });
        };

        match self.process_solana_events(payload).await {
            Ok(processed) => {
                info!(processed = processed, "Solana webhook processed");
                Ok(WebhookAck { success: true })
            }
            Err(e) => {
                self.replay_guard.release(&claim);
                Err(e)
            }
        }
    }

    async fn process_solana_events(&self, payload: &Value) -> Result<usize, AppError> {
        let parsed = SolanaWebhookPayload::parse(payload);
        for (index, error) in &parsed.rejected {
            warn!(index = index, error = %error, "Skipping webhook element that is not a transaction event");
        }

        let mut processed = 0;
        for event in parsed.events {
            let Some(payment) = self.db_client.get_payment_by_signature(&event.signature).await?
            else {
                continue;
            };
            if payment.status != PaymentStatus::Pending {
                continue;
            }

            match event.transaction_error.filter(|e| !e.is_null()) {
                Some(err) => {
                    let reason = format!("Transaction failed: {}", err);
                    if self.db_client.fail_payment(payment.id, &reason).await? {
                        warn!(payment_id = %payment.id, signature = %event.signature, "Payment failed via webhook");
                        processed += 1;
                    }
                }
                None => match self.confirm_payment(payment.id).await {
                    Ok(result) => {
                        info!(payment_id = %payment.id, status = ?result.status, "Payment checked via webhook");
                        processed += 1;
                    }
                    // The worker retries on its next sweep
                    Err(e) => warn!(payment_id = %payment.id, error = ?e, "Webhook confirmation failed"),
                },
            }
        }
        Ok(processed)
    }

    /// Verify and process a payment processor notification
    #[instrument(skip(self, payload, signature))]
    pub async fn handle_payment_webhook(
        &self,
        payload: &Value,
        signature: Option<&str>,
    ) -> Result<WebhookAck, AppError> {
        let Some(claim) = self.authenticate_webhook(WebhookSource::Payment, payload, signature)?
        else {
            return Ok(WebhookAck { success: true });
        };

        match self.process_payment_event(payload).await {
            Ok(()) => Ok(WebhookAck { success: true }),
            Err(e) => {
                self.replay_guard.release(&claim);
                Err(e)
            }
        }
    }

    async fn process_payment_event(&self, payload: &Value) -> Result<(), AppError> {
        let event: PaymentWebhookEvent = match serde_json::from_value(payload.clone()) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Webhook carries no payment event");
                return Ok(());
            }
        };

        let Some(payment) = self.db_client.get_payment(event.payment_id).await? else {
            warn!(payment_id = %event.payment_id, "Webhook for unknown payment ignored");
            return Ok(());
        };

        match event.status {
            PaymentWebhookStatus::Confirmed => {
                if payment.tx_signature.is_none() {
                    match event.tx_signature.as_deref() {
                        Some(sig) if is_valid_tx_signature(sig) => {
                            self.db_client.attach_payment_signature(payment.id, sig).await?;
                        }
                        Some(sig) => {
                            warn!(payment_id = %payment.id, signature = %sig, "Ignoring malformed transaction signature")
                        }
                        None => {}
                    }
                }
                let result = self.confirm_payment(payment.id).await?;
                info!(payment_id = %payment.id, status = ?result.status, "Payment webhook processed");
            }
            PaymentWebhookStatus::Failed => {
                let reason = event.reason.as_deref().unwrap_or("Payment failed");
                if self.db_client.fail_payment(payment.id, reason).await? {
                    info!(payment_id = %payment.id, reason = %reason, "Payment failed via webhook");
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Check database, Redis and RPC concurrently
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let timeout = self.settings.health_check_timeout;
        let (database, redis, solana_rpc) = tokio::join!(
            check_dependency(timeout, self.db_client.health_check()),
            check_dependency(timeout, self.cache_client.ping()),
            check_dependency(timeout, self.blockchain_client.health_check()),
        );

        for (name, check) in [("database", &database), ("redis", &redis), ("solana_rpc", &solana_rpc)] {
            if let Some(message) = &check.message {
                warn!(service = name, message = %message, "Health check failed");
            }
        }

        HealthResponse::new(
            self.settings.environment.clone(),
            self.settings.solana_network.to_string(),
            HealthServices {
                database,
                redis,
                solana_rpc,
            },
        )
    }
}

fn already_processed(payment: &SolanaPayment) -> PaymentConfirmationResult {
    let status = match payment.status {
        PaymentStatus::Confirmed => ConfirmationOutcome::Confirmed,
        PaymentStatus::Pending => ConfirmationOutcome::Pending,
        PaymentStatus::Failed | PaymentStatus::Refunded => ConfirmationOutcome::Failed,
    };
    PaymentConfirmationResult::with_reason(payment.id, status, REASON_ALREADY_PROCESSED)
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOL: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const PAYER: &str = "7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV";

    fn payment(amount: i64) -> SolanaPayment {
        let now = Utc::now();
        SolanaPayment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            wallet_id: Uuid::new_v4(),
            kind: PaymentKind::Donation,
            amount_lamports: amount,
            amount_sol: lamports_to_sol(amount),
            tx_signature: Some("sig".to_string()),
            status: PaymentStatus::Pending,
            destination_address: POOL.to_string(),
            idempotency_key: "k".to_string(),
            confirmation_attempts: 0,
            last_confirmation_check: None,
            error_message: None,
            metadata: json!({}),
            created_at: now,
            updated_at: now,
            expires_at: now + ChronoDuration::hours(PAYMENT_TTL_HOURS),
            confirmed_at: None,
            failed_at: None,
        }
    }

    fn transfer(destination: &str, lamports: i64) -> TransferInfo {
        transfer_from(PAYER, destination, lamports)
    }

    fn transfer_from(source: &str, destination: &str, lamports: i64) -> TransferInfo {
        TransferInfo {
            source: source.to_string(),
            destination: destination.to_string(),
            lamports,
        }
    }

    #[test]
    fn test_verify_transaction_details_exact_match() {
        let tx = ConfirmedTransaction {
            error: None,
            transfers: vec![transfer("elsewhere", 5), transfer(POOL, 1_000_000)],
        };
        assert!(verify_transaction_details(&payment(1_000_000), PAYER, &tx).is_ok());
    }

    #[test]
    fn test_verify_transaction_details_amount_mismatch() {
        let tx = ConfirmedTransaction {
            error: None,
            transfers: vec![transfer(POOL, 999_999)],
        };
        let reason = verify_transaction_details(&payment(1_000_000), PAYER, &tx).unwrap_err();
        assert_eq!(
            reason,
            "Amount mismatch: expected 1000000 lamports, found 999999"
        );
    }

    #[test]
    fn test_verify_transaction_details_wrong_destination() {
        let tx = ConfirmedTransaction {
            error: None,
            transfers: vec![transfer("attacker", 1_000_000)],
        };
        let reason = verify_transaction_details(&payment(1_000_000), PAYER, &tx).unwrap_err();
        assert!(reason.starts_with("No transfer to destination pool"));
    }

    #[test]
    fn test_verify_transaction_details_other_payer() {
        let tx = ConfirmedTransaction {
            error: None,
            transfers: vec![transfer_from("someone-else", POOL, 1_000_000)],
        };
        let reason = verify_transaction_details(&payment(1_000_000), PAYER, &tx).unwrap_err();
        assert_eq!(reason, format!("No transfer from paying wallet {}", PAYER));
    }

    #[test]
    fn test_verify_transaction_details_ignores_other_payers_amounts() {
        let tx = ConfirmedTransaction {
            error: None,
            transfers: vec![
                transfer_from("someone-else", POOL, 1_000_000),
                transfer(POOL, 500_000),
            ],
        };
        let reason = verify_transaction_details(&payment(1_000_000), PAYER, &tx).unwrap_err();
        assert_eq!(
            reason,
            "Amount mismatch: expected 1000000 lamports, found 500000"
        );
    }

    #[test]
    fn test_verify_transaction_details_failed_transaction() {
        let tx = ConfirmedTransaction {
            error: Some("{\"InstructionError\":[0,\"Custom\"]}".to_string()),
            transfers: vec![transfer(POOL, 1_000_000)],
        };
        let reason = verify_transaction_details(&payment(1_000_000), PAYER, &tx).unwrap_err();
        assert!(reason.starts_with("Transaction failed"));
    }

    #[test]
    fn test_already_processed_maps_terminal_states() {
        let mut p = payment(1_000);
        p.status = PaymentStatus::Confirmed;
        assert_eq!(already_processed(&p).status, ConfirmationOutcome::Confirmed);
        p.status = PaymentStatus::Refunded;
        let result = already_processed(&p);
        assert_eq!(result.status, ConfirmationOutcome::Failed);
        assert_eq!(result.reason.as_deref(), Some(REASON_ALREADY_PROCESSED));
    }

    #[test]
    fn test_check_failure_message_unwraps_inner_message() {
        let err = AppError::Blockchain(BlockchainError::RpcError("RPC unhealthy".to_string()));
        assert_eq!(check_failure_message(&err), "RPC unhealthy");
        let err = AppError::ExternalService(ExternalServiceError::Cache(
            "Connection refused".to_string(),
        ));
        assert_eq!(check_failure_message(&err), "Connection refused");
    }

    #[tokio::test]
    async fn test_dependency_check_times_out() {
        let check = check_dependency(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(!check.is_ok());
        assert!(check.message.unwrap().starts_with("Timed out"));
    }
}
