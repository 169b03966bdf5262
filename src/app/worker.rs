//! Background worker for payment confirmation and expiry sweeps.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::service::AppService;

/// Background worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Whether the worker runs at all
    pub enabled: bool,
    /// Time between sweeps
    pub poll_interval: Duration,
    /// Pending payments checked per sweep
    pub batch_size: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(30),
            batch_size: 20,
        }
    }
}

/// Periodically confirms pending payments and expires stale state
pub struct ConfirmationWorker {
    service: Arc<AppService>,
    config: WorkerConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConfirmationWorker {
    #[must_use]
    pub fn new(
        service: Arc<AppService>,
        config: WorkerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            service,
            config,
            shutdown_rx,
        }
    }

    /// Run until the shutdown flag flips to `true`
    pub async fn run(mut self) {
        if !self.config.enabled {
            info!("Confirmation worker disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Confirmation worker started"
        );

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Confirmation worker stopped");
    }

    /// One sweep: expiry first so expired payments are not checked on-chain
    pub async fn tick(&self) {
        match self.service.run_maintenance().await {
            Ok(report) if report.is_empty() => {}
            Ok(report) => info!(
                expired_payments = report.expired_payments,
                purged_idempotency_keys = report.purged_idempotency_keys,
                expired_premiums = report.expired_premiums,
                "Maintenance sweep completed"
            ),
            Err(e) => error!(error = ?e, "Maintenance sweep failed"),
        }

        match self
            .service
            .process_pending_confirmations(self.config.batch_size)
            .await
        {
            Ok(0) => {}
            Ok(count) => info!(count = count, "Confirmation sweep completed"),
            Err(e) => warn!(error = ?e, "Confirmation sweep failed"),
        }
    }
}

/// Spawn the worker; send `true` on the returned sender to stop it
pub fn spawn_worker(
    service: Arc<AppService>,
    config: WorkerConfig,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ConfirmationWorker::new(service, config, shutdown_rx);
    let handle = tokio::spawn(worker.run());
    (handle, shutdown_tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    use crate::domain::{
        CreatePaymentRequest, DatabaseClient, PaymentKind, PaymentStatus, PremiumStatus,
        UserProfile,
    };
    use crate::test_utils::{
        TestContext, sample_wallet, test_pools, test_pubkey, test_tx_signature,
    };

    fn worker_for(ctx: &TestContext) -> (ConfirmationWorker, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let worker = ConfirmationWorker::new(
            Arc::clone(&ctx.state.service),
            WorkerConfig::default(),
            rx,
        );
        (worker, tx)
    }

    #[test]
    fn test_worker_config_default() {
        let config = WorkerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.batch_size, 20);
    }

    #[tokio::test]
    async fn test_tick_confirms_and_expires() {
        let ctx = TestContext::new();
        let user_id = Uuid::new_v4();
        let wallet = ctx
            .db
            .create_wallet(&sample_wallet(user_id, &test_pubkey(1)))
            .await
            .unwrap();

        let sig = test_tx_signature(1);
        let mut request = CreatePaymentRequest::new(wallet.id, PaymentKind::Donation, 10_000, "a");
        request.tx_signature = Some(sig.clone());
        let (settled, _) = ctx.state.service.create_payment(user_id, &request).await.unwrap();
        ctx.blockchain.confirm_transfer(
            &sig,
            &wallet.public_key,
            &test_pools().donation_pool,
            10_000,
        );

        let stale_request = CreatePaymentRequest::new(wallet.id, PaymentKind::Donation, 10_000, "b");
        let (stale, _) = ctx
            .state
            .service
            .create_payment(user_id, &stale_request)
            .await
            .unwrap();
        ctx.db.modify_payment(stale.id, |p| {
            p.expires_at = Utc::now() - ChronoDuration::minutes(1)
        });

        let now = Utc::now();
        ctx.db.put_profile(UserProfile {
            id: user_id,
            email: None,
            premium_status: PremiumStatus::Active,
            premium_expires_at: Some(now - ChronoDuration::hours(1)),
            premium_activated_at: Some(now - ChronoDuration::days(31)),
            created_at: now - ChronoDuration::days(31),
            updated_at: now,
        });

        let (worker, _tx) = worker_for(&ctx);
        worker.tick().await;

        let settled = ctx.db.get_payment(settled.id).await.unwrap().unwrap();
        assert_eq!(settled.status, PaymentStatus::Confirmed);
        let stale = ctx.db.get_payment(stale.id).await.unwrap().unwrap();
        assert_eq!(stale.status, PaymentStatus::Failed);
        assert_eq!(stale.error_message.as_deref(), Some("Payment expired"));
        assert_eq!(
            ctx.db.profile(user_id).unwrap().premium_status,
            PremiumStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_tick_survives_rpc_outage() {
        let ctx = TestContext::with_clients(
            Arc::new(crate::test_utils::MockDatabaseClient::new()),
            Arc::new(crate::test_utils::MockBlockchainClient::failing("RPC down")),
            crate::test_utils::test_settings(),
        );
        let user_id = Uuid::new_v4();
        let wallet = ctx
            .db
            .create_wallet(&sample_wallet(user_id, &test_pubkey(2)))
            .await
            .unwrap();
        let mut request = CreatePaymentRequest::new(wallet.id, PaymentKind::Donation, 10_000, "a");
        request.tx_signature = Some(test_tx_signature(2));
        let (payment, _) = ctx.state.service.create_payment(user_id, &request).await.unwrap();

        let (worker, _tx) = worker_for(&ctx);
        worker.tick().await;

        let payment = ctx.db.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        assert_eq!(payment.confirmation_attempts, 1);
    }

    #[tokio::test]
    async fn test_spawned_worker_stops_on_shutdown() {
        let ctx = TestContext::new();
        let config = WorkerConfig {
            poll_interval: Duration::from_millis(10),
            ..WorkerConfig::default()
        };
        let (handle, tx) = spawn_worker(Arc::clone(&ctx.state.service), config);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should stop")
            .unwrap();
    }
}
