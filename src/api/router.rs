//! Router construction and HTTP middleware.

use std::env;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
};
use governor::{
    DefaultDirectRateLimiter, Quota, RateLimiter,
    clock::{Clock, DefaultClock},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    ApiDoc, cancel_premium_handler, health_check_handler, liveness_handler,
    payment_webhook_handler, premium_status_handler, readiness_handler, solana_webhook_handler,
};
use super::{payments, wallets};
use crate::app::AppState;
use crate::domain::{ErrorDetail, RateLimitResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Global request rate limit
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Requests allowed in a burst above the sustained rate
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    /// Read `RATE_LIMIT_RPS` and `RATE_LIMIT_BURST`, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            requests_per_second: env::var("RATE_LIMIT_RPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.requests_per_second),
            burst_size: env::var("RATE_LIMIT_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.burst_size),
        }
    }

    fn limiter(&self) -> DefaultDirectRateLimiter {
        let rps = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(rps);
        RateLimiter::direct(Quota::per_second(rps).allow_burst(burst))
    }
}

async fn rate_limit_middleware(
    State(limiter): State<Arc<DefaultDirectRateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(request).await,
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);
            warn!(path = %request.uri().path(), retry_after = retry_after, "Rate limit exceeded");

            let body = Json(RateLimitResponse {
                error: ErrorDetail {
                    r#type: "rate_limited".to_string(),
                    message: "Rate limit exceeded".to_string(),
                },
                retry_after,
            });
            let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

/// Routes subject to rate limiting
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhooks/solana", post(solana_webhook_handler))
        .route("/webhooks/payment", post(payment_webhook_handler))
        .route(
            "/payments",
            post(payments::create_payment_handler).get(payments::list_payments_handler),
        )
        .route("/payments/stats", get(payments::payment_stats_handler))
        .route("/payments/config", get(payments::payment_config_handler))
        .route(
            "/payments/donations/total",
            get(payments::donation_total_handler),
        )
        .route(
            "/payments/convert/sol-to-lamports/{sol}",
            get(payments::sol_to_lamports_handler),
        )
        .route(
            "/payments/convert/lamports-to-sol/{lamports}",
            get(payments::lamports_to_sol_handler),
        )
        .route("/payments/{id}", get(payments::get_payment_handler))
        .route(
            "/payments/{id}/confirm",
            post(payments::confirm_payment_handler),
        )
        .route(
            "/payments/{id}/signature",
            patch(payments::attach_signature_handler),
        )
        .route("/wallets", get(wallets::list_wallets_handler))
        .route("/wallets/connect", post(wallets::connect_wallet_handler))
        .route("/wallets/me", get(wallets::wallet_summary_handler))
        .route("/wallets/activity", get(wallets::wallet_activity_handler))
        .route(
            "/wallets/{id}",
            get(wallets::get_wallet_handler)
                .patch(wallets::update_wallet_handler)
                .delete(wallets::remove_wallet_handler),
        )
        .route(
            "/wallets/{id}/primary",
            post(wallets::set_primary_wallet_handler),
        )
        .route(
            "/wallets/{id}/refresh-balance",
            post(wallets::refresh_balance_handler),
        )
        .route("/premium/status", get(premium_status_handler))
        .route("/premium/cancel", delete(cancel_premium_handler))
}

fn build_router(app_state: Arc<AppState>, rate_limit: Option<RateLimitConfig>) -> Router {
    let mut api = api_routes();
    if let Some(config) = rate_limit {
        let limiter = Arc::new(config.limiter());
        api = api.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
    }

    let health = Router::new()
        .route("/health", get(health_check_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler));

    let cors = cors_layer(&app_state.service.settings().cors_origins);

    Router::new()
        .merge(api)
        .merge(health)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(timeout_layer(REQUEST_TIMEOUT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Requests running longer than `timeout` are answered with 408
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Build the router without rate limiting
pub fn create_router(app_state: Arc<AppState>) -> Router {
    build_router(app_state, None)
}

/// Build the router with a global rate limit on every non-health route
pub fn create_router_with_rate_limit(
    app_state: Arc<AppState>,
    config: RateLimitConfig,
) -> Router {
    build_router(app_state, Some(config))
}
