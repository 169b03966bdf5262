//! Solana JSON-RPC client.
//!
//! Only read methods are used: the service never signs or submits
//! transactions, it verifies transfers that users sent from their own wallets.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domain::types::is_valid_solana_address;
use crate::domain::{
    AppError, BlockchainClient, BlockchainError, ConfirmedTransaction, SignatureState,
    TransferInfo,
};

/// Configuration for the RPC client
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Abstract provider for Solana RPC interactions to enable testing
#[async_trait]
pub trait SolanaRpcProvider: Send + Sync {
    /// Send a JSON-RPC request and return its `result` (`Value::Null` when absent)
    async fn send_request(&self, method: &str, params: Value) -> Result<Value, AppError>;
}

/// HTTP-based Solana RPC provider
pub struct HttpSolanaRpcProvider {
    http_client: Client,
    rpc_url: String,
}

impl HttpSolanaRpcProvider {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Blockchain(BlockchainError::Connection(e.to_string())))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.to_string(),
        })
    }
}

#[async_trait]
impl SolanaRpcProvider for HttpSolanaRpcProvider {
    async fn send_request(&self, method: &str, params: Value) -> Result<Value, AppError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: method.to_string(),
            params,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Blockchain(BlockchainError::Timeout(e.to_string()))
                } else if e.is_connect() {
                    AppError::Blockchain(BlockchainError::Connection(e.to_string()))
                } else {
                    AppError::Blockchain(BlockchainError::RpcError(e.to_string()))
                }
            })?;

        let rpc_response: JsonRpcResponse<Value> = response
            .json()
            .await
            .map_err(|e| AppError::Blockchain(BlockchainError::InvalidResponse(e.to_string())))?;

        if let Some(error) = rpc_response.error {
            return Err(AppError::Blockchain(BlockchainError::RpcError(format!(
                "{}: {}",
                error.code, error.message
            ))));
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    params: T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct SignatureStatus {
    err: Option<Value>,
    #[serde(rename = "confirmationStatus")]
    confirmation_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignatureStatusResult {
    value: Vec<Option<SignatureStatus>>,
}

/// Solana RPC blockchain client
pub struct RpcBlockchainClient {
    provider: Box<dyn SolanaRpcProvider>,
    config: RpcClientConfig,
}

impl RpcBlockchainClient {
    /// Create a new RPC blockchain client with custom configuration
    pub fn new(rpc_url: &str, config: RpcClientConfig) -> Result<Self, AppError> {
        let provider = HttpSolanaRpcProvider::new(rpc_url, config.timeout)?;
        info!(rpc_url = %rpc_url, "Created Solana RPC client");
        Ok(Self {
            provider: Box::new(provider),
            config,
        })
    }

    /// Create a new RPC blockchain client with default configuration
    pub fn with_defaults(rpc_url: &str) -> Result<Self, AppError> {
        Self::new(rpc_url, RpcClientConfig::default())
    }

    /// Create a new client with a specific provider (useful for testing)
    pub fn with_provider(provider: Box<dyn SolanaRpcProvider>, config: RpcClientConfig) -> Self {
        Self { provider, config }
    }

    /// Make an RPC call with retries
    #[instrument(skip(self, params))]
    async fn rpc_call<P: Serialize + Send + Sync, R: DeserializeOwned + Send>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, AppError> {
        let params_value = serde_json::to_value(params).map_err(|e| {
            AppError::Blockchain(BlockchainError::RpcError(format!(
                "Serialization error: {}",
                e
            )))
        })?;

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self
                .provider
                .send_request(method, params_value.clone())
                .await
            {
                Ok(result_value) => {
                    return serde_json::from_value(result_value).map_err(|e| {
                        AppError::Blockchain(BlockchainError::InvalidResponse(format!(
                            "Deserialization error: {}",
                            e
                        )))
                    });
                }
                Err(e) => {
                    warn!(attempt = attempt, error = ?e, method = %method, "RPC call failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| {
            AppError::Blockchain(BlockchainError::RpcError("Unknown error".to_string()))
        }))
    }
}

/// Interpret a `getSignatureStatuses` entry.
fn signature_state(status: Option<SignatureStatus>) -> SignatureState {
    match status {
        None => SignatureState::Unknown,
        Some(SignatureStatus { err: Some(err), .. }) if !err.is_null() => {
            SignatureState::Failed(err.to_string())
        }
        Some(SignatureStatus {
            confirmation_status: Some(level),
            ..
        }) if level == "confirmed" || level == "finalized" => SignatureState::Confirmed,
        Some(_) => SignatureState::Pending,
    }
}

/// Collect System Program transfers from a `jsonParsed` instruction list.
fn collect_transfers(instructions: &[Value], out: &mut Vec<TransferInfo>) {
    for ix in instructions {
        if ix.get("program").and_then(Value::as_str) != Some("system") {
            continue;
        }
        let Some(parsed) = ix.get("parsed") else {
            continue;
        };
        let kind = parsed.get("type").and_then(Value::as_str);
        if !matches!(kind, Some("transfer") | Some("transferWithSeed")) {
            continue;
        }
        let info = &parsed["info"];
        let (Some(source), Some(destination), Some(lamports)) = (
            info.get("source").and_then(Value::as_str),
            info.get("destination").and_then(Value::as_str),
            info.get("lamports").and_then(Value::as_u64),
        ) else {
            continue;
        };
        out.push(TransferInfo {
            source: source.to_string(),
            destination: destination.to_string(),
            lamports: i64::try_from(lamports).unwrap_or(i64::MAX),
        });
    }
}

/// Reduce a `getTransaction` (jsonParsed) result to its error and transfers.
///
/// Inner instructions are included so transfers made through a program CPI
/// count too.
pub fn parse_confirmed_transaction(result: &Value) -> ConfirmedTransaction {
    let meta = &result["meta"];
    let error = match meta.get("err") {
        Some(err) if !err.is_null() => Some(err.to_string()),
        _ => None,
    };

    let mut transfers = Vec::new();
    if let Some(instructions) = result["transaction"]["message"]["instructions"].as_array() {
        collect_transfers(instructions, &mut transfers);
    }
    if let Some(inner) = meta.get("innerInstructions").and_then(Value::as_array) {
        for group in inner {
            if let Some(instructions) = group.get("instructions").and_then(Value::as_array) {
                collect_transfers(instructions, &mut transfers);
            }
        }
    }

    ConfirmedTransaction { error, transfers }
}

#[async_trait]
impl BlockchainClient for RpcBlockchainClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        // Single attempt: a health check should report the current state
        match self.provider.send_request("getHealth", json!([])).await? {
            Value::String(s) if s == "ok" => Ok(()),
            _ => Err(AppError::Blockchain(BlockchainError::RpcError(
                "RPC unhealthy".to_string(),
            ))),
        }
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, address: &str) -> Result<i64, AppError> {
        if !is_valid_solana_address(address) {
            return Err(AppError::Blockchain(BlockchainError::InvalidAddress(
                address.to_string(),
            )));
        }
        let result: BalanceResult = self
            .rpc_call("getBalance", json!([address, {"commitment": "confirmed"}]))
            .await?;
        i64::try_from(result.value).map_err(|_| {
            AppError::Blockchain(BlockchainError::InvalidResponse(format!(
                "Balance out of range: {}",
                result.value
            )))
        })
    }

    #[instrument(skip(self))]
    async fn get_signature_status(&self, signature: &str) -> Result<SignatureState, AppError> {
        let result: SignatureStatusResult = self
            .rpc_call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;

        let state = signature_state(result.value.into_iter().next().flatten());
        debug!(signature = %signature, state = ?state, "Fetched signature status");
        Ok(state)
    }

    #[instrument(skip(self))]
    async fn get_transaction(
        &self,
        signature: &str,
    ) -> Result<Option<ConfirmedTransaction>, AppError> {
        let result: Value = self
            .rpc_call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "jsonParsed",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(parse_confirmed_transaction(&result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const POOL: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
    const PAYER: &str = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

    /// Replays canned results in order and records the methods called
    struct ScriptedProvider {
        responses: Mutex<VecDeque<Result<Value, AppError>>>,
        calls: std::sync::Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<Value, AppError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Default::default(),
            }
        }
    }

    #[async_trait]
    impl SolanaRpcProvider for ScriptedProvider {
        async fn send_request(&self, method: &str, _params: Value) -> Result<Value, AppError> {
            self.calls.lock().unwrap().push(method.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(Value::Null))
        }
    }

    fn fast_config() -> RpcClientConfig {
        RpcClientConfig {
            timeout: Duration::from_secs(1),
            max_retries: 2,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn client(responses: Vec<Result<Value, AppError>>) -> RpcBlockchainClient {
        RpcBlockchainClient::with_provider(Box::new(ScriptedProvider::new(responses)), fast_config())
    }

    fn rpc_error() -> AppError {
        AppError::Blockchain(BlockchainError::RpcError("503: busy".to_string()))
    }

    #[test]
    fn test_client_creation() {
        assert!(RpcBlockchainClient::with_defaults("https://api.devnet.solana.com").is_ok());
    }

    #[test]
    fn test_rpc_client_config_default() {
        let config = RpcClientConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_delay, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_health_check_ok() {
        let client = client(vec![Ok(json!("ok"))]);
        assert!(client.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_unexpected_result() {
        let client = client(vec![Ok(json!("behind"))]);
        let err = client.health_check().await.unwrap_err();
        assert!(err.to_string().contains("RPC unhealthy"));
    }

    #[tokio::test]
    async fn test_health_check_does_not_retry() {
        let provider = ScriptedProvider::new(vec![Err(rpc_error()), Ok(json!("ok"))]);
        let calls = provider.calls.clone();
        let client = RpcBlockchainClient::with_provider(Box::new(provider), fast_config());
        assert!(client.health_check().await.is_err());
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_balance() {
        let client = client(vec![Ok(json!({"context": {"slot": 1}, "value": 2_500_000_000u64}))]);
        assert_eq!(client.get_balance(POOL).await.unwrap(), 2_500_000_000);
    }

    #[tokio::test]
    async fn test_get_balance_rejects_invalid_address() {
        let client = client(vec![]);
        let err = client.get_balance("not-an-address").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Blockchain(BlockchainError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_rpc_call_retries_then_succeeds() {
        let client = client(vec![
            Err(rpc_error()),
            Err(rpc_error()),
            Ok(json!({"value": 42})),
        ]);
        assert_eq!(client.get_balance(POOL).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_rpc_call_gives_up_after_max_retries() {
        let client = client(vec![Err(rpc_error()), Err(rpc_error()), Err(rpc_error())]);
        assert!(client.get_balance(POOL).await.is_err());
    }

    #[tokio::test]
    async fn test_signature_status_states() {
        let cases = vec![
            (json!({"value": [null]}), SignatureState::Unknown),
            (
                json!({"value": [{"err": null, "confirmationStatus": "processed"}]}),
                SignatureState::Pending,
            ),
            (
                json!({"value": [{"err": null, "confirmationStatus": "confirmed"}]}),
                SignatureState::Confirmed,
            ),
            (
                json!({"value": [{"err": null, "confirmationStatus": "finalized"}]}),
                SignatureState::Confirmed,
            ),
        ];
        for (response, expected) in cases {
            let client = client(vec![Ok(response)]);
            assert_eq!(client.get_signature_status("sig").await.unwrap(), expected);
        }

        let client = client(vec![Ok(json!({
            "value": [{"err": {"InstructionError": [0, "Custom"]}, "confirmationStatus": "finalized"}]
        }))]);
        assert!(matches!(
            client.get_signature_status("sig").await.unwrap(),
            SignatureState::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_get_transaction_not_found() {
        let client = client(vec![Ok(Value::Null)]);
        assert_eq!(client.get_transaction("sig").await.unwrap(), None);
    }

    #[test]
    fn test_parse_transaction_collects_outer_and_inner_transfers() {
        let result = json!({
            "meta": {
                "err": null,
                "innerInstructions": [{
                    "index": 1,
                    "instructions": [{
                        "program": "system",
                        "parsed": {
                            "type": "transfer",
                            "info": {"source": PAYER, "destination": POOL, "lamports": 7}
                        }
                    }]
                }]
            },
            "transaction": {
                "message": {
                    "instructions": [
                        {
                            "program": "system",
                            "parsed": {
                                "type": "transfer",
                                "info": {"source": PAYER, "destination": POOL, "lamports": 1_000_000_000u64}
                            }
                        },
                        {
                            "program": "spl-memo",
                            "parsed": "thanks"
                        },
                        {
                            "program": "system",
                            "parsed": {"type": "createAccount", "info": {"source": PAYER}}
                        }
                    ]
                }
            }
        });

        let tx = parse_confirmed_transaction(&result);
        assert!(tx.error.is_none());
        assert_eq!(
            tx.transfers,
            vec![
                TransferInfo {
                    source: PAYER.to_string(),
                    destination: POOL.to_string(),
                    lamports: 1_000_000_000,
                },
                TransferInfo {
                    source: PAYER.to_string(),
                    destination: POOL.to_string(),
                    lamports: 7,
                },
            ]
        );
    }

    #[test]
    fn test_parse_transaction_reports_error() {
        let result = json!({
            "meta": {"err": {"InstructionError": [0, {"Custom": 1}]}},
            "transaction": {"message": {"instructions": []}}
        });
        let tx = parse_confirmed_transaction(&result);
        assert!(tx.error.unwrap().contains("InstructionError"));
        assert!(tx.transfers.is_empty());
    }
}
