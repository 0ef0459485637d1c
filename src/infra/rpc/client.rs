//! JSON-RPC transport shared by the node and EVM adapters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::domain::{AppError, BlockchainError};

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

/// Username and password for HTTP basic auth.
#[derive(Debug, Clone)]
pub struct RpcCredentials {
    pub user: String,
    pub password: SecretString,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC client.
///
/// An error object in the response becomes `BlockchainError::Rejected`
/// with the node's code and message intact. Transport failures become
/// `Connection`, `Timeout` or `RpcError` and are the only ones retried.
pub struct JsonRpcClient {
    http_client: Client,
    url: String,
    credentials: Option<RpcCredentials>,
    config: RpcClientConfig,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(
        url: &str,
        credentials: Option<RpcCredentials>,
        config: RpcClientConfig,
    ) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Blockchain(BlockchainError::Connection(e.to_string())))?;
        info!(url = %url, "Created JSON-RPC client");
        Ok(Self {
            http_client,
            url: url.to_string(),
            credentials,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_defaults(url: &str) -> Result<Self, AppError> {
        Self::new(url, None, RpcClientConfig::default())
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make an RPC call with retries. Only for calls that are safe to repeat.
    #[instrument(skip(self, params))]
    pub async fn call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, AppError> {
        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self.do_call(method, &params).await {
                Ok(result) => return Ok(result),
                Err(e) if !is_retryable(&e) => return Err(e),
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

    /// Make exactly one RPC attempt.
    #[instrument(skip(self, params))]
    pub async fn call_once<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<R, AppError> {
        self.do_call(method, &params).await
    }

    async fn do_call<R: DeserializeOwned>(&self, method: &str, params: &Value) -> Result<R, AppError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.http_client.post(&self.url).json(&request);
        if let Some(credentials) = &self.credentials {
            builder = builder.basic_auth(
                &credentials.user,
                Some(credentials.password.expose_secret()),
            );
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Blockchain(BlockchainError::Timeout(e.to_string()))
            } else {
                AppError::Blockchain(BlockchainError::Connection(e.to_string()))
            }
        })?;

        // the node answers errors with a JSON body and a non-2xx status
        let status = response.status();
        let rpc_response: JsonRpcResponse = response.json().await.map_err(|e| {
            AppError::Blockchain(BlockchainError::RpcError(format!(
                "HTTP {status}: {e}"
            )))
        })?;

        if let Some(error) = rpc_response.error {
            debug!(code = error.code, message = %error.message, "RPC error response");
            return Err(AppError::Blockchain(BlockchainError::Rejected {
                code: error.code,
                message: error.message,
            }));
        }

        serde_json::from_value(rpc_response.result).map_err(|e| {
            AppError::Blockchain(BlockchainError::RpcError(format!(
                "unexpected {method} result: {e}"
            )))
        })
    }
}

fn is_retryable(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Blockchain(
            BlockchainError::Connection(_) | BlockchainError::Timeout(_) | BlockchainError::RpcError(_)
        )
    )
}
