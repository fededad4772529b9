//! JSON-RPC HTTP client backing blockhash, fee, account, status, and submit calls.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use thiserror::Error;

use crate::{
    confirm::{ConfirmationStatus, SignatureStatus, SignatureStatusSource},
    fees::PriorityFeeSource,
    providers::{AccountLookup, BlockhashSource, RecencyToken},
    submit::{RpcSubmitConfig, RpcSubmitTransport, SubmitTransportError},
};

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Account whose write-lock contention is used as the fee-estimate reference.
pub const PRIORITY_FEE_REFERENCE_ACCOUNT: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

/// JSON-RPC envelope.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    /// Result value for successful calls.
    result: Option<T>,
    /// Error payload for failed calls.
    error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    /// JSON-RPC error code.
    code: i64,
    /// Human-readable message.
    message: String,
}

/// `{ context, value }` wrapper used by most Solana RPC methods.
#[derive(Debug, Deserialize)]
struct RpcContextual<T> {
    /// Method payload.
    value: T,
}

/// `getLatestBlockhash` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhash {
    /// Base58 blockhash.
    blockhash: String,
    /// Last valid block height.
    last_valid_block_height: u64,
}

/// One `getSignatureStatuses` entry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSignatureStatus {
    /// Commitment reached so far.
    confirmation_status: Option<String>,
    /// Execution error, when the transaction failed.
    err: Option<serde_json::Value>,
}

/// JSON-RPC transport failures.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP client could not be built.
    #[error("failed to build rpc http client: {source}")]
    BuildClient {
        /// Builder error.
        source: reqwest::Error,
    },
    /// Authorization header value is not valid header text.
    #[error("invalid rpc authorization header: {source}")]
    InvalidAuthorization {
        /// Header error.
        source: reqwest::header::InvalidHeaderValue,
    },
    /// Request could not be sent or timed out.
    #[error("rpc request failed for method `{method}`: {source}")]
    Request {
        /// JSON-RPC method.
        method: &'static str,
        /// Transport error.
        source: reqwest::Error,
    },
    /// Endpoint answered with a non-success HTTP status.
    #[error("rpc method `{method}` failed with status {status}: {source}")]
    HttpStatus {
        /// JSON-RPC method.
        method: &'static str,
        /// HTTP status.
        status: reqwest::StatusCode,
        /// Status error.
        source: reqwest::Error,
    },
    /// Body was not valid JSON for the expected shape.
    #[error("rpc method `{method}` returned invalid json: {source}")]
    InvalidJson {
        /// JSON-RPC method.
        method: &'static str,
        /// Decode error.
        source: reqwest::Error,
    },
    /// Endpoint returned a JSON-RPC error object.
    #[error("rpc method `{method}` error {code}: {message}")]
    RpcMethod {
        /// JSON-RPC method.
        method: &'static str,
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
    /// Envelope carried neither `result` nor `error`.
    #[error("rpc method `{method}` returned neither result nor error")]
    MissingResultOrError {
        /// JSON-RPC method.
        method: &'static str,
    },
    /// Result was well-formed JSON with unusable content.
    #[error("rpc method `{method}` returned an invalid response: {message}")]
    InvalidResponse {
        /// JSON-RPC method.
        method: &'static str,
        /// Description of the problem.
        message: String,
    },
}

/// Builds the shared HTTP client with an optional `Authorization` header.
pub(crate) fn build_http_client(
    timeout: Duration,
    authorization: Option<&str>,
) -> Result<reqwest::Client, RpcError> {
    let mut headers = HeaderMap::new();
    if let Some(token) = authorization {
        let value = HeaderValue::from_str(token)
            .map_err(|source| RpcError::InvalidAuthorization { source })?;
        let _ = headers.insert(AUTHORIZATION, value);
    }
    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|source| RpcError::BuildClient { source })
}

/// Issues one JSON-RPC call and decodes its `result`.
pub(crate) async fn rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    rpc_url: &str,
    method: &'static str,
    params: serde_json::Value,
) -> Result<T, RpcError> {
    let payload = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": method,
        "params": params,
    });
    let response = client
        .post(rpc_url)
        .json(&payload)
        .send()
        .await
        .map_err(|source| RpcError::Request { method, source })?;
    let status = response.status();
    let response = response
        .error_for_status()
        .map_err(|source| RpcError::HttpStatus {
            method,
            status,
            source,
        })?;
    let parsed: JsonRpcResponse<T> = response
        .json()
        .await
        .map_err(|source| RpcError::InvalidJson { method, source })?;
    if let Some(result) = parsed.result {
        return Ok(result);
    }
    if let Some(error) = parsed.error {
        return Err(RpcError::RpcMethod {
            method,
            code: error.code,
            message: error.message,
        });
    }
    Err(RpcError::MissingResultOrError { method })
}

/// Extracts the rounded-up `high` level from a `getPriorityFeeEstimate` result.
pub(crate) fn parse_priority_fee_levels(result: &serde_json::Value) -> Result<u64, RpcError> {
    let high = result
        .get("priorityFeeLevels")
        .and_then(|levels| levels.get("high"))
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| RpcError::InvalidResponse {
            method: "getPriorityFeeEstimate",
            message: "missing priorityFeeLevels.high".to_owned(),
        })?;
    if !high.is_finite() || high < 0.0 {
        return Err(RpcError::InvalidResponse {
            method: "getPriorityFeeEstimate",
            message: format!("invalid high fee level {high}"),
        });
    }
    let rounded = high.ceil();
    if rounded >= u64::MAX as f64 {
        return Ok(u64::MAX);
    }
    Ok(rounded as u64)
}

/// Maps an RPC commitment label onto [`ConfirmationStatus`].
fn parse_confirmation_status(label: &str) -> Option<ConfirmationStatus> {
    match label {
        "processed" => Some(ConfirmationStatus::Processed),
        "confirmed" => Some(ConfirmationStatus::Confirmed),
        "finalized" => Some(ConfirmationStatus::Finalized),
        _ => None,
    }
}

/// Solana JSON-RPC client used for every network-facing source in the engine.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    /// HTTP client used for RPC calls.
    client: reqwest::Client,
    /// Target JSON-RPC endpoint URL.
    rpc_url: String,
}

impl JsonRpcClient {
    /// Creates a client with the default request timeout and no authorization.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::BuildClient`] when HTTP client creation fails.
    pub fn new(rpc_url: impl Into<String>) -> Result<Self, RpcError> {
        Self::with_options(rpc_url, None, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a client with an optional `Authorization` header and explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] when the header is invalid or HTTP client creation fails.
    pub fn with_options(
        rpc_url: impl Into<String>,
        authorization: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        Ok(Self {
            client: build_http_client(timeout, authorization)?,
            rpc_url: rpc_url.into(),
        })
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Issues one call against this endpoint.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        rpc_call(&self.client, &self.rpc_url, method, params).await
    }
}

#[async_trait]
impl BlockhashSource for JsonRpcClient {
    async fn latest_blockhash(&self) -> Result<RecencyToken, RpcError> {
        const METHOD: &str = "getLatestBlockhash";
        let response: RpcContextual<LatestBlockhash> = self
            .call(METHOD, serde_json::json!([{ "commitment": "confirmed" }]))
            .await?;
        let blockhash = Hash::from_str(&response.value.blockhash).map_err(|error| {
            RpcError::InvalidResponse {
                method: METHOD,
                message: format!("invalid blockhash {}: {error}", response.value.blockhash),
            }
        })?;
        Ok(RecencyToken::new(
            blockhash,
            response.value.last_valid_block_height,
        ))
    }
}

#[async_trait]
impl AccountLookup for JsonRpcClient {
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, RpcError> {
        let response: RpcContextual<Option<serde_json::Value>> = self
            .call(
                "getAccountInfo",
                serde_json::json!([
                    address.to_string(),
                    {
                        "encoding": "base64",
                        "commitment": "confirmed",
                        "dataSlice": { "offset": 0, "length": 0 }
                    }
                ]),
            )
            .await?;
        Ok(response.value.is_some())
    }
}

#[async_trait]
impl PriorityFeeSource for JsonRpcClient {
    async fn high_priority_fee(&self) -> Result<u64, RpcError> {
        let result: serde_json::Value = self
            .call(
                "getPriorityFeeEstimate",
                serde_json::json!([{
                    "accountKeys": [PRIORITY_FEE_REFERENCE_ACCOUNT],
                    "options": { "includeAllPriorityFeeLevels": true }
                }]),
            )
            .await?;
        parse_priority_fee_levels(&result)
    }
}

#[async_trait]
impl SignatureStatusSource for JsonRpcClient {
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcError> {
        let response: RpcContextual<Vec<Option<RawSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                serde_json::json!([[signature.to_string()], { "searchTransactionHistory": false }]),
            )
            .await?;
        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|raw| SignatureStatus {
                confirmation_status: raw
                    .confirmation_status
                    .as_deref()
                    .and_then(parse_confirmation_status),
                error: raw
                    .err
                    .filter(|err| !err.is_null())
                    .map(|err| err.to_string()),
            }))
    }
}

#[async_trait]
impl RpcSubmitTransport for JsonRpcClient {
    async fn submit_rpc(
        &self,
        tx_bytes: &[u8],
        config: &RpcSubmitConfig,
    ) -> Result<String, SubmitTransportError> {
        #[derive(Debug, Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SendConfig<'config> {
            /// Transaction encoding format.
            encoding: &'config str,
            /// Preflight skip flag.
            skip_preflight: bool,
            /// Optional preflight commitment.
            #[serde(skip_serializing_if = "Option::is_none")]
            preflight_commitment: Option<&'config str>,
            /// Node-side rebroadcast budget.
            #[serde(skip_serializing_if = "Option::is_none")]
            max_retries: Option<usize>,
        }

        let encoded_tx = BASE64_STANDARD.encode(tx_bytes);
        let params = serde_json::json!([
            encoded_tx,
            SendConfig {
                encoding: "base64",
                skip_preflight: config.skip_preflight,
                preflight_commitment: config.preflight_commitment.as_deref(),
                max_retries: config.max_retries,
            }
        ]);
        self.call("sendTransaction", params)
            .await
            .map_err(|error| SubmitTransportError::Failure {
                message: error.to_string(),
            })
    }
}
