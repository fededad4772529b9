//! Block-builder `sendBundle` transport.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

use super::{BundleSubmitTransport, SubmitTransportError};
use crate::rpc::{DEFAULT_REQUEST_TIMEOUT, RpcError, build_http_client, rpc_call};

/// Returns the bundle endpoint under a block-engine base URL.
#[must_use]
pub fn bundles_endpoint(block_engine_url: &str) -> String {
    format!("{}/api/v1/bundles", block_engine_url.trim_end_matches('/'))
}

/// JSON-RPC bundle transport for a block-engine endpoint.
#[derive(Debug, Clone)]
pub struct BlockEngineTransport {
    /// HTTP client used for bundle calls.
    client: reqwest::Client,
    /// Full `/api/v1/bundles` URL.
    bundles_url: String,
}

impl BlockEngineTransport {
    /// Creates a transport for `block_engine_url` with the default request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::BuildClient`] when HTTP client creation fails.
    pub fn new(block_engine_url: &str) -> Result<Self, RpcError> {
        Self::with_timeout(block_engine_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Creates a transport with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::BuildClient`] when HTTP client creation fails.
    pub fn with_timeout(block_engine_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        Ok(Self {
            client: build_http_client(timeout, None)?,
            bundles_url: bundles_endpoint(block_engine_url),
        })
    }

    /// Returns the bundle endpoint URL.
    #[must_use]
    pub fn bundles_url(&self) -> &str {
        &self.bundles_url
    }
}

#[async_trait]
impl BundleSubmitTransport for BlockEngineTransport {
    async fn submit_bundle(&self, transactions: &[Vec<u8>]) -> Result<String, SubmitTransportError> {
        if transactions.is_empty() {
            return Err(SubmitTransportError::Config {
                message: "bundle must contain at least one transaction".to_owned(),
            });
        }
        let encoded: Vec<String> = transactions
            .iter()
            .map(|tx| BASE64_STANDARD.encode(tx))
            .collect();
        rpc_call(
            &self.client,
            &self.bundles_url,
            "sendBundle",
            serde_json::json!([encoded, { "encoding": "base64" }]),
        )
        .await
        .map_err(|error| SubmitTransportError::Failure {
            message: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_endpoint_appends_api_path() {
        assert_eq!(
            bundles_endpoint("https://mainnet.block-engine.jito.wtf/"),
            "https://mainnet.block-engine.jito.wtf/api/v1/bundles"
        );
        assert_eq!(
            bundles_endpoint("http://127.0.0.1:1234"),
            "http://127.0.0.1:1234/api/v1/bundles"
        );
    }

    #[test]
    fn transport_targets_bundle_endpoint() {
        let transport =
            BlockEngineTransport::with_timeout("http://127.0.0.1:1234/", Duration::from_secs(2));
        assert!(transport.is_ok());
        if let Ok(transport) = transport {
            assert_eq!(transport.bundles_url(), "http://127.0.0.1:1234/api/v1/bundles");
        }
    }

    #[tokio::test]
    async fn empty_bundle_is_rejected_locally() {
        let transport = BlockEngineTransport::new("http://127.0.0.1:9");
        assert!(transport.is_ok());
        if let Ok(transport) = transport {
            assert!(matches!(
                transport.submit_bundle(&[]).await,
                Err(SubmitTransportError::Config { .. })
            ));
        }
    }
}
