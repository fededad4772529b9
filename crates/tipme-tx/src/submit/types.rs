//! Shared submission types, errors, and transport traits.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::routing::Route;

/// Default per-route submission budget.
pub const DEFAULT_ROUTE_TIMEOUT: Duration = Duration::from_secs(10);

/// RPC submit tuning.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RpcSubmitConfig {
    /// Skip preflight simulation when true.
    pub skip_preflight: bool,
    /// Optional preflight commitment string.
    pub preflight_commitment: Option<String>,
    /// Node-side rebroadcast budget; zero leaves retries to the engine.
    pub max_retries: Option<usize>,
}

impl Default for RpcSubmitConfig {
    fn default() -> Self {
        Self {
            skip_preflight: true,
            preflight_commitment: None,
            max_retries: Some(0),
        }
    }
}

/// Fan-out tuning.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BroadcastConfig {
    /// Upper bound on one route's submission.
    pub route_timeout: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            route_timeout: DEFAULT_ROUTE_TIMEOUT,
        }
    }
}

/// Low-level transport errors surfaced by submit backends.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SubmitTransportError {
    /// Invalid transport configuration.
    #[error("transport configuration invalid: {message}")]
    Config {
        /// Human-readable description.
        message: String,
    },
    /// Transport operation failed.
    #[error("transport failure: {message}")]
    Failure {
        /// Human-readable description.
        message: String,
    },
}

/// One route's failure to accept a unit.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RouteRejection {
    /// Failing route.
    pub route: Route,
    /// Failure description.
    pub message: String,
}

/// Result of one fan-out.
///
/// Acceptance means a route received the unit for processing, not that it landed.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BroadcastOutcome {
    /// True when at least one route accepted.
    pub accepted: bool,
    /// Route whose acceptance ended the fan-out.
    pub via: Vec<Route>,
    /// Routes enabled by policy but not configured.
    pub skipped: Vec<Route>,
    /// Failures observed before the first acceptance.
    pub rejections: Vec<RouteRejection>,
}

/// RPC transport interface.
#[async_trait]
pub trait RpcSubmitTransport: Send + Sync {
    /// Submits transaction bytes to RPC and returns signature string.
    async fn submit_rpc(
        &self,
        tx_bytes: &[u8],
        config: &RpcSubmitConfig,
    ) -> Result<String, SubmitTransportError>;
}

/// Block-builder bundle transport interface.
#[async_trait]
pub trait BundleSubmitTransport: Send + Sync {
    /// Submits serialized transactions as one atomic bundle and returns the bundle id.
    async fn submit_bundle(&self, transactions: &[Vec<u8>]) -> Result<String, SubmitTransportError>;
}
