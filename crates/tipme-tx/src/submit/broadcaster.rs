//! Concurrent multi-route fan-out of one signed unit.

use std::{sync::Arc, time::Duration};

use futures_util::{StreamExt, stream::FuturesUnordered};
use tokio::task::JoinHandle;

use super::{
    BroadcastConfig, BroadcastOutcome, BundleSubmitTransport, RouteRejection, RpcSubmitConfig,
    RpcSubmitTransport,
};
use crate::{
    builder::SignedUnit,
    routing::{Route, RoutingPolicy},
};

/// Output of one spawned route task.
type RouteResult = (Route, Result<String, String>);

/// Sends a signed unit over every route a policy enables and returns on the first acceptance.
///
/// Each route runs as its own task. Routes still in flight when one accepts keep running
/// detached; their results are discarded.
pub struct Broadcaster {
    /// Default RPC endpoint.
    direct: Option<Arc<dyn RpcSubmitTransport>>,
    /// Premium RPC endpoint.
    premium: Option<Arc<dyn RpcSubmitTransport>>,
    /// Block-builder bundle endpoint.
    bundle: Option<Arc<dyn BundleSubmitTransport>>,
    /// `sendTransaction` tuning shared by direct and premium.
    rpc_config: RpcSubmitConfig,
    /// Fan-out tuning.
    config: BroadcastConfig,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    /// Creates a broadcaster with no transports configured.
    #[must_use]
    pub fn new() -> Self {
        Self {
            direct: None,
            premium: None,
            bundle: None,
            rpc_config: RpcSubmitConfig::default(),
            config: BroadcastConfig::default(),
        }
    }

    /// Sets the default RPC transport.
    #[must_use]
    pub fn with_direct_transport(mut self, transport: Arc<dyn RpcSubmitTransport>) -> Self {
        self.direct = Some(transport);
        self
    }

    /// Sets the premium RPC transport.
    #[must_use]
    pub fn with_premium_transport(mut self, transport: Arc<dyn RpcSubmitTransport>) -> Self {
        self.premium = Some(transport);
        self
    }

    /// Sets the bundle transport.
    #[must_use]
    pub fn with_bundle_transport(mut self, transport: Arc<dyn BundleSubmitTransport>) -> Self {
        self.bundle = Some(transport);
        self
    }

    /// Sets RPC submit tuning.
    #[must_use]
    pub fn with_rpc_config(mut self, config: RpcSubmitConfig) -> Self {
        self.rpc_config = config;
        self
    }

    /// Sets fan-out tuning.
    #[must_use]
    pub const fn with_config(mut self, config: BroadcastConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns true when `route` has a transport.
    #[must_use]
    pub const fn is_configured(&self, route: Route) -> bool {
        match route {
            Route::Direct => self.direct.is_some(),
            Route::Premium => self.premium.is_some(),
            Route::Bundle => self.bundle.is_some(),
        }
    }

    /// Fans `unit` out to every configured route enabled by `policy`.
    ///
    /// Returns `accepted = true` with the accepting route as soon as any route accepts,
    /// or `accepted = false` once every started route has failed.
    pub async fn send(&self, unit: &SignedUnit, policy: &RoutingPolicy) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut pending: FuturesUnordered<JoinHandle<RouteResult>> = FuturesUnordered::new();

        for route in policy.routes() {
            if !self.is_configured(route) {
                tracing::debug!(route = %route, "route enabled but not configured; skipping");
                outcome.skipped.push(route);
                continue;
            }
            match self.spawn_route(route, unit) {
                Ok(handle) => pending.push(handle),
                Err(message) => {
                    tracing::warn!(route = %route, error = %message, "route could not start");
                    outcome.rejections.push(RouteRejection { route, message });
                }
            }
        }

        if pending.is_empty() {
            tracing::warn!(
                signature = %unit.signature(),
                skipped = outcome.skipped.len(),
                rejected = outcome.rejections.len(),
                "no broadcast route started"
            );
            return outcome;
        }

        while let Some(joined) = pending.next().await {
            match joined {
                Ok((route, Ok(receipt))) => {
                    tracing::info!(
                        signature = %unit.signature(),
                        route = %route,
                        receipt = %receipt,
                        in_flight = pending.len(),
                        "route accepted transaction"
                    );
                    outcome.accepted = true;
                    outcome.via.push(route);
                    return outcome;
                }
                Ok((route, Err(message))) => {
                    tracing::warn!(
                        signature = %unit.signature(),
                        route = %route,
                        error = %message,
                        "route rejected transaction"
                    );
                    outcome.rejections.push(RouteRejection { route, message });
                }
                Err(error) => {
                    tracing::warn!(
                        signature = %unit.signature(),
                        error = %error,
                        "route task failed to complete"
                    );
                }
            }
        }
        outcome
    }

    /// Spawns one bounded route submission.
    fn spawn_route(
        &self,
        route: Route,
        unit: &SignedUnit,
    ) -> Result<JoinHandle<RouteResult>, String> {
        let timeout = self.config.route_timeout;
        match route {
            Route::Direct | Route::Premium => {
                let transport = match route {
                    Route::Direct => self.direct.clone(),
                    _ => self.premium.clone(),
                }
                .ok_or_else(|| format!("{route} transport is not configured"))?;
                let tx_bytes = unit.wire_bytes().map_err(|error| error.to_string())?;
                let rpc_config = self.rpc_config.clone();
                Ok(tokio::spawn(async move {
                    let submitted = tokio::time::timeout(
                        timeout,
                        transport.submit_rpc(&tx_bytes, &rpc_config),
                    )
                    .await;
                    (route, settle(submitted, timeout))
                }))
            }
            Route::Bundle => {
                let transport = self
                    .bundle
                    .clone()
                    .ok_or_else(|| "bundle transport is not configured".to_owned())?;
                if unit.tip_transaction().is_none() {
                    return Err("bundle requires a sibling tip transaction".to_owned());
                }
                let bundle = unit.bundle_wire_bytes().map_err(|error| error.to_string())?;
                Ok(tokio::spawn(async move {
                    let submitted =
                        tokio::time::timeout(timeout, transport.submit_bundle(&bundle)).await;
                    (route, settle(submitted, timeout))
                }))
            }
        }
    }
}

/// Flattens a timed transport result into a receipt or an error message.
fn settle<E: std::fmt::Display>(
    submitted: Result<Result<String, E>, tokio::time::error::Elapsed>,
    timeout: Duration,
) -> Result<String, String> {
    match submitted {
        Ok(Ok(receipt)) => Ok(receipt),
        Ok(Err(error)) => Err(error.to_string()),
        Err(_elapsed) => Err(format!("timed out after {}ms", timeout.as_millis())),
    }
}
