//! Bounded end-to-end transfer retry loop.

use std::{sync::Arc, time::Instant};

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use spl_associated_token_account_interface::address::get_associated_token_address;

use super::{EngineState, TransferError, TransferResult};
use crate::{
    amount::Asset,
    builder::{AccountCreation, SignedUnit, TipPlan, TransferPlan, build_transfer},
    config::EngineConfig,
    confirm::{ConfirmationOutcome, ConfirmationTracker},
    fees::FeeEstimator,
    providers::{AccountLookup, BlockhashCache},
    routing::{Route, RoutingPolicy, select_tip_account},
    rpc::{DEFAULT_REQUEST_TIMEOUT, JsonRpcClient, RpcError},
    signing::WalletCredential,
    submit::{BlockEngineTransport, BroadcastOutcome, Broadcaster},
    tips::TipFeed,
};

/// One build/broadcast/confirm pass.
struct SubmissionAttempt {
    /// 1-based attempt number.
    number: u32,
    /// Routes the policy enables.
    routes: Vec<Route>,
    /// Attempt start.
    started_at: Instant,
    /// Signed transfer.
    unit: SignedUnit,
}

impl SubmissionAttempt {
    /// Returns the transfer signature.
    const fn signature(&self) -> Signature {
        self.unit.signature()
    }

    /// Milliseconds since the attempt started.
    fn elapsed_ms(&self) -> u128 {
        self.started_at.elapsed().as_millis()
    }
}

/// Outward-facing transfer engine: builds, broadcasts, and confirms with fresh parameters on
/// every attempt.
pub struct TransferEngine {
    /// Shared caches.
    state: EngineState,
    /// Receiving-account existence lookup.
    accounts: Arc<dyn AccountLookup>,
    /// Route fan-out.
    broadcaster: Broadcaster,
    /// Status polling.
    tracker: ConfirmationTracker,
    /// Route and priority selection.
    policy: RoutingPolicy,
    /// Attempts used by [`TransferEngine::send_native`] and [`TransferEngine::send_asset`]
    /// when the caller passes zero.
    default_max_attempts: u32,
}

impl TransferEngine {
    /// Creates an engine over injected collaborators with the default routing policy.
    #[must_use]
    pub fn new(
        state: EngineState,
        accounts: Arc<dyn AccountLookup>,
        broadcaster: Broadcaster,
        tracker: ConfirmationTracker,
    ) -> Self {
        Self {
            state,
            accounts,
            broadcaster,
            tracker,
            policy: RoutingPolicy::default(),
            default_max_attempts: crate::config::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the routing policy.
    #[must_use]
    pub const fn with_routing_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the attempt budget used when callers pass zero.
    #[must_use]
    pub fn with_default_max_attempts(mut self, attempts: u32) -> Self {
        self.default_max_attempts = attempts.max(1);
        self
    }

    /// Wires JSON-RPC clients, the bundle transport, and fresh caches from `config`.
    ///
    /// The tip feed is created stopped. The first tipped attempt starts it; the caller can
    /// start it earlier or stop it through [`TransferEngine::state`].
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] when an HTTP client cannot be built.
    pub fn from_config(config: &EngineConfig) -> Result<Self, RpcError> {
        let config = config.clone().normalized();
        let rpc = Arc::new(JsonRpcClient::with_options(
            config.rpc_url.clone(),
            config.rpc_auth_token.as_deref(),
            DEFAULT_REQUEST_TIMEOUT,
        )?);
        let premium = config
            .premium_rpc_url
            .as_ref()
            .map(JsonRpcClient::new)
            .transpose()?
            .map(Arc::new);

        let fee_source = premium.clone().unwrap_or_else(|| Arc::clone(&rpc));
        let state = EngineState::new(
            Arc::new(BlockhashCache::new(rpc.clone())),
            Arc::new(FeeEstimator::new(fee_source, config.fees)),
            Arc::new(TipFeed::new(config.tips.clone())),
        );

        let mut broadcaster = Broadcaster::new()
            .with_direct_transport(rpc.clone())
            .with_config(config.broadcast);
        if let Some(premium) = premium {
            broadcaster = broadcaster.with_premium_transport(premium);
        }
        if let Some(url) = config.block_engine_url.as_deref() {
            broadcaster =
                broadcaster.with_bundle_transport(Arc::new(BlockEngineTransport::new(url)?));
        }

        let tracker = ConfirmationTracker::new(rpc.clone(), config.confirmation);
        Ok(Self::new(state, rpc, broadcaster, tracker)
            .with_routing_policy(config.routing)
            .with_default_max_attempts(config.max_attempts))
    }

    /// Returns the shared caches.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Returns the routing policy.
    #[must_use]
    pub const fn policy(&self) -> RoutingPolicy {
        self.policy
    }

    /// Sends `amount` SOL from `from` to `to`.
    pub async fn send_native(
        &self,
        from: &WalletCredential,
        to: Pubkey,
        amount: f64,
        max_attempts: u32,
    ) -> TransferResult {
        self.execute(from, to, amount, Asset::Native, max_attempts)
            .await
    }

    /// Sends `amount` of the token `mint` (with `decimals` precision) from `from` to `to`.
    pub async fn send_asset(
        &self,
        from: &WalletCredential,
        to: Pubkey,
        amount: f64,
        mint: Pubkey,
        decimals: u8,
        max_attempts: u32,
    ) -> TransferResult {
        self.execute(from, to, amount, Asset::token(mint, decimals), max_attempts)
            .await
    }

    /// Runs up to `max_attempts` build/broadcast/confirm passes. Zero uses the configured
    /// default.
    ///
    /// The amount and credential are validated before any network call.
    pub async fn execute(
        &self,
        from: &WalletCredential,
        to: Pubkey,
        amount: f64,
        asset: Asset,
        max_attempts: u32,
    ) -> TransferResult {
        let max_attempts = if max_attempts == 0 {
            self.default_max_attempts
        } else {
            max_attempts
        };
        let result = self.run(from, to, amount, asset, max_attempts).await;
        if let Err(error) = &result {
            tracing::warn!(
                from = from.public_address(),
                to = %to,
                asset = %asset,
                amount,
                error = %error,
                cause = %error.root_cause(),
                "transfer failed"
            );
        }
        TransferResult::from(result)
    }

    /// Validates inputs and drives attempts until success, a terminal error, or exhaustion.
    async fn run(
        &self,
        from: &WalletCredential,
        to: Pubkey,
        amount: f64,
        asset: Asset,
        max_attempts: u32,
    ) -> Result<Signature, TransferError> {
        let _ = asset.base_units(amount)?;
        let keypair = from.keypair()?;

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match self.attempt(&keypair, to, amount, asset, attempt).await {
                Ok(signature) => return Ok(signature),
                Err(error) if error.is_retryable() => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %error,
                        "transfer attempt failed"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(TransferError::ExhaustedRetries {
            attempts: max_attempts,
            last: Box::new(last_error.unwrap_or_else(|| TransferError::BroadcastRejected {
                message: "no attempt ran".to_owned(),
            })),
        })
    }

    /// One BUILD, BROADCAST, CONFIRM pass with a fresh blockhash and fee.
    async fn attempt(
        &self,
        keypair: &Keypair,
        to: Pubkey,
        amount: f64,
        asset: Asset,
        number: u32,
    ) -> Result<Signature, TransferError> {
        let started_at = Instant::now();
        let token = self.state.blockhash.refresh().await.map_err(|error| {
            TransferError::NetworkUnavailable {
                message: error.to_string(),
            }
        })?;
        let tier = self.policy.priority_tier;
        let fee_micro_lamports = self.state.fees.get(number > 1, tier).await;
        let receiving_account = self.receiving_account(&to, &asset).await;
        let tip = self.policy.tip_placement().map(|placement| {
            self.state.tips.start();
            TipPlan {
                recipient: select_tip_account(),
                lamports: self.state.tips.tip_lamports(tier),
                placement,
            }
        });
        let plan = TransferPlan {
            to,
            amount,
            asset,
            fee_micro_lamports,
            tip,
            receiving_account,
        };
        let attempt = SubmissionAttempt {
            number,
            routes: self.policy.routes(),
            started_at,
            unit: build_transfer(keypair, &plan, token.blockhash_bytes())?,
        };
        tracing::debug!(
            attempt = attempt.number,
            signature = %attempt.signature(),
            routes = ?attempt.routes,
            fee_micro_lamports,
            tip_lamports = tip.map(|tip| tip.lamports),
            last_valid_block_height = token.last_valid_block_height,
            "built transfer"
        );

        let outcome = self.broadcaster.send(&attempt.unit, &self.policy).await;
        if !outcome.accepted {
            return Err(TransferError::BroadcastRejected {
                message: rejection_summary(&outcome),
            });
        }

        let signature = attempt.signature();
        match self.tracker.poll_outcome(&signature).await {
            ConfirmationOutcome::Confirmed => {
                tracing::info!(
                    attempt = attempt.number,
                    signature = %signature,
                    via = ?outcome.via,
                    elapsed_ms = attempt.elapsed_ms(),
                    "transfer confirmed"
                );
                Ok(signature)
            }
            ConfirmationOutcome::Failed { error } => {
                Err(TransferError::FailedOnChain { signature, error })
            }
            ConfirmationOutcome::TimedOut { tries } => {
                Err(TransferError::ConfirmationTimeout { signature, tries })
            }
        }
    }

    /// Decides how to handle the destination's token account for `asset`.
    async fn receiving_account(&self, to: &Pubkey, asset: &Asset) -> AccountCreation {
        let Asset::Token { mint, .. } = asset else {
            return AccountCreation::Skip;
        };
        let address = get_associated_token_address(to, mint);
        match self.accounts.account_exists(&address).await {
            Ok(true) => AccountCreation::Skip,
            Ok(false) => AccountCreation::Create,
            Err(error) => {
                tracing::warn!(
                    account = %address,
                    error = %error,
                    "receiving account lookup failed; using idempotent create"
                );
                AccountCreation::CreateIdempotent
            }
        }
    }
}

/// Renders route failures as `route: message` pairs.
fn rejection_summary(outcome: &BroadcastOutcome) -> String {
    let mut parts: Vec<String> = outcome
        .rejections
        .iter()
        .map(|rejection| format!("{}: {}", rejection.route, rejection.message))
        .collect();
    parts.extend(
        outcome
            .skipped
            .iter()
            .map(|route| format!("{route}: not configured")),
    );
    if parts.is_empty() {
        return "no routes enabled".to_owned();
    }
    parts.join("; ")
}
