#![forbid(unsafe_code)]
#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::expect_used,
        clippy::indexing_slicing,
        clippy::missing_docs_in_private_items,
        clippy::panic,
        missing_docs
    )
)]

//! Transfer engine for sending SOL and SPL tokens: builds signed transfers, prices priority
//! fees and block-builder tips, fans units out over RPC, premium, and bundle routes, and
//! confirms them under a bounded retry loop.

/// Asset descriptors and exact base-unit conversion.
pub mod amount;
/// Transfer construction and signing.
pub mod builder;
/// Engine configuration from environment variables.
pub mod config;
/// Signature status polling.
pub mod confirm;
/// Public transfer entry points and retry loop.
pub mod engine;
/// Environment lookup with overrides.
pub mod env;
/// Priority fee estimation cache.
pub mod fees;
/// Tracing subscriber setup.
pub mod logging;
/// Recency-token cache and account lookup.
pub mod providers;
/// Routing policy and tip-account rotation.
pub mod routing;
/// JSON-RPC client for every network-facing source.
pub mod rpc;
/// Signing boundary types.
pub mod signing;
/// Broadcast routes and fan-out.
pub mod submit;
/// Streaming tip feed and tip sizing.
pub mod tips;

pub use amount::{AmountError, Asset};
pub use builder::{BuilderError, SignedUnit, TransferPlan, TxBuilder, build_transfer};
pub use config::{ConfigError, EngineConfig};
pub use confirm::{ConfirmationOutcome, ConfirmationTracker};
pub use engine::{EngineState, TransferEngine, TransferError, TransferResult};
pub use fees::FeeEstimator;
pub use logging::init_tracing;
pub use providers::{BlockhashCache, RecencyToken};
pub use routing::{PriorityTier, Route, RoutingPolicy};
pub use rpc::{JsonRpcClient, RpcError};
pub use signing::WalletCredential;
pub use submit::{BroadcastOutcome, Broadcaster, SubmitTransportError};
pub use tips::{TipFeed, TipObservation};
