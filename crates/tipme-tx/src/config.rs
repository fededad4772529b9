//! Engine configuration loaded from `TIPME_*` environment variables.

use std::{str::FromStr, time::Duration};

use thiserror::Error;

use crate::{
    confirm::ConfirmationConfig,
    env::EnvOverrides,
    fees::FeeConfig,
    routing::{PriorityTier, RoutingPolicy},
    submit::BroadcastConfig,
    tips::TipConfig,
};

/// Default JSON-RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
/// Default end-to-end attempts per transfer.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default RPC endpoint (required).
pub const ENV_RPC_URL: &str = "TIPME_RPC_URL";
/// `Authorization` header for the default RPC endpoint.
pub const ENV_RPC_AUTH_TOKEN: &str = "TIPME_RPC_AUTH_TOKEN";
/// Premium RPC endpoint.
pub const ENV_PREMIUM_RPC_URL: &str = "TIPME_PREMIUM_RPC_URL";
/// Block-engine base URL.
pub const ENV_BLOCK_ENGINE_URL: &str = "TIPME_BLOCK_ENGINE_URL";
/// Tip stream websocket URL.
pub const ENV_TIP_STREAM_URL: &str = "TIPME_TIP_STREAM_URL";
/// Enables the direct route.
pub const ENV_ROUTE_DIRECT: &str = "TIPME_ROUTE_DIRECT";
/// Enables the bundle route.
pub const ENV_ROUTE_BUNDLE: &str = "TIPME_ROUTE_BUNDLE";
/// Enables the premium route.
pub const ENV_ROUTE_PREMIUM: &str = "TIPME_ROUTE_PREMIUM";
/// `low` or `high`.
pub const ENV_PRIORITY_TIER: &str = "TIPME_PRIORITY_TIER";
/// High-tier tip ceiling in SOL.
pub const ENV_MAX_TIP_SOL: &str = "TIPME_MAX_TIP_SOL";
/// Attempts per transfer.
pub const ENV_MAX_ATTEMPTS: &str = "TIPME_MAX_ATTEMPTS";
/// Fee lower clamp.
pub const ENV_FEE_MIN: &str = "TIPME_FEE_MIN_MICRO_LAMPORTS";
/// Fee upper clamp.
pub const ENV_FEE_MAX: &str = "TIPME_FEE_MAX_MICRO_LAMPORTS";
/// Low-tier fixed fee.
pub const ENV_FEE_LOW_TIER: &str = "TIPME_FEE_LOW_TIER_MICRO_LAMPORTS";
/// Status queries per attempt.
pub const ENV_CONFIRM_MAX_TRIES: &str = "TIPME_CONFIRM_MAX_TRIES";
/// Spacing between status queries.
pub const ENV_CONFIRM_INTERVAL_MS: &str = "TIPME_CONFIRM_INTERVAL_MS";
/// Per-route submission budget.
pub const ENV_ROUTE_TIMEOUT_MS: &str = "TIPME_ROUTE_TIMEOUT_MS";

/// Configuration loading errors.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// Required variable is unset.
    #[error("missing required environment variable {name}")]
    Missing {
        /// Variable name.
        name: &'static str,
    },
    /// Variable is set to an unparsable value.
    #[error("invalid value `{value}` for {name}")]
    InvalidValue {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Default JSON-RPC endpoint.
    pub rpc_url: String,
    /// Optional `Authorization` header value for `rpc_url`.
    pub rpc_auth_token: Option<String>,
    /// Optional premium RPC endpoint; also used for fee estimates when set.
    pub premium_rpc_url: Option<String>,
    /// Optional block-engine base URL for bundles.
    pub block_engine_url: Option<String>,
    /// Route selection and priority tier.
    pub routing: RoutingPolicy,
    /// Attempts per transfer.
    pub max_attempts: u32,
    /// Fee estimator tuning.
    pub fees: FeeConfig,
    /// Tip feed tuning.
    pub tips: TipConfig,
    /// Confirmation polling budget.
    pub confirmation: ConfirmationConfig,
    /// Fan-out tuning.
    pub broadcast: BroadcastConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_owned(),
            rpc_auth_token: None,
            premium_rpc_url: None,
            block_engine_url: None,
            routing: RoutingPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            fees: FeeConfig::default(),
            tips: TipConfig::default(),
            confirmation: ConfirmationConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `TIPME_RPC_URL` is unset or any value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(&EnvOverrides::default())
    }

    /// Loads configuration through `env`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `TIPME_RPC_URL` is unset or any value fails to parse.
    pub fn from_env_with(env: &EnvOverrides) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let rpc_url = env
            .read(ENV_RPC_URL)
            .ok_or(ConfigError::Missing { name: ENV_RPC_URL })?;

        let routing = RoutingPolicy {
            use_direct: read_bool(env, ENV_ROUTE_DIRECT, defaults.routing.use_direct)?,
            use_bundle: read_bool(env, ENV_ROUTE_BUNDLE, defaults.routing.use_bundle)?,
            use_premium_rpc: read_bool(env, ENV_ROUTE_PREMIUM, defaults.routing.use_premium_rpc)?,
            priority_tier: read_parsed::<PriorityTier>(
                env,
                ENV_PRIORITY_TIER,
                defaults.routing.priority_tier,
            )?,
        };

        let max_tip_sol = read_parsed(env, ENV_MAX_TIP_SOL, defaults.tips.high_tier_max_sol)?;
        if !max_tip_sol.is_finite() || max_tip_sol < 0.0 {
            return Err(ConfigError::InvalidValue {
                name: ENV_MAX_TIP_SOL,
                value: max_tip_sol.to_string(),
            });
        }
        let tips = TipConfig {
            stream_url: env
                .read(ENV_TIP_STREAM_URL)
                .unwrap_or_else(|| defaults.tips.stream_url.clone()),
            high_tier_max_sol: max_tip_sol,
            ..defaults.tips
        };

        let fees = FeeConfig {
            low_tier_fee: read_parsed(env, ENV_FEE_LOW_TIER, defaults.fees.low_tier_fee)?,
            min_fee: read_parsed(env, ENV_FEE_MIN, defaults.fees.min_fee)?,
            max_fee: read_parsed(env, ENV_FEE_MAX, defaults.fees.max_fee)?,
            ..defaults.fees
        };

        let confirmation = ConfirmationConfig {
            max_tries: read_parsed(
                env,
                ENV_CONFIRM_MAX_TRIES,
                defaults.confirmation.max_tries,
            )?,
            interval: read_millis(env, ENV_CONFIRM_INTERVAL_MS, defaults.confirmation.interval)?,
        };

        let broadcast = BroadcastConfig {
            route_timeout: read_millis(
                env,
                ENV_ROUTE_TIMEOUT_MS,
                defaults.broadcast.route_timeout,
            )?,
        };

        Ok(Self {
            rpc_url,
            rpc_auth_token: env.read(ENV_RPC_AUTH_TOKEN),
            premium_rpc_url: env.read(ENV_PREMIUM_RPC_URL),
            block_engine_url: env.read(ENV_BLOCK_ENGINE_URL),
            routing,
            max_attempts: read_parsed(env, ENV_MAX_ATTEMPTS, defaults.max_attempts)?,
            fees,
            tips,
            confirmation,
            broadcast,
        }
        .normalized())
    }

    /// Returns a config with ordered fee bounds and at least one attempt and one try.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            max_attempts: self.max_attempts.max(1),
            fees: self.fees.normalized(),
            confirmation: self.confirmation.normalized(),
            ..self
        }
    }
}

/// Reads a boolean flag.
fn read_bool(env: &EnvOverrides, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = env.read(name) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { name, value }),
    }
}

/// Reads any `FromStr` value.
fn read_parsed<T: FromStr>(
    env: &EnvOverrides,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env.read(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_error| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

/// Reads a millisecond duration.
fn read_millis(
    env: &EnvOverrides,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match env.read(name) {
        Some(_) => read_parsed(env, name, 0_u64).map(Duration::from_millis),
        None => Ok(default),
    }
}
