//! Transfer errors and the terminal transfer result.

use std::sync::Arc;

use solana_signature::Signature;
use thiserror::Error;

use crate::{
    amount::AmountError,
    builder::BuilderError,
    fees::FeeEstimator,
    providers::BlockhashCache,
    signing::CredentialError,
    tips::TipFeed,
};

/// Transfer failure taxonomy.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Amount is not exact at the asset precision.
    #[error("invalid amount: {source}")]
    InvalidAmount {
        /// Conversion failure.
        source: AmountError,
    },
    /// Wallet credential could not be decoded or does not match its address.
    #[error("invalid wallet credential: {source}")]
    InvalidCredential {
        /// Decode failure.
        source: CredentialError,
    },
    /// Native balance does not cover the transfer plus fee buffer.
    #[error("insufficient funds: need {required} lamports, have {available}")]
    InsufficientFunds {
        /// Lamports required.
        required: u64,
        /// Lamports available.
        available: u64,
    },
    /// No recent blockhash was ever obtained and the fetch failed.
    #[error("network unavailable: {message}")]
    NetworkUnavailable {
        /// Fetch failure text.
        message: String,
    },
    /// Transfer could not be constructed or signed.
    #[error("failed to build transfer: {source}")]
    Build {
        /// Builder failure.
        source: BuilderError,
    },
    /// No route accepted the unit.
    #[error("no route accepted the transaction: {message}")]
    BroadcastRejected {
        /// Per-route failure summary.
        message: String,
    },
    /// Accepted but not observed confirmed within the polling budget.
    #[error("transaction {signature} not confirmed after {tries} status checks")]
    ConfirmationTimeout {
        /// Submitted signature.
        signature: Signature,
        /// Status queries issued.
        tries: u32,
    },
    /// Landed with an execution error. Not retried.
    #[error("transaction {signature} failed on chain: {error}")]
    FailedOnChain {
        /// Submitted signature.
        signature: Signature,
        /// Execution error text.
        error: String,
    },
    /// Every attempt failed.
    #[error("failed to send transaction")]
    ExhaustedRetries {
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        last: Box<TransferError>,
    },
}

impl TransferError {
    /// Returns true when a fresh attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkUnavailable { .. }
                | Self::BroadcastRejected { .. }
                | Self::ConfirmationTimeout { .. }
        )
    }

    /// Returns the concrete failure behind [`TransferError::ExhaustedRetries`], or `self`.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::ExhaustedRetries { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

impl From<AmountError> for TransferError {
    fn from(source: AmountError) -> Self {
        match source {
            AmountError::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            source => Self::InvalidAmount { source },
        }
    }
}

impl From<CredentialError> for TransferError {
    fn from(source: CredentialError) -> Self {
        Self::InvalidCredential { source }
    }
}

impl From<BuilderError> for TransferError {
    fn from(source: BuilderError) -> Self {
        match source {
            BuilderError::InvalidAmount { source } => Self::InvalidAmount { source },
            source => Self::Build { source },
        }
    }
}

/// Terminal outcome of one transfer: a signature or an error, never both.
#[derive(Debug)]
pub struct TransferResult {
    /// Landed signature or final error.
    outcome: Result<Signature, TransferError>,
}

impl TransferResult {
    /// Creates a successful result.
    #[must_use]
    pub const fn success(signature: Signature) -> Self {
        Self {
            outcome: Ok(signature),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub const fn failure(error: TransferError) -> Self {
        Self {
            outcome: Err(error),
        }
    }

    /// Returns the landed signature.
    #[must_use]
    pub fn signature(&self) -> Option<Signature> {
        self.outcome.as_ref().ok().copied()
    }

    /// Returns the final error.
    #[must_use]
    pub fn error(&self) -> Option<&TransferError> {
        self.outcome.as_ref().err()
    }

    /// Returns true when the transfer landed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Converts into a plain `Result`.
    ///
    /// # Errors
    ///
    /// Returns the final [`TransferError`] for failed transfers.
    pub fn into_result(self) -> Result<Signature, TransferError> {
        self.outcome
    }

    /// Returns `{explorer_base}/tx/{signature}` for successful transfers.
    #[must_use]
    pub fn explorer_url(&self, explorer_base: &str) -> Option<String> {
        self.signature()
            .map(|signature| format!("{}/tx/{signature}", explorer_base.trim_end_matches('/')))
    }
}

impl From<Result<Signature, TransferError>> for TransferResult {
    fn from(outcome: Result<Signature, TransferError>) -> Self {
        Self { outcome }
    }
}

/// Process-wide caches shared by every transfer.
#[derive(Clone)]
pub struct EngineState {
    /// Recent blockhash cache.
    pub blockhash: Arc<BlockhashCache>,
    /// Priority fee cache.
    pub fees: Arc<FeeEstimator>,
    /// Tip distribution feed.
    pub tips: Arc<TipFeed>,
}

impl EngineState {
    /// Bundles the three caches.
    #[must_use]
    pub const fn new(
        blockhash: Arc<BlockhashCache>,
        fees: Arc<FeeEstimator>,
        tips: Arc<TipFeed>,
    ) -> Self {
        Self {
            blockhash,
            fees,
            tips,
        }
    }
}
