//! Bounded polling for a submitted signature's terminal status.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use solana_signature::Signature;

use crate::rpc::RpcError;

/// Default number of status queries per signature.
pub const DEFAULT_CONFIRM_MAX_TRIES: u32 = 60;
/// Default spacing between status queries.
pub const DEFAULT_CONFIRM_INTERVAL: Duration = Duration::from_secs(1);

/// Commitment reached by a transaction.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConfirmationStatus {
    /// Seen by the node, not yet voted on.
    Processed,
    /// Voted on by a supermajority.
    Confirmed,
    /// Rooted.
    Finalized,
}

impl ConfirmationStatus {
    /// Returns true for confirmed or finalized.
    #[must_use]
    pub const fn is_landed(self) -> bool {
        matches!(self, Self::Confirmed | Self::Finalized)
    }
}

/// Status snapshot for one signature.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignatureStatus {
    /// Commitment reached, if reported.
    pub confirmation_status: Option<ConfirmationStatus>,
    /// Execution error rendered as text, when the transaction failed.
    pub error: Option<String>,
}

/// Network source of signature status.
#[async_trait]
pub trait SignatureStatusSource: Send + Sync {
    /// Returns the status for `signature`, or `None` when the node has not seen it.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatus>, RpcError>;
}

/// Polling budget.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ConfirmationConfig {
    /// Maximum status queries.
    pub max_tries: u32,
    /// Spacing between queries.
    pub interval: Duration,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_CONFIRM_MAX_TRIES,
            interval: DEFAULT_CONFIRM_INTERVAL,
        }
    }
}

impl ConfirmationConfig {
    /// Returns a config with at least one try.
    #[must_use]
    pub const fn normalized(self) -> Self {
        Self {
            max_tries: if self.max_tries == 0 { 1 } else { self.max_tries },
            interval: self.interval,
        }
    }
}

/// Terminal result of polling one signature.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConfirmationOutcome {
    /// Reached confirmed or finalized.
    Confirmed,
    /// Reached confirmed or finalized with an execution error.
    Failed {
        /// Execution error text.
        error: String,
    },
    /// Budget exhausted without a terminal status.
    TimedOut {
        /// Queries issued.
        tries: u32,
    },
}

impl ConfirmationOutcome {
    /// Returns true when the transaction reached confirmed or finalized, with or without an
    /// execution error.
    #[must_use]
    pub const fn is_landed(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed { .. })
    }
}

/// Polls signature status with a fixed number of tries and fixed spacing.
#[derive(Clone)]
pub struct ConfirmationTracker {
    /// Status backend.
    source: Arc<dyn SignatureStatusSource>,
    /// Polling budget.
    config: ConfirmationConfig,
}

impl ConfirmationTracker {
    /// Creates a tracker over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn SignatureStatusSource>, config: ConfirmationConfig) -> Self {
        Self {
            source,
            config: config.normalized(),
        }
    }

    /// Returns the polling budget.
    #[must_use]
    pub const fn config(&self) -> ConfirmationConfig {
        self.config
    }

    /// Returns true once the signature reaches confirmed or finalized within the budget.
    ///
    /// An execution error does not change the answer; [`ConfirmationTracker::poll_outcome`]
    /// reports it.
    pub async fn poll(&self, signature: &Signature) -> bool {
        self.poll_outcome(signature).await.is_landed()
    }

    /// Polls until the signature reaches confirmed or finalized, or the budget runs out.
    ///
    /// A landed status carrying an execution error yields [`ConfirmationOutcome::Failed`].
    /// Lower commitments keep polling even when they carry an error. Query errors count as a
    /// try. No sleep follows the last try.
    pub async fn poll_outcome(&self, signature: &Signature) -> ConfirmationOutcome {
        let max_tries = self.config.max_tries;
        for attempt in 1..=max_tries {
            match self.source.signature_status(signature).await {
                Ok(Some(status))
                    if status
                        .confirmation_status
                        .is_some_and(ConfirmationStatus::is_landed) =>
                {
                    if let Some(error) = status.error {
                        tracing::warn!(
                            signature = %signature,
                            attempt,
                            error = %error,
                            "transaction landed with an error"
                        );
                        return ConfirmationOutcome::Failed { error };
                    }
                    tracing::debug!(signature = %signature, attempt, "transaction confirmed");
                    return ConfirmationOutcome::Confirmed;
                }
                Ok(Some(_)) => {}
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        signature = %signature,
                        attempt,
                        error = %error,
                        "signature status query failed"
                    );
                }
            }
            if attempt < max_tries {
                tokio::time::sleep(self.config.interval).await;
            }
        }
        tracing::warn!(signature = %signature, tries = max_tries, "confirmation budget exhausted");
        ConfirmationOutcome::TimedOut { tries: max_tries }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Scripted status answer.
    #[derive(Clone)]
    enum Step {
        Unknown,
        Status(ConfirmationStatus),
        Failed(ConfirmationStatus),
        QueryError,
    }

    /// Status source replaying scripted steps; the last step repeats.
    struct ScriptedStatus {
        /// Ordered steps.
        steps: Vec<Step>,
        /// Number of queries.
        calls: Mutex<u32>,
    }

    impl ScriptedStatus {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps,
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.lock().map(|calls| *calls).unwrap_or_default()
        }
    }

    #[async_trait]
    impl SignatureStatusSource for ScriptedStatus {
        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<Option<SignatureStatus>, RpcError> {
            let mut index = 0;
            if let Ok(mut calls) = self.calls.lock() {
                index = *calls as usize;
                *calls = calls.saturating_add(1);
            }
            let step = self
                .steps
                .get(index)
                .or_else(|| self.steps.last())
                .cloned()
                .unwrap_or(Step::Unknown);
            match step {
                Step::Unknown => Ok(None),
                Step::Status(status) => Ok(Some(SignatureStatus {
                    confirmation_status: Some(status),
                    error: None,
                })),
                Step::Failed(status) => Ok(Some(SignatureStatus {
                    confirmation_status: Some(status),
                    error: Some("InstructionError".to_owned()),
                })),
                Step::QueryError => Err(RpcError::InvalidResponse {
                    method: "getSignatureStatuses",
                    message: "scripted failure".to_owned(),
                }),
            }
        }
    }

    fn tracker(source: Arc<ScriptedStatus>, max_tries: u32) -> ConfirmationTracker {
        ConfirmationTracker::new(
            source,
            ConfirmationConfig {
                max_tries,
                interval: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn confirms_when_source_reports_confirmed_within_budget() {
        let source = ScriptedStatus::new(vec![
            Step::Unknown,
            Step::Status(ConfirmationStatus::Processed),
            Step::Status(ConfirmationStatus::Confirmed),
        ]);
        assert!(tracker(source.clone(), 5).poll(&Signature::default()).await);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn finalized_counts_as_confirmed() {
        let source = ScriptedStatus::new(vec![Step::Status(ConfirmationStatus::Finalized)]);
        assert!(tracker(source.clone(), 5).poll(&Signature::default()).await);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn never_confirming_source_uses_exactly_max_tries() {
        let source = ScriptedStatus::new(vec![Step::Status(ConfirmationStatus::Processed)]);
        let outcome = tracker(source.clone(), 7)
            .poll_outcome(&Signature::default())
            .await;
        assert_eq!(outcome, ConfirmationOutcome::TimedOut { tries: 7 });
        assert_eq!(source.calls(), 7);
    }

    #[tokio::test]
    async fn confirmation_after_budget_is_not_observed() {
        let source = ScriptedStatus::new(vec![
            Step::Unknown,
            Step::Unknown,
            Step::Status(ConfirmationStatus::Confirmed),
        ]);
        assert!(!tracker(source.clone(), 2).poll(&Signature::default()).await);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn query_errors_count_as_tries() {
        let source = ScriptedStatus::new(vec![
            Step::QueryError,
            Step::QueryError,
            Step::Status(ConfirmationStatus::Confirmed),
        ]);
        assert!(tracker(source.clone(), 3).poll(&Signature::default()).await);
        assert_eq!(source.calls(), 3);

        let always_failing = ScriptedStatus::new(vec![Step::QueryError]);
        assert!(!tracker(always_failing.clone(), 4).poll(&Signature::default()).await);
        assert_eq!(always_failing.calls(), 4);
    }

    #[tokio::test]
    async fn finalized_with_execution_error_is_landed_and_reported() {
        let source = ScriptedStatus::new(vec![
            Step::Unknown,
            Step::Failed(ConfirmationStatus::Finalized),
        ]);
        let tracker = tracker(source.clone(), 10);
        assert!(tracker.poll(&Signature::default()).await);
        assert_eq!(source.calls(), 2);

        let outcome = tracker.poll_outcome(&Signature::default()).await;
        assert_eq!(
            outcome,
            ConfirmationOutcome::Failed {
                error: "InstructionError".to_owned(),
            }
        );
        assert!(outcome.is_landed());
    }

    #[tokio::test]
    async fn processed_error_keeps_polling_until_landed() {
        let source = ScriptedStatus::new(vec![
            Step::Failed(ConfirmationStatus::Processed),
            Step::Failed(ConfirmationStatus::Processed),
            Step::Status(ConfirmationStatus::Confirmed),
        ]);
        let outcome = tracker(source.clone(), 5)
            .poll_outcome(&Signature::default())
            .await;
        assert_eq!(outcome, ConfirmationOutcome::Confirmed);
        assert_eq!(source.calls(), 3);

        let never_landing = ScriptedStatus::new(vec![Step::Failed(ConfirmationStatus::Processed)]);
        assert!(!tracker(never_landing.clone(), 3).poll(&Signature::default()).await);
        assert_eq!(never_landing.calls(), 3);
    }

    #[test]
    fn zero_tries_normalizes_to_one() {
        let config = ConfirmationConfig {
            max_tries: 0,
            interval: Duration::ZERO,
        }
        .normalized();
        assert_eq!(config.max_tries, 1);
    }
}
