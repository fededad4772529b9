//! Recency-token cache, account lookup, and the source traits behind them.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use thiserror::Error;

use crate::rpc::RpcError;

/// Recent blockhash plus the last block height at which it is still accepted.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RecencyToken {
    /// Recent blockhash.
    pub blockhash: Hash,
    /// Last block height at which transactions anchored to `blockhash` are valid.
    pub last_valid_block_height: u64,
}

impl RecencyToken {
    /// Creates a recency token.
    #[must_use]
    pub const fn new(blockhash: Hash, last_valid_block_height: u64) -> Self {
        Self {
            blockhash,
            last_valid_block_height,
        }
    }

    /// Returns the blockhash bytes used to anchor messages.
    #[must_use]
    pub fn blockhash_bytes(&self) -> [u8; 32] {
        self.blockhash.to_bytes()
    }
}

/// Blockhash cache errors.
#[derive(Debug, Error)]
pub enum BlockhashError {
    /// Fetch failed and no token was ever cached.
    #[error("no recent blockhash available: {source}")]
    Unavailable {
        /// Last fetch failure.
        source: RpcError,
    },
}

/// Network source of fresh recency tokens.
#[async_trait]
pub trait BlockhashSource: Send + Sync {
    /// Fetches the network's latest blockhash.
    async fn latest_blockhash(&self) -> Result<RecencyToken, RpcError>;
}

/// Network lookup for account existence.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    /// Returns true when `address` holds an account.
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, RpcError>;
}

/// Process-wide single-slot cache of the most recent recency token.
///
/// Refreshes are whole-value replacements; concurrent callers may refresh redundantly and the
/// last write wins.
pub struct BlockhashCache {
    /// Fetch backend.
    source: Arc<dyn BlockhashSource>,
    /// Most recent token.
    latest: RwLock<Option<RecencyToken>>,
}

impl BlockhashCache {
    /// Creates an empty cache over `source`.
    #[must_use]
    pub fn new(source: Arc<dyn BlockhashSource>) -> Self {
        Self {
            source,
            latest: RwLock::new(None),
        }
    }

    /// Returns the cached token without touching the network.
    #[must_use]
    pub fn cached(&self) -> Option<RecencyToken> {
        self.latest.read().ok().and_then(|guard| *guard)
    }

    /// Returns the cached token, fetching one when the cache is empty.
    ///
    /// # Errors
    ///
    /// Returns [`BlockhashError::Unavailable`] when the cache is empty and the fetch fails.
    pub async fn get(&self) -> Result<RecencyToken, BlockhashError> {
        if let Some(token) = self.cached() {
            return Ok(token);
        }
        self.refresh().await
    }

    /// Fetches a fresh token and replaces the cached one.
    ///
    /// A failed fetch keeps the previous token and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`BlockhashError::Unavailable`] when the fetch fails and no token was ever cached.
    pub async fn refresh(&self) -> Result<RecencyToken, BlockhashError> {
        match self.source.latest_blockhash().await {
            Ok(token) => {
                if let Ok(mut guard) = self.latest.write() {
                    *guard = Some(token);
                }
                tracing::debug!(
                    blockhash = %token.blockhash,
                    last_valid_block_height = token.last_valid_block_height,
                    "refreshed recent blockhash"
                );
                Ok(token)
            }
            Err(source) => match self.cached() {
                Some(previous) => {
                    tracing::warn!(
                        error = %source,
                        blockhash = %previous.blockhash,
                        "blockhash refresh failed; keeping previous value"
                    );
                    Ok(previous)
                }
                None => Err(BlockhashError::Unavailable { source }),
            },
        }
    }
}

/// In-memory blockhash source for tests and offline builds.
#[derive(Debug, Clone)]
pub struct StaticBlockhashSource {
    /// Token returned on every call.
    token: RecencyToken,
}

impl StaticBlockhashSource {
    /// Creates a source that always returns `token`.
    #[must_use]
    pub const fn new(token: RecencyToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl BlockhashSource for StaticBlockhashSource {
    async fn latest_blockhash(&self) -> Result<RecencyToken, RpcError> {
        Ok(self.token)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Source that replays scripted responses and counts calls.
    struct ScriptedSource {
        /// Ordered responses; the last one repeats.
        responses: Vec<Option<RecencyToken>>,
        /// Number of fetches.
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl BlockhashSource for ScriptedSource {
        async fn latest_blockhash(&self) -> Result<RecencyToken, RpcError> {
            let mut index = 0;
            if let Ok(mut calls) = self.calls.lock() {
                index = *calls;
                *calls = calls.saturating_add(1);
            }
            self.responses
                .get(index)
                .or_else(|| self.responses.last())
                .copied()
                .flatten()
                .ok_or_else(|| RpcError::InvalidResponse {
                    method: "getLatestBlockhash",
                    message: "scripted failure".to_owned(),
                })
        }
    }

    fn token(byte: u8) -> RecencyToken {
        RecencyToken::new(Hash::new_from_array([byte; 32]), u64::from(byte))
    }

    fn cache(responses: Vec<Option<RecencyToken>>) -> (Arc<ScriptedSource>, BlockhashCache) {
        let source = Arc::new(ScriptedSource {
            responses,
            calls: Mutex::new(0),
        });
        (source.clone(), BlockhashCache::new(source))
    }

    fn calls(source: &ScriptedSource) -> usize {
        source.calls.lock().map(|calls| *calls).unwrap_or_default()
    }

    #[tokio::test]
    async fn get_fetches_once_then_serves_cached_value() {
        let (source, cache) = cache(vec![Some(token(1)), Some(token(2))]);
        assert!(cache.cached().is_none());

        let first = cache.get().await;
        let second = cache.get().await;
        assert_eq!(first.ok(), Some(token(1)));
        assert_eq!(second.ok(), Some(token(1)));
        assert_eq!(calls(&source), 1);
    }

    #[tokio::test]
    async fn refresh_always_replaces_value() {
        let (source, cache) = cache(vec![Some(token(1)), Some(token(2))]);
        assert_eq!(cache.refresh().await.ok(), Some(token(1)));
        assert_eq!(cache.refresh().await.ok(), Some(token(2)));
        assert_eq!(cache.cached(), Some(token(2)));
        assert_eq!(calls(&source), 2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_value() {
        let (_source, cache) = cache(vec![Some(token(3)), None]);
        assert_eq!(cache.refresh().await.ok(), Some(token(3)));
        assert_eq!(cache.refresh().await.ok(), Some(token(3)));
        assert_eq!(cache.cached(), Some(token(3)));
    }

    #[tokio::test]
    async fn failure_without_any_value_is_unavailable() {
        let (source, cache) = cache(vec![None]);
        assert!(matches!(
            cache.get().await,
            Err(BlockhashError::Unavailable { .. })
        ));
        assert!(matches!(
            cache.refresh().await,
            Err(BlockhashError::Unavailable { .. })
        ));
        assert_eq!(calls(&source), 2);
    }

    #[tokio::test]
    async fn static_source_returns_fixed_token() {
        let cache = BlockhashCache::new(Arc::new(StaticBlockhashSource::new(token(9))));
        assert_eq!(cache.get().await.ok(), Some(token(9)));
        assert_eq!(token(9).blockhash_bytes(), [9_u8; 32]);
    }
}
