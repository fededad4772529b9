//! Streaming block-builder tip feed and adaptive tip sizing.

use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{
    amount::{LAMPORTS_PER_SOL, sol_to_lamports_ceil},
    routing::PriorityTier,
};

/// Public block-builder tip distribution stream.
pub const DEFAULT_TIP_STREAM_URL: &str = "ws://bundles-api-rest.jito.wtf/api/v1/bundles/tip_stream";
/// p95 tip assumed before the first stream message, in SOL.
pub const DEFAULT_P95_TIP_SOL: f64 = 0.001;
/// Amount added on top of the sampled p95 to outbid it, in SOL.
pub const DEFAULT_TIP_EPSILON_SOL: f64 = 0.000_01;
/// Smallest tip worth sending.
pub const DEFAULT_TIP_FLOOR_LAMPORTS: u64 = 1_000;
/// Tip ceiling for the high tier, in SOL.
pub const DEFAULT_HIGH_TIER_MAX_TIP_SOL: f64 = 0.001;
/// Tip ceiling for the low tier, in SOL.
pub const DEFAULT_LOW_TIER_MAX_TIP_SOL: f64 = 0.000_1;
/// Delay between stream reconnect attempts.
pub const DEFAULT_TIP_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Latest landed-tip distribution, in SOL.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TipObservation {
    /// 25th percentile.
    #[serde(rename = "landed_tips_25th_percentile")]
    pub p25: f64,
    /// 50th percentile.
    #[serde(rename = "landed_tips_50th_percentile")]
    pub p50: f64,
    /// 75th percentile.
    #[serde(rename = "landed_tips_75th_percentile")]
    pub p75: f64,
    /// 95th percentile.
    #[serde(rename = "landed_tips_95th_percentile")]
    pub p95: f64,
    /// 99th percentile.
    #[serde(rename = "landed_tips_99th_percentile")]
    pub p99: f64,
    /// Exponential moving average of the median.
    #[serde(rename = "ema_landed_tips_50th_percentile")]
    pub ema_p50: f64,
}

/// Tip feed tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct TipConfig {
    /// Websocket URL of the tip stream.
    pub stream_url: String,
    /// Outbid increment in SOL.
    pub epsilon_sol: f64,
    /// Minimum tip in lamports.
    pub floor_lamports: u64,
    /// High-tier ceiling in SOL.
    pub high_tier_max_sol: f64,
    /// Low-tier ceiling in SOL.
    pub low_tier_max_sol: f64,
    /// Delay before reconnecting a dropped stream.
    pub reconnect_delay: Duration,
}

impl Default for TipConfig {
    fn default() -> Self {
        Self {
            stream_url: DEFAULT_TIP_STREAM_URL.to_owned(),
            epsilon_sol: DEFAULT_TIP_EPSILON_SOL,
            floor_lamports: DEFAULT_TIP_FLOOR_LAMPORTS,
            high_tier_max_sol: DEFAULT_HIGH_TIER_MAX_TIP_SOL,
            low_tier_max_sol: DEFAULT_LOW_TIER_MAX_TIP_SOL,
            reconnect_delay: DEFAULT_TIP_RECONNECT_DELAY,
        }
    }
}

impl TipConfig {
    /// Returns the tip ceiling in SOL for `tier`.
    #[must_use]
    pub const fn max_tip_sol(&self, tier: PriorityTier) -> f64 {
        match tier {
            PriorityTier::Low => self.low_tier_max_sol,
            PriorityTier::High => self.high_tier_max_sol,
        }
    }
}

/// Decodes one stream message; the first array element is the current distribution.
pub(crate) fn parse_tip_message(text: &str) -> Result<Option<TipObservation>, serde_json::Error> {
    let batch: Vec<TipObservation> = serde_json::from_str(text)?;
    Ok(batch.into_iter().next())
}

/// Long-lived tip stream subscription with an explicit start/stop lifecycle.
///
/// Every inbound message replaces the whole observation; no history is kept.
pub struct TipFeed {
    /// Tuning.
    config: TipConfig,
    /// Last observation, shared with the stream task.
    latest: Arc<RwLock<Option<TipObservation>>>,
    /// Running stream task.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TipFeed {
    /// Creates a stopped feed.
    #[must_use]
    pub fn new(config: TipConfig) -> Self {
        Self {
            config,
            latest: Arc::new(RwLock::new(None)),
            worker: Mutex::new(None),
        }
    }

    /// Returns the feed tuning.
    #[must_use]
    pub const fn config(&self) -> &TipConfig {
        &self.config
    }

    /// Spawns the stream task on the current tokio runtime. Calling it while running is a no-op.
    ///
    /// Outside a tokio runtime nothing is spawned and the feed stays stopped.
    pub fn start(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime; tip stream not started");
            return;
        };
        let Ok(mut worker) = self.worker.lock() else {
            tracing::warn!("tip feed worker lock poisoned; not starting stream");
            return;
        };
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let url = self.config.stream_url.clone();
        let reconnect_delay = self.config.reconnect_delay;
        let latest = Arc::clone(&self.latest);
        tracing::info!(url = %url, "starting tip stream");
        *worker = Some(runtime.spawn(async move {
            run_tip_stream(url, latest, reconnect_delay).await;
        }));
    }

    /// Aborts the stream task. The last observation stays readable.
    pub fn stop(&self) {
        if let Ok(mut worker) = self.worker.lock()
            && let Some(handle) = worker.take()
        {
            handle.abort();
            tracing::info!("stopped tip stream");
        }
    }

    /// Returns true while the stream task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .ok()
            .is_some_and(|worker| worker.as_ref().is_some_and(|handle| !handle.is_finished()))
    }

    /// Replaces the current observation.
    pub fn observe(&self, observation: TipObservation) {
        store_observation(&self.latest, observation);
    }

    /// Returns the last observation, if any arrived.
    #[must_use]
    pub fn latest(&self) -> Option<TipObservation> {
        self.latest.read().ok().and_then(|guard| *guard)
    }

    /// Returns the latest p95 tip in SOL, or the default before any message.
    #[must_use]
    pub fn current_p95(&self) -> f64 {
        self.latest()
            .map_or(DEFAULT_P95_TIP_SOL, |observation| observation.p95)
    }

    /// Returns `min(max(p95 + epsilon, floor), max_tip_sol)` in SOL.
    #[must_use]
    pub fn tip_amount(&self, max_tip_sol: f64) -> f64 {
        let floor_sol = self.config.floor_lamports as f64 / LAMPORTS_PER_SOL as f64;
        (self.current_p95() + self.config.epsilon_sol)
            .max(floor_sol)
            .min(max_tip_sol)
    }

    /// Returns the tip for `tier` in lamports, rounded up.
    #[must_use]
    pub fn tip_lamports(&self, tier: PriorityTier) -> u64 {
        sol_to_lamports_ceil(self.tip_amount(self.config.max_tip_sol(tier)))
    }
}

impl Drop for TipFeed {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Writes one observation into the shared slot.
fn store_observation(latest: &RwLock<Option<TipObservation>>, observation: TipObservation) {
    if let Ok(mut guard) = latest.write() {
        *guard = Some(observation);
    }
}

/// Connects, reads until the stream drops, waits, and reconnects forever.
async fn run_tip_stream(
    url: String,
    latest: Arc<RwLock<Option<TipObservation>>>,
    reconnect_delay: Duration,
) {
    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _response)) => {
                tracing::info!(url = %url, "tip stream connected");
                read_tip_messages(stream, &latest).await;
            }
            Err(error) => {
                tracing::warn!(url = %url, error = %error, "failed to connect tip stream");
            }
        }
        tracing::debug!(
            url = %url,
            delay_ms = reconnect_delay.as_millis(),
            "reconnecting tip stream"
        );
        tokio::time::sleep(reconnect_delay).await;
    }
}

/// Applies one text payload to the shared observation.
fn ingest_payload(latest: &RwLock<Option<TipObservation>>, payload: &str) {
    match parse_tip_message(payload) {
        Ok(Some(observation)) => {
            tracing::debug!(p95 = observation.p95, "tip observation updated");
            store_observation(latest, observation);
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(error = %error, "ignoring malformed tip stream message");
        }
    }
}

/// Reads stream frames until the connection ends.
async fn read_tip_messages(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    latest: &RwLock<Option<TipObservation>>,
) {
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => ingest_payload(latest, text.as_str()),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(bytes.as_ref()) {
                Ok(text) => ingest_payload(latest, text),
                Err(error) => {
                    tracing::warn!(error = %error, "ignoring non-utf8 tip stream frame");
                }
            },
            Some(Ok(Message::Ping(payload))) => {
                if let Err(error) = stream.send(Message::Pong(payload)).await {
                    tracing::warn!(error = %error, "failed to answer tip stream ping");
                    break;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::warn!(
                    close_code = frame.as_ref().map(|frame| u16::from(frame.code)),
                    close_reason = frame
                        .as_ref()
                        .map(|frame| frame.reason.to_string())
                        .unwrap_or_default(),
                    "tip stream closed by remote peer"
                );
                break;
            }
            Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
            Some(Err(error)) => {
                tracing::warn!(error = %error, "tip stream read loop terminated");
                break;
            }
            None => {
                tracing::warn!("tip stream ended");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn observation(p95: f64) -> TipObservation {
        TipObservation {
            p25: p95 / 8.0,
            p50: p95 / 4.0,
            p75: p95 / 2.0,
            p95,
            p99: p95 * 2.0,
            ema_p50: p95 / 4.0,
        }
    }

    fn stream_payload(p95: f64) -> String {
        format!(
            "[{{\"time\":\"2024-01-01T00:00:00Z\",\
             \"landed_tips_25th_percentile\":0.000001,\
             \"landed_tips_50th_percentile\":0.00001,\
             \"landed_tips_75th_percentile\":0.0001,\
             \"landed_tips_95th_percentile\":{p95},\
             \"landed_tips_99th_percentile\":0.01,\
             \"ema_landed_tips_50th_percentile\":0.00002}}]"
        )
    }

    #[test]
    fn stream_message_decodes_first_element() {
        let parsed = parse_tip_message(&stream_payload(0.0005));
        assert!(parsed.is_ok());
        if let Ok(Some(parsed)) = parsed {
            assert!((parsed.p95 - 0.0005).abs() < f64::EPSILON);
            assert!((parsed.p99 - 0.01).abs() < f64::EPSILON);
            assert!((parsed.ema_p50 - 0.00002).abs() < f64::EPSILON);
        }
        assert!(matches!(parse_tip_message("[]"), Ok(None)));
        assert!(parse_tip_message("{\"landed\":1}").is_err());
    }

    #[test]
    fn malformed_message_keeps_previous_observation() {
        let feed = TipFeed::new(TipConfig::default());
        feed.observe(observation(0.0004));
        ingest_payload(&feed.latest, "not json");
        assert_eq!(feed.latest(), Some(observation(0.0004)));
        ingest_payload(&feed.latest, &stream_payload(0.0002));
        assert!((feed.current_p95() - 0.0002).abs() < f64::EPSILON);
    }

    #[test]
    fn default_p95_applies_before_first_message() {
        let feed = TipFeed::new(TipConfig::default());
        assert!(feed.latest().is_none());
        assert!((feed.current_p95() - DEFAULT_P95_TIP_SOL).abs() < f64::EPSILON);
        assert_eq!(feed.tip_lamports(PriorityTier::High), 1_000_000);
        assert_eq!(feed.tip_lamports(PriorityTier::Low), 100_000);
    }

    #[test]
    fn tip_sizing_outbids_p95_within_bounds() {
        let feed = TipFeed::new(TipConfig::default());

        feed.observe(observation(0.0002));
        assert_eq!(feed.tip_lamports(PriorityTier::High), 210_000);
        assert_eq!(feed.tip_lamports(PriorityTier::Low), 100_000);

        feed.observe(observation(0.0));
        assert_eq!(feed.tip_lamports(PriorityTier::High), 10_000);

        let floored = TipFeed::new(TipConfig {
            epsilon_sol: 0.0,
            ..TipConfig::default()
        });
        floored.observe(observation(0.0));
        assert_eq!(
            floored.tip_lamports(PriorityTier::High),
            DEFAULT_TIP_FLOOR_LAMPORTS
        );

        feed.observe(observation(0.5));
        assert_eq!(feed.tip_lamports(PriorityTier::High), 1_000_000);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_aborts() {
        let feed = TipFeed::new(TipConfig {
            stream_url: "ws://127.0.0.1:9".to_owned(),
            reconnect_delay: Duration::from_secs(60),
            ..TipConfig::default()
        });
        assert!(!feed.is_running());
        feed.start();
        assert!(feed.is_running());
        feed.start();
        assert!(feed.is_running());
        feed.stop();
        assert!(!feed.is_running());
    }

    #[test]
    fn start_without_runtime_leaves_feed_stopped() {
        let feed = TipFeed::new(TipConfig {
            stream_url: "ws://127.0.0.1:9".to_owned(),
            ..TipConfig::default()
        });
        feed.start();
        assert!(!feed.is_running());
        assert_eq!(feed.tip_lamports(PriorityTier::Low), 100_000);
    }

    #[tokio::test]
    #[ignore = "requires local socket bind/connect permissions"]
    async fn stream_updates_observation_and_reconnects() {
        let server = TcpListener::bind("127.0.0.1:0").await.expect("bind ws server");
        let addr = server.local_addr().expect("ws local addr");
        let server_task = tokio::spawn(async move {
            for p95 in [0.0003, 0.0006] {
                if let Ok((stream, _)) = server.accept().await
                    && let Ok(mut websocket) = tokio_tungstenite::accept_async(stream).await
                {
                    let _ = websocket
                        .send(Message::Text(stream_payload(p95).into()))
                        .await;
                    let _ = websocket.close(None).await;
                }
            }
        });

        let feed = TipFeed::new(TipConfig {
            stream_url: format!("ws://{addr}"),
            reconnect_delay: Duration::from_millis(50),
            ..TipConfig::default()
        });
        feed.start();

        let mut reached = false;
        for _ in 0..100 {
            if feed
                .latest()
                .is_some_and(|observation| (observation.p95 - 0.0006).abs() < f64::EPSILON)
            {
                reached = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        feed.stop();
        server_task.abort();
        assert!(reached);
    }
}
