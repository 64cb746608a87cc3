use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::models::{epoch_to_utc, FeedPositions, PositionSnapshot};
use crate::mta::index::FeedIndex;
use crate::mta::proto::{decode_feed, FeedMessage};
use crate::mta::reconcile::reconcile;

/// Upper bound on a single feed body. MTA feeds are a few hundred KB.
const MAX_FEED_BYTES: usize = 16 * 1024 * 1024;

/// Minimum interval between logging the same error source.
const ERROR_LOG_INTERVAL_SECS: u64 = 300;

/// Errors raised while obtaining a feed. The reconciliation core never sees these.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("feed too large: {0} bytes")]
    TooLarge(usize),
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Anything that can hand over the next decoded snapshot of a feed.
pub trait FeedSource: Clone + Send + Sync + 'static {
    fn fetch_feed(&self, url: &str)
        -> impl Future<Output = Result<FeedMessage, FetchError>> + Send;
}

/// MTA GTFS-RT client over a pooled reqwest connection.
#[derive(Clone)]
pub struct MtaClient {
    http: Client,
}

impl MtaClient {
    pub fn new() -> Result<Self, FetchError> {
        let http = Client::builder()
            .user_agent("NYC-SubwayTracker-Rust/1.0")
            .gzip(true)
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(12))
            .build()?;
        Ok(MtaClient { http })
    }
}

impl FeedSource for MtaClient {
    async fn fetch_feed(&self, url: &str) -> Result<FeedMessage, FetchError> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_FEED_BYTES {
            return Err(FetchError::TooLarge(bytes.len()));
        }

        decode_feed(bytes.as_ref())
    }
}

/// Index and reconcile one decoded feed.
pub fn positions_from_feed(feed: &FeedMessage) -> FeedPositions {
    let index = FeedIndex::build(feed);
    if index.is_empty() {
        debug!("Feed carries no vehicle positions or trip updates");
    }
    let positions = reconcile(&index);
    FeedPositions {
        positions,
        feed_timestamp: feed
            .header
            .timestamp
            .and_then(|ts| i64::try_from(ts).ok())
            .and_then(epoch_to_utc),
    }
}

/// Fetches every configured feed in parallel and folds the results into
/// successive snapshots. A feed that fails keeps its previous positions.
pub struct FeedPoller<S> {
    source: S,
    last_error_log: HashMap<String, Instant>,
}

impl<S: FeedSource> FeedPoller<S> {
    pub fn new(source: S) -> Self {
        FeedPoller {
            source,
            last_error_log: HashMap::new(),
        }
    }

    /// Build the next snapshot from `previous` by refetching `feed_urls`.
    ///
    /// Feeds no longer listed in `feed_urls` are dropped. Returns the new
    /// snapshot and whether at least one feed was fetched successfully.
    pub async fn poll(
        &mut self,
        feed_urls: &[String],
        previous: &PositionSnapshot,
    ) -> (PositionSnapshot, bool) {
        let mut join_set = JoinSet::new();

        for url in feed_urls {
            let source = self.source.clone();
            let url = url.clone();
            join_set.spawn(async move {
                let result = source.fetch_feed(&url).await;
                (url, result.map(|feed| positions_from_feed(&feed)))
            });
        }

        let mut feeds = HashMap::new();
        let mut any_success = false;

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((url, Ok(positions))) => {
                    debug!("Feed {} returned {} trains", url, positions.positions.len());
                    any_success = true;
                    feeds.insert(url, positions);
                }
                Ok((url, Err(e))) => {
                    self.log_error(&url, &format!("Error fetching {}: {}", url, e));
                    if let Some(cached) = previous.feeds.get(&url) {
                        feeds.insert(url, cached.clone());
                    }
                }
                Err(e) => {
                    warn!("[FETCH] Feed task panicked: {}", e);
                }
            }
        }

        let fetched_at = if any_success {
            Some(chrono::Utc::now())
        } else {
            previous.fetched_at
        };

        (PositionSnapshot { feeds, fetched_at }, any_success)
    }

    fn log_error(&mut self, source: &str, msg: &str) {
        let should_log = match self.last_error_log.get(source) {
            Some(last) => last.elapsed().as_secs() >= ERROR_LOG_INTERVAL_SECS,
            None => true,
        };
        if should_log {
            warn!("[FETCH] {}", msg);
            self.last_error_log.insert(source.to_string(), Instant::now());
        }
    }
}
