//! Bluesky feed producer.
//!
//! Polls each configured feed generator (`app.bsky.feed.getFeed`) on a
//! fixed interval and emits every post not seen before as a [`RawEvent`].

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use futures::stream::BoxStream;
use replybot_core::config::FeedConfig;
use replybot_core::error::AppError;
use replybot_core::merge::receiver_stream;
use replybot_core::models::{RawEvent, SourceKind};
use replybot_core::traits::{EventSource, SourceError};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_SEEN_CAPACITY: usize = 10_000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct BlueskyConfig {
    pub feeds: Vec<FeedConfig>,
    pub poll_interval: Duration,
    /// How many post CIDs to remember for skipping repeats across polls.
    pub seen_capacity: usize,
}

impl BlueskyConfig {
    pub fn new(feeds: Vec<FeedConfig>) -> Self {
        Self {
            feeds,
            poll_interval: DEFAULT_POLL_INTERVAL,
            seen_capacity: DEFAULT_SEEN_CAPACITY,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeedResponse {
    #[serde(default)]
    feed: Vec<FeedItem>,
}

#[derive(Debug, Deserialize)]
struct FeedItem {
    post: BlueskyPost,
}

#[derive(Debug, Deserialize)]
struct BlueskyPost {
    uri: String,
    cid: String,
    #[serde(default)]
    author: Author,
    #[serde(default)]
    record: PostRecord,
}

#[derive(Debug, Default, Deserialize)]
struct Author {
    handle: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PostRecord {
    #[serde(default)]
    text: String,
}

/// Last path segment of an `at://` post URI.
pub fn extract_rkey(uri: &str) -> Result<&str, AppError> {
    let segments: Vec<&str> = uri.split('/').collect();
    match segments.as_slice() {
        [.., _, rkey] if !rkey.is_empty() => Ok(*rkey),
        _ => Err(AppError::SourceError(format!(
            "invalid post uri format: {uri:?}"
        ))),
    }
}

/// Public web permalink for a post.
pub fn permalink(handle: &str, uri: &str) -> Result<String, AppError> {
    if handle.trim().is_empty() {
        return Err(AppError::SourceError(format!(
            "author handle missing for {uri}"
        )));
    }
    let rkey = extract_rkey(uri)?;
    Ok(format!("https://bsky.app/profile/{handle}/post/{rkey}"))
}

fn to_event(post: BlueskyPost, feed: &FeedConfig) -> Result<RawEvent, AppError> {
    let handle = post.author.handle.unwrap_or_default();
    let url = permalink(&handle, &post.uri)?;
    Ok(RawEvent::new(SourceKind::Bluesky, post.cid, url, post.record.text)
        .with_feed_category(feed.category))
}

/// Insertion-ordered set that forgets its oldest entry once full.
struct SeenSet {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl SeenSet {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Returns false if `key` was already present.
    fn insert(&mut self, key: &str) -> bool {
        if self.members.contains(key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        self.order.push_back(key.to_string());
        self.members.insert(key.to_string());
        true
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct BlueskySource {
    client: Client,
    config: BlueskyConfig,
}

impl BlueskySource {
    pub fn new(config: BlueskyConfig) -> Result<Self, AppError> {
        if config.poll_interval.is_zero() {
            return Err(AppError::ConfigError(
                "Bluesky poll interval must be greater than zero".into(),
            ));
        }
        let client = Client::builder()
            .user_agent("replybot/0.1")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn fetch_feed(&self, feed: &FeedConfig) -> Result<Vec<BlueskyPost>, AppError> {
        let response = self
            .client
            .get(&feed.source_uri)
            .send()
            .await
            .map_err(|e| AppError::SourceError(format!("fetching feed {}: {e}", feed.label)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::SourceError(format!(
                "HTTP {} for feed {}",
                status.as_u16(),
                feed.label
            )));
        }

        let body: FeedResponse = response.json().await.map_err(|e| {
            AppError::SourceError(format!("decoding feed {}: {e}", feed.label))
        })?;
        Ok(body.feed.into_iter().map(|item| item.post).collect())
    }

    async fn poll(
        self,
        tx: mpsc::Sender<RawEvent>,
        errors: mpsc::Sender<SourceError>,
        cancel: CancellationToken,
    ) {
        let mut seen = SeenSet::new(self.config.seen_capacity);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tracing::debug!(feeds = self.config.feeds.len(), "Polling Bluesky feeds");

            for feed in &self.config.feeds {
                let posts = match self.fetch_feed(feed).await {
                    Ok(posts) => posts,
                    Err(e) => {
                        let _ = errors.send(SourceError::new(SourceKind::Bluesky, e)).await;
                        continue;
                    }
                };

                for post in posts {
                    if !seen.insert(&post.cid) {
                        continue;
                    }
                    match to_event(post, feed) {
                        Ok(event) => {
                            let sent = tokio::select! {
                                () = cancel.cancelled() => return,
                                sent = tx.send(event) => sent,
                            };
                            if sent.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = errors.send(SourceError::new(SourceKind::Bluesky, e)).await;
                        }
                    }
                }
            }
        }

        tracing::info!("Bluesky source stopped");
    }
}

impl EventSource for BlueskySource {
    fn kind(&self) -> SourceKind {
        SourceKind::Bluesky
    }

    fn start(
        self,
        errors: mpsc::Sender<SourceError>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, RawEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(self.poll(tx, errors, cancel));
        receiver_stream(rx)
    }
}
