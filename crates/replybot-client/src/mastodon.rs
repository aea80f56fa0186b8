//! Mastodon public-timeline producer over server-sent events.
//!
//! `GET {server}/api/v1/streaming/public` yields frames such as
//!
//! ```text
//! event: update
//! data: {"id":"1","uri":"https://...","url":"https://...","content":"<p>..</p>"}
//!
//! :thump
//! ```
//!
//! Frames are decoded into [`StreamingEvent`] first; only new and edited
//! statuses become [`RawEvent`]s.

use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use replybot_core::error::AppError;
use replybot_core::merge::receiver_stream;
use replybot_core::models::{RawEvent, SourceKind};
use replybot_core::traits::{EventSource, SourceError};
use reqwest::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct MastodonConfig {
    /// Base URL of the instance, e.g. `https://mastodon.social`.
    pub server: String,
    pub access_token: String,
}

impl MastodonConfig {
    pub fn new(server: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            access_token: access_token.into(),
        }
    }

    pub fn streaming_url(&self) -> String {
        format!(
            "{}/api/v1/streaming/public",
            self.server.trim_end_matches('/')
        )
    }
}

// ---------------------------------------------------------------------------
// SSE decoding
// ---------------------------------------------------------------------------

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
}

/// Incremental line decoder for `text/event-stream` bodies.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; partial lines
/// are buffered until their newline arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => self.event = Some(value.to_string()),
                "data" => self.data.push(value.to_string()),
                _ => {}
            }
        }

        frames
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

// ---------------------------------------------------------------------------
// Streaming events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Status {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl Status {
    /// Web URL when the server provides one, otherwise the ActivityPub uri.
    pub fn permalink(&self) -> &str {
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.uri)
    }

    pub fn into_event(self) -> RawEvent {
        let post_uri = self.permalink().to_string();
        RawEvent::new(SourceKind::Mastodon, self.uri, post_uri, self.content)
    }
}

/// Native shape of a Mastodon streaming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamingEvent {
    Update(Box<Status>),
    StatusUpdate(Box<Status>),
    Delete(String),
    Other(String),
}

impl StreamingEvent {
    pub fn from_frame(frame: &SseFrame) -> Result<Self, AppError> {
        match frame.event.as_str() {
            "update" => Ok(StreamingEvent::Update(Box::new(serde_json::from_str(
                &frame.data,
            )?))),
            "status.update" => Ok(StreamingEvent::StatusUpdate(Box::new(
                serde_json::from_str(&frame.data)?,
            ))),
            "delete" => Ok(StreamingEvent::Delete(frame.data.clone())),
            other => Ok(StreamingEvent::Other(other.to_string())),
        }
    }

    /// The status carried by this frame, if it is one we ingest.
    pub fn into_status(self) -> Option<Status> {
        match self {
            StreamingEvent::Update(status) | StreamingEvent::StatusUpdate(status) => Some(*status),
            StreamingEvent::Delete(_) | StreamingEvent::Other(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

pub struct MastodonSource {
    client: Client,
    config: MastodonConfig,
}

impl MastodonSource {
    pub fn new(config: MastodonConfig) -> Result<Self, AppError> {
        if config.server.trim().is_empty() {
            return Err(AppError::ConfigError("Mastodon server is empty".into()));
        }
        let client = Client::builder()
            .user_agent("replybot/0.1")
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self { client, config })
    }

    async fn stream(
        self,
        tx: mpsc::Sender<RawEvent>,
        errors: mpsc::Sender<SourceError>,
        cancel: CancellationToken,
    ) {
        let report = |e: AppError| {
            let errors = errors.clone();
            async move {
                let _ = errors.send(SourceError::new(SourceKind::Mastodon, e)).await;
            }
        };

        let url = self.config.streaming_url();
        tracing::info!(%url, "Connecting to Mastodon streaming API");

        let request = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .header(ACCEPT, "text/event-stream")
            .send();
        let response = tokio::select! {
            () = cancel.cancelled() => return,
            response = request => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                report(AppError::SourceError(format!("connecting to {url}: {e}"))).await;
                return;
            }
        };
        let status = response.status();
        if !status.is_success() {
            report(AppError::SourceError(format!(
                "HTTP {} from streaming API",
                status.as_u16()
            )))
            .await;
            return;
        }

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => break,
                chunk = body.next() => chunk,
            };

            let bytes = match chunk {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    report(AppError::SourceError(format!("stream read failed: {e}"))).await;
                    break;
                }
                None => {
                    report(AppError::SourceError("stream closed by server".into())).await;
                    break;
                }
            };

            for frame in decoder.push(&bytes) {
                let status = match StreamingEvent::from_frame(&frame) {
                    Ok(event) => event.into_status(),
                    Err(e) => {
                        report(e).await;
                        continue;
                    }
                };
                let Some(status) = status else {
                    tracing::trace!(event = %frame.event, "Ignoring streaming frame");
                    continue;
                };
                if tx.send(status.into_event()).await.is_err() {
                    return;
                }
            }
        }

        tracing::info!("Mastodon source stopped");
    }
}

impl EventSource for MastodonSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Mastodon
    }

    fn start(
        self,
        errors: mpsc::Sender<SourceError>,
        cancel: CancellationToken,
    ) -> BoxStream<'static, RawEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(self.stream(tx, errors, cancel));
        receiver_stream(rx)
    }
}
