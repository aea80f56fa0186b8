pub mod bluesky;
pub mod extractor;
pub mod mastodon;
pub mod prober;

#[cfg(test)]
mod test_server;

pub use bluesky::{BlueskyConfig, BlueskySource};
pub use extractor::ScraperLinkExtractor;
pub use mastodon::{MastodonConfig, MastodonSource, SseDecoder, StreamingEvent};
pub use prober::ReqwestProber;
