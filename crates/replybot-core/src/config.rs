use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::Category;

/// Hosts known to redirect to a different final destination.
///
/// Several of these chain into each other (xyz -> trib.al -> real URL),
/// which is why resolution loops instead of probing once.
pub const DEFAULT_SHORTENERS: &[&str] = &[
    "aje.io",
    "amzn.to",
    "api.follow.it",
    "bbc.in",
    "bit.ly",
    "buff.ly",
    "cnet.co",
    "cnn.it",
    "d.pr",
    "dlvr.it",
    "engt.co",
    "flic.kr",
    "goo.gl",
    "ift.tt",
    "is.gd",
    "j.mp",
    "lat.ms",
    "nbcnews.to",
    "npi.li",
    "nyer.cm",
    "nyti.ms",
    "on.ft.com",
    "on.msnbc.com",
    "on.natgeo.com",
    "on.soundcloud.com",
    "on.substack.co",
    "on.wsj.com",
    "ow.ly",
    "pst.cr",
    "redd.it",
    "reut.rs",
    "shar.es",
    "spoti.fi",
    "st.news",
    "t.co",
    "t.ly",
    "tcrn.ch",
    "ti.me",
    "tiny.cc",
    "tinyurl.com",
    "trib.al",
    "w.wiki",
    "wapo.st",
    "youtu.be",
];

pub const DEFAULT_PUBLISHER_DOMAIN: &str = "cooking.nytimes.com";
pub const DEFAULT_MAX_HOPS: u32 = 4;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the link resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Upper bound on probes per link, reached or not.
    pub max_hops: u32,
    /// Lowercase hosts that get probed.
    pub shorteners: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_hops: DEFAULT_MAX_HOPS,
            shorteners: DEFAULT_SHORTENERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ResolverConfig {
    pub fn with_max_hops(mut self, max_hops: u32) -> Self {
        self.max_hops = max_hops;
        self
    }

    pub fn with_shorteners<I, S>(mut self, shorteners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shorteners = shorteners
            .into_iter()
            .map(|s| s.into().to_lowercase())
            .collect();
        self
    }
}

/// Configuration for the classifier.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// A resolved link under this host means [`Category::Cooking`].
    pub publisher_domain: String,
    pub resolver: ResolverConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            publisher_domain: DEFAULT_PUBLISHER_DOMAIN.to_string(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl ClassifierConfig {
    pub fn with_publisher_domain(mut self, domain: impl Into<String>) -> Self {
        self.publisher_domain = domain.into().trim().to_lowercase();
        self
    }

    pub fn with_resolver(mut self, resolver: ResolverConfig) -> Self {
        self.resolver = resolver;
        self
    }
}

/// Configuration for the whole pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound of the writer queue; a full queue stalls the coordinator.
    pub queue_capacity: usize,
    /// Bound of the merged event channel.
    pub merge_capacity: usize,
    pub classifier: ClassifierConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            merge_capacity: 256,
            classifier: ClassifierConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_merge_capacity(mut self, capacity: usize) -> Self {
        self.merge_capacity = capacity;
        self
    }

    pub fn with_classifier(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    /// Reject values the channels cannot work with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.queue_capacity == 0 {
            return Err(AppError::ConfigError(
                "queue capacity must be at least 1".into(),
            ));
        }
        if self.merge_capacity == 0 {
            return Err(AppError::ConfigError(
                "merge capacity must be at least 1".into(),
            ));
        }
        if self.classifier.publisher_domain.is_empty() {
            return Err(AppError::ConfigError("publisher domain is empty".into()));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct FeedEntry {
    #[serde(rename = "Label")]
    label: String,
    #[serde(rename = "UiUri", default)]
    ui_uri: Option<String>,
    #[serde(rename = "MachineUri")]
    machine_uri: String,
}

/// One curated feed, with its label already mapped onto a category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub label: String,
    pub category: Category,
    /// Human-facing page for the feed, if known.
    pub ui_uri: Option<String>,
    /// Endpoint the producer polls.
    pub source_uri: String,
}

impl FeedConfig {
    /// Parse a JSON feed list: `[{"Label": .., "UiUri": .., "MachineUri": ..}]`.
    pub fn parse_list(raw: &str) -> Result<Vec<FeedConfig>, AppError> {
        let entries: Vec<FeedEntry> = serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Malformed feed list: {e}")))?;

        entries
            .into_iter()
            .map(|entry| {
                if entry.machine_uri.trim().is_empty() {
                    return Err(AppError::ConfigError(format!(
                        "Feed '{}' has no MachineUri",
                        entry.label
                    )));
                }
                Ok(FeedConfig {
                    category: Category::from_feed_label(&entry.label)?,
                    label: entry.label,
                    ui_uri: entry.ui_uri,
                    source_uri: entry.machine_uri,
                })
            })
            .collect()
    }

    /// Load and validate the feed list file.
    pub fn load(path: &Path) -> Result<Vec<FeedConfig>, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read feed list {}: {e}", path.display()))
        })?;
        Self::parse_list(&raw)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.classifier.resolver.max_hops, 4);
        assert_eq!(config.classifier.publisher_domain, "cooking.nytimes.com");
        assert!(
            config
                .classifier
                .resolver
                .shorteners
                .iter()
                .any(|s| s == "bit.ly")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = PipelineConfig::default().with_queue_capacity(0);
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_shorteners_are_lowercased() {
        let config = ResolverConfig::default().with_shorteners(["Bit.LY"]);
        assert_eq!(config.shorteners, vec!["bit.ly".to_string()]);
    }

    #[test]
    fn test_parse_feed_list() {
        let raw = r#"[
            {"Label": "Wordle", "UiUri": "https://bsky.app/profile/x/feed/wordle", "MachineUri": "https://public.api.bsky.app/xrpc/app.bsky.feed.getFeed?feed=a"},
            {"Label": "cooking", "MachineUri": "https://public.api.bsky.app/xrpc/app.bsky.feed.getFeed?feed=b"}
        ]"#;
        let feeds = FeedConfig::parse_list(raw).unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].category, Category::Wordle);
        assert_eq!(feeds[1].category, Category::Cooking);
        assert!(feeds[1].ui_uri.is_none());
    }

    #[test]
    fn test_unknown_label_is_config_error() {
        let raw = r#"[{"Label": "Sports", "MachineUri": "https://example.com/feed"}]"#;
        let err = FeedConfig::parse_list(raw).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("Sports"));
    }

    #[test]
    fn test_malformed_feed_list() {
        assert!(matches!(
            FeedConfig::parse_list("{not json"),
            Err(AppError::ConfigError(_))
        ));
        assert!(matches!(
            FeedConfig::parse_list(r#"[{"Label": "wordle", "MachineUri": " "}]"#),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn test_load_feed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"Label": "Strands", "MachineUri": "https://example.com/strands"}}]"#
        )
        .unwrap();

        let feeds = FeedConfig::load(file.path()).unwrap();
        assert_eq!(feeds[0].category, Category::Strands);
        assert_eq!(feeds[0].source_uri, "https://example.com/strands");
    }

    #[test]
    fn test_load_missing_file() {
        let err = FeedConfig::load(Path::new("/nonexistent/feeds.json")).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
