use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Content type a post is classified into.
///
/// The set is closed: a new category means a new variant plus its rule
/// in the classifier, never a label inferred at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Connections,
    Crossword,
    Wordle,
    Strands,
    Cooking,
    NoMatch,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Connections => "connections",
            Category::Crossword => "crossword",
            Category::Wordle => "wordle",
            Category::Strands => "strands",
            Category::Cooking => "cooking",
            Category::NoMatch => "no_match",
        }
    }

    pub fn is_match(&self) -> bool {
        !matches!(self, Category::NoMatch)
    }

    /// Map a feed label onto a category via the fixed lookup table.
    ///
    /// Labels are case-insensitive. `no_match` is not a valid feed label.
    pub fn from_feed_label(label: &str) -> Result<Self, AppError> {
        match label.trim().to_lowercase().as_str() {
            "connections" => Ok(Category::Connections),
            "crossword" => Ok(Category::Crossword),
            "wordle" => Ok(Category::Wordle),
            "strands" => Ok(Category::Strands),
            "cooking" | "recipes" => Ok(Category::Cooking),
            _ => Err(AppError::ConfigError(format!(
                "Unknown feed label '{label}'"
            ))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "connections" => Ok(Category::Connections),
            "crossword" => Ok(Category::Crossword),
            "wordle" => Ok(Category::Wordle),
            "strands" => Ok(Category::Strands),
            "cooking" => Ok(Category::Cooking),
            "no_match" => Ok(Category::NoMatch),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Which producer an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Bluesky,
    Mastodon,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Bluesky => "bluesky",
            SourceKind::Mastodon => "mastodon",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bluesky" => Ok(SourceKind::Bluesky),
            "mastodon" => Ok(SourceKind::Mastodon),
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}

/// A post as delivered by a producer adapter, already normalized out of
/// the source's native event shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub source: SourceKind,
    /// Stable identifier from the source (CID, status URI, ...).
    pub id: String,
    /// Browser-loadable permalink of the post.
    pub post_uri: String,
    /// Raw markup (Mastodon) or plain text (Bluesky).
    pub content: String,
    /// Category implied by a curated feed's label, if the producer has one.
    pub feed_category: Option<Category>,
}

impl RawEvent {
    pub fn new(
        source: SourceKind,
        id: impl Into<String>,
        post_uri: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            source,
            id: id.into(),
            post_uri: post_uri.into(),
            content: content.into(),
            feed_category: None,
        }
    }

    pub fn with_feed_category(mut self, category: Category) -> Self {
        self.feed_category = Some(category);
        self
    }
}

/// Outcome of following one link through its shortener hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub original_url: String,
    /// Empty when a hop failed.
    pub final_url: String,
    pub hops: u32,
}

impl ResolvedLink {
    pub fn is_resolved(&self) -> bool {
        !self.final_url.is_empty()
    }

    /// The final URL with tracking query parameters removed.
    pub fn clean_url(&self) -> String {
        crate::resolve::strip_trackers(&self.final_url)
    }
}

/// A classified post ready for the sink.
///
/// Immutable once built; construct through [`NormalizedRecord::new`] so the
/// non-empty and non-`NoMatch` invariants always hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedRecord {
    id: String,
    canonical_url: String,
    content: String,
    source: SourceKind,
    category: Category,
}

impl NormalizedRecord {
    pub fn new(
        id: impl Into<String>,
        canonical_url: impl Into<String>,
        content: impl Into<String>,
        source: SourceKind,
        category: Category,
    ) -> Result<Self, AppError> {
        let canonical_url = canonical_url.into();
        let content = content.into();

        if canonical_url.trim().is_empty() {
            return Err(AppError::InvalidRecord("empty canonical URL".into()));
        }
        if content.trim().is_empty() {
            return Err(AppError::InvalidRecord(format!(
                "empty content for {canonical_url}"
            )));
        }
        if !category.is_match() {
            return Err(AppError::InvalidRecord(format!(
                "{canonical_url} has no matching category"
            )));
        }

        Ok(Self {
            id: id.into(),
            canonical_url,
            content,
            source,
            category,
        })
    }

    /// Build a record from an event and the category it was assigned.
    pub fn from_event(event: RawEvent, category: Category) -> Result<Self, AppError> {
        Self::new(
            event.id,
            event.post_uri,
            event.content,
            event.source,
            category,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

/// A record as read back from the database sink.
#[derive(Debug, Clone, Serialize)]
pub struct StoredPost {
    pub id: Uuid,
    pub post_id: String,
    pub url: String,
    pub category: Category,
    pub content: String,
    pub source: SourceKind,
    pub responded: bool,
    pub created_at: DateTime<Utc>,
}
