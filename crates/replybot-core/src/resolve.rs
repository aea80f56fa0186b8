//! Link resolution through URL shorteners.
//!
//! A link is only probed while its host is a known shortener, and never
//! more than `max_hops` times, so redirect loops terminate. Any probe
//! failure makes the link unresolved (empty final URL); nothing here
//! returns an error or retries.
//!
//! Resolved links can be tidied with [`strip_trackers`], which drops
//! campaign and referral query parameters.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::ResolverConfig;
use crate::models::ResolvedLink;
use crate::traits::LinkProber;

/// Follows shortened links to their destination.
#[derive(Clone)]
pub struct LinkResolver<P: LinkProber> {
    prober: P,
    config: ResolverConfig,
}

impl<P: LinkProber> LinkResolver<P> {
    pub fn new(prober: P) -> Self {
        Self::with_config(prober, ResolverConfig::default())
    }

    pub fn with_config(prober: P, config: ResolverConfig) -> Self {
        Self { prober, config }
    }

    /// Resolve `url` and return only the final URL (empty if unresolvable).
    pub async fn resolve(&self, url: &str) -> String {
        self.resolve_link(url).await.final_url
    }

    /// Resolve `url`, keeping track of how many hops were taken.
    pub async fn resolve_link(&self, url: &str) -> ResolvedLink {
        let mut current = url.to_string();
        let mut hops = 0;

        while hops < self.config.max_hops && self.is_shortener(&current) {
            hops += 1;
            match self.prober.probe(&current).await {
                Ok(next) => {
                    tracing::debug!(from = %current, to = %next, hop = hops, "Unfurled link");
                    current = next;
                }
                Err(e) => {
                    tracing::debug!(url = %current, error = %e, "Link unresolvable");
                    current = String::new();
                    break;
                }
            }
        }

        ResolvedLink {
            original_url: url.to_string(),
            final_url: current,
            hops,
        }
    }

    /// Whether the URL's host is on the shortener list.
    ///
    /// Matches the whole host (ignoring a leading `www.`), so `i.redd.it`
    /// is not mistaken for `redd.it`.
    pub fn is_shortener(&self, url: &str) -> bool {
        match host_of(url) {
            Some(host) => {
                let host = host.strip_prefix("www.").unwrap_or(&host);
                self.config.shorteners.iter().any(|s| s == host)
            }
            None => false,
        }
    }
}

/// Lowercase host of a URL, or `None` if it does not parse or has no host.
pub fn host_of(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    Url::parse(trimmed)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

static TRACKER_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:at|utm)_(?:bbc_team|brand|campaign|content|format|link_id|link_origin|link_type|medium|name|placement|ptr_name|social-type|source|term)|ab_channel|campaign|cid|cmp|feature|ftag|giftCopy|fbclid|guc|hsenc|hsmi|itid|leadsource|mbid|mkt_tok|mod|origin|partner|pwapi_token|ref|searchResultPosition|smid|smtyp|source|st|taid|tpcc|unlocked_article_code|url|xtor)$",
    )
    .expect("tracker pattern must compile")
});

/// Whether a query parameter name is a known tracking parameter.
pub fn is_tracker_param(name: &str) -> bool {
    TRACKER_PARAM.is_match(name)
}

/// Remove tracking query parameters from `url`.
///
/// The query is dropped entirely when nothing else is left. Input that does
/// not parse as a URL (including the empty unresolved link) is returned as is.
pub fn strip_trackers(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url.trim()) else {
        return url.to_string();
    };
    if parsed.query().is_none() {
        return parsed.to_string();
    }

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(name, _)| !is_tracker_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(&kept);
    }
    parsed.to_string()
}

/// Whether `url` points at a site's front page (no path, no query).
pub fn is_front_page(url: &str) -> bool {
    Url::parse(url.trim())
        .is_ok_and(|u| matches!(u.path(), "" | "/") && u.query().is_none())
}

/// Whether `host` is `domain` or one of its subdomains.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.');
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}
