//! URL normalization and crawl scope filtering
//!
//! Discovered links go through two steps before reaching the frontier:
//! - normalization (absolute, fragment stripped, default port removed, host lowercased)
//! - scope check (scheme, domain, include/exclude patterns)

use regex::Regex;
use std::collections::HashSet;
use url::Url;

use crate::models::CrawlConfig;

/// Normalize a possibly relative link against its page URL
///
/// Returns `None` for links that cannot be fetched (`mailto:`, `javascript:`,
/// unparseable input, non-http schemes).
///
/// # Examples
///
/// ```
/// use siphon::crawler::url::normalize_url;
///
/// let url = normalize_url("/docs/#intro", "https://Example.com:443/index.html").unwrap();
/// assert_eq!(url, "https://example.com/docs/");
/// ```
pub fn normalize_url(link: &str, base: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() || link.starts_with('#') {
        return None;
    }

    let mut parsed = match Url::parse(link) {
        Ok(u) => u,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(link).ok()?,
        Err(_) => return None,
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    parsed.host_str()?;

    // Host lowercasing and default-port elision happen in `Url::parse`
    parsed.set_fragment(None);
    if parsed.query() == Some("") {
        parsed.set_query(None);
    }

    Some(parsed.to_string())
}

/// Compiled crawl scope for one job
#[derive(Debug, Clone)]
pub struct UrlScope {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    seed_domains: HashSet<String>,
    follow_external_links: bool,
}

impl UrlScope {
    /// Build a scope from crawl configuration and the job's seed URLs
    ///
    /// Patterns are validated at submission; any that still fail to compile
    /// are skipped.
    pub fn new(config: &CrawlConfig, seeds: &[String]) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p, error = %e, "Skipping invalid URL pattern");
                        None
                    }
                })
                .collect()
        };

        Self {
            include: compile(&config.url_patterns.include),
            exclude: compile(&config.url_patterns.exclude),
            seed_domains: seeds
                .iter()
                .filter_map(|s| crate::utils::extract_domain(s))
                .collect(),
            follow_external_links: config.follow_external_links,
        }
    }

    /// Whether a normalized URL may be enqueued
    pub fn allows(&self, url: &str) -> bool {
        let Some(domain) = crate::utils::extract_domain(url) else {
            return false;
        };

        if !self.follow_external_links && !self.seed_domains.contains(&domain) {
            return false;
        }

        if self.exclude.iter().any(|re| re.is_match(url)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|re| re.is_match(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UrlPatterns;

    fn scope(include: &[&str], exclude: &[&str], external: bool) -> UrlScope {
        let config = CrawlConfig {
            url_patterns: UrlPatterns {
                include: include.iter().map(|s| s.to_string()).collect(),
                exclude: exclude.iter().map(|s| s.to_string()).collect(),
            },
            follow_external_links: external,
            ..Default::default()
        };
        UrlScope::new(&config, &["https://example.com/".to_string()])
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(
            normalize_url("page2.html", "https://example.com/dir/page1.html").as_deref(),
            Some("https://example.com/dir/page2.html")
        );
        assert_eq!(
            normalize_url("/about", "https://example.com/dir/").as_deref(),
            Some("https://example.com/about")
        );
    }

    #[test]
    fn test_normalize_strips_fragment_and_port() {
        assert_eq!(
            normalize_url("HTTPS://EXAMPLE.com:443/a#section", "https://example.com/").as_deref(),
            Some("https://example.com/a")
        );
        assert_eq!(
            normalize_url("http://example.com:8080/a", "https://example.com/").as_deref(),
            Some("http://example.com:8080/a")
        );
    }

    #[test]
    fn test_normalize_rejects_unfetchable() {
        assert!(normalize_url("mailto:someone@example.com", "https://example.com/").is_none());
        assert!(normalize_url("javascript:void(0)", "https://example.com/").is_none());
        assert!(normalize_url("#top", "https://example.com/").is_none());
        assert!(normalize_url("", "https://example.com/").is_none());
    }

    #[test]
    fn test_scope_internal_only() {
        let scope = scope(&[], &[], false);
        assert!(scope.allows("https://example.com/a"));
        assert!(!scope.allows("https://other.org/a"));
    }

    #[test]
    fn test_scope_follow_external() {
        let scope = scope(&[], &[], true);
        assert!(scope.allows("https://other.org/a"));
        assert!(scope.allows("https://example.com/a"));
    }

    #[test]
    fn test_scope_patterns() {
        let scope = scope(&["/blog/"], &["/blog/drafts/"], false);
        assert!(scope.allows("https://example.com/blog/post-1"));
        assert!(!scope.allows("https://example.com/shop/item"));
        assert!(!scope.allows("https://example.com/blog/drafts/wip"));
    }
}
