//! Bounded breadth-first crawl frontier
//!
//! Holds the pending queue and visited set for one crawl job. The frontier is
//! owned by a single job and never shared, so it needs no synchronization.
//!
//! Invariants held after every mutation:
//! - a URL is never both visited and pending
//! - every pending URL has `depth <= max_depth`
//! - `|visited ∪ pending| <= max_pages`

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Result of offering a URL to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddResult {
    /// Enqueued
    Added,
    /// Already visited or pending
    Duplicate,
    /// Deeper than the configured maximum
    DepthExceeded,
    /// Page cap already reached
    CapReached,
}

/// A pending frontier entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: String,
    pub depth: u32,
}

/// Pending queue plus visited set for one crawl job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlFrontier {
    max_depth: u32,
    max_pages: usize,
    pending: VecDeque<FrontierEntry>,
    pending_set: HashSet<String>,
    visited: HashSet<String>,
    visit_order: Vec<String>,
}

impl CrawlFrontier {
    pub fn new(max_depth: u32, max_pages: usize) -> Self {
        Self {
            max_depth,
            max_pages,
            pending: VecDeque::new(),
            pending_set: HashSet::new(),
            visited: HashSet::new(),
            visit_order: Vec::new(),
        }
    }

    /// Enqueue `url` at `depth` if uniqueness and caps allow it
    pub fn add_if_allowed(&mut self, url: &str, depth: u32) -> AddResult {
        if self.visited.contains(url) || self.pending_set.contains(url) {
            return AddResult::Duplicate;
        }
        if depth > self.max_depth {
            return AddResult::DepthExceeded;
        }
        if self.is_capped() {
            return AddResult::CapReached;
        }

        self.pending_set.insert(url.to_string());
        self.pending.push_back(FrontierEntry {
            url: url.to_string(),
            depth,
        });
        AddResult::Added
    }

    /// Pop the oldest pending URL and mark it visited
    pub fn pop_next(&mut self) -> Option<FrontierEntry> {
        let entry = self.pending.pop_front()?;
        self.pending_set.remove(&entry.url);
        self.visited.insert(entry.url.clone());
        self.visit_order.push(entry.url.clone());
        Some(entry)
    }

    /// Whether the page cap has been reached
    pub fn is_capped(&self) -> bool {
        self.known() >= self.max_pages
    }

    /// Whether children of a page at `depth` could be enqueued at all
    pub fn accepts_children_of(&self, depth: u32) -> bool {
        depth < self.max_depth && !self.is_capped()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    /// `|visited ∪ pending|`
    pub fn known(&self) -> usize {
        self.visited.len() + self.pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    /// Visited URLs in visit order
    pub fn visited(&self) -> &[String] {
        &self.visit_order
    }

    pub fn pending(&self) -> impl Iterator<Item = &FrontierEntry> {
        self.pending.iter()
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Check every structural invariant
    pub fn invariants_hold(&self) -> bool {
        self.known() <= self.max_pages
            && self.pending.iter().all(|e| e.depth <= self.max_depth)
            && self.pending.iter().all(|e| !self.visited.contains(&e.url))
            && self.pending.len() == self.pending_set.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut frontier = CrawlFrontier::new(2, 10);
        frontier.add_if_allowed("https://a.test/1", 0);
        frontier.add_if_allowed("https://a.test/2", 1);
        assert_eq!(frontier.pop_next().unwrap().url, "https://a.test/1");
        assert_eq!(frontier.pop_next().unwrap().url, "https://a.test/2");
        assert!(frontier.pop_next().is_none());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut frontier = CrawlFrontier::new(2, 10);
        assert_eq!(frontier.add_if_allowed("https://a.test/", 0), AddResult::Added);
        assert_eq!(frontier.add_if_allowed("https://a.test/", 1), AddResult::Duplicate);
        frontier.pop_next();
        assert_eq!(frontier.add_if_allowed("https://a.test/", 1), AddResult::Duplicate);
    }

    #[test]
    fn test_depth_cap() {
        let mut frontier = CrawlFrontier::new(2, 10);
        assert_eq!(frontier.add_if_allowed("https://a.test/deep", 3), AddResult::DepthExceeded);
        assert!(frontier.accepts_children_of(1));
        assert!(!frontier.accepts_children_of(2));
    }

    #[test]
    fn test_page_cap_counts_visited_and_pending() {
        let mut frontier = CrawlFrontier::new(5, 3);
        frontier.add_if_allowed("https://a.test/1", 0);
        frontier.pop_next();
        frontier.add_if_allowed("https://a.test/2", 1);
        frontier.add_if_allowed("https://a.test/3", 1);
        assert_eq!(frontier.add_if_allowed("https://a.test/4", 1), AddResult::CapReached);
        assert_eq!(frontier.known(), 3);
        assert!(frontier.is_capped());
        assert!(frontier.invariants_hold());
    }

    #[test]
    fn test_visit_order_recorded() {
        let mut frontier = CrawlFrontier::new(1, 5);
        frontier.add_if_allowed("https://a.test/x", 0);
        frontier.add_if_allowed("https://a.test/y", 0);
        frontier.pop_next();
        frontier.pop_next();
        assert_eq!(frontier.visited(), ["https://a.test/x", "https://a.test/y"]);
        assert!(frontier.is_exhausted());
    }
}
