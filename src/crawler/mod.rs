//! Crawl bookkeeping used by the crawler strategy
//!
//! - [`frontier`] - bounded pending/visited sets with BFS ordering
//! - [`url`] - link normalization and scope filtering

pub mod frontier;
pub mod url;

pub use frontier::{AddResult, CrawlFrontier, FrontierEntry};
pub use url::{normalize_url, UrlScope};
