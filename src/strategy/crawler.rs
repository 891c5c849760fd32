//! Breadth-first multi-page crawl
//!
//! Each `execute` call fetches exactly one frontier entry and returns
//! `Continue`, so the worker regains control between pages. The crawl stops
//! once the frontier drains: either every reachable in-scope page within
//! `max_depth` was visited, or the page cap stopped new URLs from entering.
//!
//! A transient fetch failure keeps the entry aside and surfaces as a
//! retryable error; the worker's backoff then re-enters here and the same
//! page is fetched again. Permanent failures are counted and skipped.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use super::extract::{extract_links, record_from_page};
use super::{Continuation, Outcome, Progress, StopReason, Strategy, StrategyContext};
use crate::crawler::{normalize_url, CrawlFrontier, FrontierEntry, UrlScope};
use crate::models::{CrawlConfig, StrategyKind, TaskOutcome};
use crate::utils::error::{FetchError, StrategyError};

/// One extracted page
#[derive(Debug, Clone, Serialize)]
pub struct CrawlRecord {
    pub url: String,
    pub depth: u32,
    pub data: Value,
}

/// Iteration state of one crawl job
#[derive(Debug)]
pub struct CrawlState {
    frontier: CrawlFrontier,
    scope: UrlScope,
    records: Vec<CrawlRecord>,
    retry: Option<FrontierEntry>,
    failed_pages: usize,
    last_error: Option<String>,
}

impl CrawlState {
    /// Seed a frontier with the job's normalized URLs at depth 0
    pub fn new(config: &CrawlConfig, seeds: &[String]) -> Self {
        let mut frontier = CrawlFrontier::new(config.max_depth, config.max_pages);
        let normalized: Vec<String> = seeds
            .iter()
            .filter_map(|seed| normalize_url(seed, seed))
            .collect();
        for seed in &normalized {
            frontier.add_if_allowed(seed, 0);
        }

        Self {
            frontier,
            scope: UrlScope::new(config, &normalized),
            records: Vec::new(),
            retry: None,
            failed_pages: 0,
            last_error: None,
        }
    }

    pub fn frontier(&self) -> &CrawlFrontier {
        &self.frontier
    }

    pub fn records(&self) -> &[CrawlRecord] {
        &self.records
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.retry.is_some() || !self.frontier.is_exhausted() {
            return None;
        }
        if self.frontier.is_capped() {
            Some(StopReason::PageCapReached)
        } else {
            Some(StopReason::FrontierExhausted)
        }
    }

    /// Final payload; an all-failed crawl is an error
    pub fn finish(self, reason: StopReason) -> Result<Value, StrategyError> {
        if self.records.is_empty() && self.failed_pages > 0 {
            return Err(StrategyError::Extraction(format!(
                "all {} crawled pages failed; last error: {}",
                self.failed_pages,
                self.last_error.as_deref().unwrap_or("unknown")
            )));
        }

        Ok(json!({
            "records": self.records,
            "pages_visited": self.frontier.visited_len(),
            "pages_failed": self.failed_pages,
            "stop_reason": reason.as_str(),
        }))
    }

    pub fn summary(&self) -> Value {
        json!({
            "pages_visited": self.frontier.visited_len(),
            "pages_pending": self.frontier.pending_len(),
            "pages_failed": self.failed_pages,
            "records": self.records.len(),
        })
    }

    fn note_failure(&mut self, error: String) {
        self.failed_pages += 1;
        self.last_error = Some(error);
    }
}

pub struct CrawlerStrategy {
    config: CrawlConfig,
}

impl CrawlerStrategy {
    pub fn new(config: CrawlConfig) -> Self {
        Self { config }
    }

    async fn step(&self, ctx: &mut StrategyContext, state: &mut CrawlState) -> Outcome {
        let Some(entry) = state.retry.take().or_else(|| state.frontier.pop_next()) else {
            return Outcome::Continue(Continuation::now(state.summary()));
        };

        match ctx.get(&entry.url).await {
            Ok(page) => {
                ctx.record_task(&entry.url, TaskOutcome::Success).await;

                match record_from_page(&page, ctx.schema.as_ref()) {
                    Ok(data) => state.records.push(CrawlRecord {
                        url: entry.url.clone(),
                        depth: entry.depth,
                        data,
                    }),
                    Err(e) => state.note_failure(e.to_string()),
                }

                if !page.is_json() && state.frontier.accepts_children_of(entry.depth) {
                    for link in extract_links(&page.text, &page.url) {
                        if state.scope.allows(&link) {
                            state.frontier.add_if_allowed(&link, entry.depth + 1);
                        }
                    }
                }

                tracing::debug!(
                    job_id = %ctx.job_id,
                    url = %entry.url,
                    depth = entry.depth,
                    pending = state.frontier.pending_len(),
                    "Crawled page"
                );
                Outcome::Continue(Continuation::now(state.summary()))
            }
            Err(FetchError::Cancelled) => Outcome::Failed(FetchError::Cancelled.into()),
            Err(e) if e.is_transient() => {
                ctx.record_task(&entry.url, TaskOutcome::Fail).await;
                state.retry = Some(entry);
                Outcome::Failed(e.into())
            }
            Err(e) => {
                ctx.record_task(&entry.url, TaskOutcome::Skip).await;
                tracing::info!(job_id = %ctx.job_id, url = %entry.url, error = %e, "Skipping page");
                state.note_failure(e.to_string());
                Outcome::Continue(Continuation::now(state.summary()))
            }
        }
    }
}

#[async_trait]
impl Strategy for CrawlerStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Crawler
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        let mut state = match std::mem::take(&mut ctx.progress) {
            Progress::Crawl(state) => state,
            _ => Box::new(CrawlState::new(&self.config, &ctx.urls)),
        };
        let outcome = self.step(ctx, &mut state).await;
        ctx.progress = Progress::Crawl(state);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_depth: u32, max_pages: usize) -> CrawlConfig {
        CrawlConfig {
            max_depth,
            max_pages,
            ..Default::default()
        }
    }

    #[test]
    fn test_seeds_are_normalized_and_deduplicated() {
        let seeds = vec![
            "https://Example.com/start#top".to_string(),
            "https://example.com/start".to_string(),
        ];
        let state = CrawlState::new(&config(2, 10), &seeds);
        assert_eq!(state.frontier().pending_len(), 1);
        assert_eq!(state.stop_reason(), None);
    }

    #[test]
    fn test_stop_reason_distinguishes_cap() {
        let seeds = vec!["https://example.com/".to_string()];

        let mut state = CrawlState::new(&config(2, 1), &seeds);
        state.frontier.pop_next();
        assert_eq!(state.stop_reason(), Some(StopReason::PageCapReached));

        let mut state = CrawlState::new(&config(2, 10), &seeds);
        state.frontier.pop_next();
        assert_eq!(state.stop_reason(), Some(StopReason::FrontierExhausted));
    }

    #[test]
    fn test_pending_retry_blocks_stop() {
        let seeds = vec!["https://example.com/".to_string()];
        let mut state = CrawlState::new(&config(2, 10), &seeds);
        let entry = state.frontier.pop_next();
        state.retry = entry;
        assert_eq!(state.stop_reason(), None);
    }

    #[test]
    fn test_all_failed_crawl_is_error() {
        let seeds = vec!["https://example.com/".to_string()];
        let mut state = CrawlState::new(&config(2, 10), &seeds);
        state.frontier.pop_next();
        state.note_failure(String::from("Client error: 404"));
        assert!(state.finish(StopReason::FrontierExhausted).is_err());
    }

    #[test]
    fn test_finish_payload() {
        let seeds = vec!["https://example.com/".to_string()];
        let mut state = CrawlState::new(&config(2, 10), &seeds);
        state.frontier.pop_next();
        state.records.push(CrawlRecord {
            url: "https://example.com/".into(),
            depth: 0,
            data: json!({"title": "Home"}),
        });

        let payload = state.finish(StopReason::FrontierExhausted).unwrap();
        assert_eq!(payload["pages_visited"], 1);
        assert_eq!(payload["records"][0]["data"]["title"], "Home");
        assert_eq!(payload["stop_reason"], "frontier_exhausted");
    }
}
