//! Rendered-page extraction
//!
//! Rendering is delegated to a [`PageRenderer`]. The bundled
//! [`FetchRenderer`] only captures the server markup, which is enough for
//! pages whose content is present before scripts run. Deployments that need
//! real script execution plug in a headless-browser backend through
//! [`Dispatcher::with_renderer`](super::Dispatcher::with_renderer).

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::Arc;

use super::extract::extract_record;
use super::{merge_records, Outcome, Strategy, StrategyContext};
use crate::models::{BrowserConfig, StrategyKind};
use crate::utils::error::StrategyError;

/// Markup captured by a renderer
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
}

/// Produces the final DOM for a URL
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        ctx: &mut StrategyContext,
        url: &str,
        config: &BrowserConfig,
    ) -> Result<RenderedPage, StrategyError>;
}

/// Renderer that uses the fetched markup as the rendered DOM
pub struct FetchRenderer;

#[async_trait]
impl PageRenderer for FetchRenderer {
    async fn render(
        &self,
        ctx: &mut StrategyContext,
        url: &str,
        config: &BrowserConfig,
    ) -> Result<RenderedPage, StrategyError> {
        let page = ctx.get(url).await?;

        if let Some(wait_for) = &config.wait_for_selector {
            let selector = Selector::parse(wait_for)
                .map_err(|e| StrategyError::Extraction(format!("invalid wait selector '{wait_for}': {e}")))?;
            let present = Html::parse_document(&page.text).select(&selector).next().is_some();
            if !present {
                return Err(StrategyError::Extraction(format!(
                    "'{wait_for}' never appeared on {url}"
                )));
            }
        }

        Ok(RenderedPage {
            url: page.url,
            html: page.text,
        })
    }
}

pub struct BrowserStrategy {
    config: BrowserConfig,
    renderer: Arc<dyn PageRenderer>,
}

impl BrowserStrategy {
    pub fn new(config: BrowserConfig, renderer: Arc<dyn PageRenderer>) -> Self {
        Self { config, renderer }
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Value, StrategyError> {
        let mut records = Vec::with_capacity(ctx.urls.len());
        for url in ctx.urls.clone() {
            let rendered = self.renderer.render(ctx, &url, &self.config).await?;
            records.push(extract_record(&rendered.html, &rendered.url, ctx.schema.as_ref()));
        }
        Ok(merge_records(records))
    }
}

#[async_trait]
impl Strategy for BrowserStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Browser
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        self.run(ctx).await.into()
    }
}
