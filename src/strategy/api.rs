//! Direct JSON endpoint replay

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use super::transport::RequestBody;
use super::{merge_records, Outcome, Strategy, StrategyContext};
use crate::models::{ApiConfig, StrategyKind};
use crate::utils::error::StrategyError;

pub struct ApiStrategy {
    config: ApiConfig,
}

impl ApiStrategy {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Value, StrategyError> {
        let method = Method::from_bytes(self.config.method.to_uppercase().as_bytes())
            .map_err(|_| StrategyError::Unsupported(format!("HTTP method '{}'", self.config.method)))?;

        let mut records = Vec::with_capacity(ctx.urls.len());
        for url in ctx.urls.clone() {
            let mut request = ctx
                .request(&url)
                .with_method(method.clone())
                .with_header("Accept", "application/json");
            for (name, value) in &self.config.headers {
                request = request.with_header(name, value);
            }
            if let Some(body) = &self.config.body {
                request = request.with_body(RequestBody::Json(body.clone()));
            }

            let page = ctx.fetch(request).await?;
            let value: Value = serde_json::from_str(&page.text).map_err(|e| {
                StrategyError::InvalidResponse(format!("{url} did not return JSON: {e}"))
            })?;
            records.push(value);
        }
        Ok(merge_records(records))
    }
}

#[async_trait]
impl Strategy for ApiStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Api
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        self.run(ctx).await.into()
    }
}
