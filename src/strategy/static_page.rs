//! Plain HTTP fetch followed by markup extraction

use async_trait::async_trait;
use serde_json::Value;

use super::extract::record_from_page;
use super::{merge_records, Outcome, Strategy, StrategyContext};
use crate::models::StrategyKind;
use crate::utils::error::StrategyError;

/// Fetches each target and extracts one record per page
pub struct StaticStrategy;

impl StaticStrategy {
    async fn run(&self, ctx: &mut StrategyContext) -> Result<Value, StrategyError> {
        let mut records = Vec::with_capacity(ctx.urls.len());
        for url in ctx.urls.clone() {
            let page = ctx.get(&url).await?;
            records.push(record_from_page(&page, ctx.schema.as_ref())?);
        }
        Ok(merge_records(records))
    }
}

#[async_trait]
impl Strategy for StaticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Static
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        self.run(ctx).await.into()
    }
}
