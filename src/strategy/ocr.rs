//! Text recognition over images and scanned documents

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{merge_records, Outcome, Strategy, StrategyContext};
use crate::models::{OcrConfig, StrategyKind};
use crate::utils::error::StrategyError;

/// Recognized text for one image
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Mean confidence in [0, 1] when the engine reports one
    pub confidence: Option<f64>,
}

/// OCR backend
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(&self, image: Bytes, config: &OcrConfig) -> Result<Recognition, StrategyError>;
}

/// Placeholder engine used until a real backend is configured
pub struct UnconfiguredOcr;

#[async_trait]
impl OcrEngine for UnconfiguredOcr {
    async fn recognize(&self, _image: Bytes, _config: &OcrConfig) -> Result<Recognition, StrategyError> {
        Err(StrategyError::Unsupported(String::from("no OCR engine configured")))
    }
}

pub struct OcrStrategy {
    config: OcrConfig,
    engine: Arc<dyn OcrEngine>,
}

impl OcrStrategy {
    pub fn new(config: OcrConfig, engine: Arc<dyn OcrEngine>) -> Self {
        Self { config, engine }
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Value, StrategyError> {
        let mut records = Vec::with_capacity(ctx.urls.len());
        for url in ctx.urls.clone() {
            let page = ctx.get(&url).await?;
            let mime = page.mime().unwrap_or_default();
            if !(mime.starts_with("image/") || mime == "application/pdf") {
                return Err(StrategyError::Unsupported(format!(
                    "OCR input must be an image or PDF, got '{mime}'"
                )));
            }

            let recognition = self.engine.recognize(page.body.clone(), &self.config).await?;
            records.push(json!({
                "url": page.url,
                "language": self.config.language,
                "text": recognition.text,
                "confidence": recognition.confidence,
            }));
        }
        Ok(merge_records(records))
    }
}

#[async_trait]
impl Strategy for OcrStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ocr
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        self.run(ctx).await.into()
    }
}
