//! Downloadable document extraction
//!
//! The body is fetched as bytes and handed to a [`DocumentParser`] chosen by
//! content type. [`BasicDocumentParser`] understands JSON, HTML and plain
//! text; binary formats (PDF, office files) need a dedicated parser.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::extract::extract_record;
use super::{merge_records, Outcome, Strategy, StrategyContext};
use crate::models::{OutputSchema, StrategyKind};
use crate::utils::content_hash;
use crate::utils::error::StrategyError;

/// Turns a downloaded document into a record
pub trait DocumentParser: Send + Sync {
    fn parse(
        &self,
        url: &str,
        content_type: &str,
        body: &[u8],
        text: &str,
        schema: Option<&OutputSchema>,
    ) -> Result<Value, StrategyError>;
}

pub struct BasicDocumentParser;

impl DocumentParser for BasicDocumentParser {
    fn parse(
        &self,
        url: &str,
        content_type: &str,
        _body: &[u8],
        text: &str,
        schema: Option<&OutputSchema>,
    ) -> Result<Value, StrategyError> {
        match content_type {
            "application/json" => serde_json::from_str(text)
                .map_err(|e| StrategyError::InvalidResponse(format!("malformed JSON document: {e}"))),
            "text/html" | "application/xhtml+xml" => Ok(extract_record(text, url, schema)),
            ct if ct.starts_with("text/") => Ok(json!({
                "text": text,
                "lines": text.lines().count(),
            })),
            other => Err(StrategyError::Unsupported(format!("document type '{other}'"))),
        }
    }
}

pub struct DocumentStrategy {
    parser: Arc<dyn DocumentParser>,
}

impl DocumentStrategy {
    pub fn new(parser: Arc<dyn DocumentParser>) -> Self {
        Self { parser }
    }

    async fn run(&self, ctx: &mut StrategyContext) -> Result<Value, StrategyError> {
        let mut records = Vec::with_capacity(ctx.urls.len());
        for url in ctx.urls.clone() {
            let page = ctx.get(&url).await?;
            let content_type = page
                .mime()
                .unwrap_or_else(|| String::from("application/octet-stream"));

            let content = self
                .parser
                .parse(&page.url, &content_type, &page.body, &page.text, ctx.schema.as_ref())?;

            records.push(json!({
                "url": page.url,
                "content_type": content_type,
                "bytes": page.body.len(),
                "sha256": content_hash(&page.body),
                "content": content,
            }));
        }
        Ok(merge_records(records))
    }
}

#[async_trait]
impl Strategy for DocumentStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Document
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        self.run(ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_parser_formats() {
        let parser = BasicDocumentParser;

        let json = parser
            .parse("https://x.test/a.json", "application/json", b"", r#"{"k": 1}"#, None)
            .unwrap();
        assert_eq!(json["k"], 1);

        let text = parser
            .parse("https://x.test/a.txt", "text/plain", b"", "one\ntwo", None)
            .unwrap();
        assert_eq!(text["lines"], 2);

        let html = parser
            .parse(
                "https://x.test/",
                "text/html",
                b"",
                "<html><head><title>Doc</title></head><body>x</body></html>",
                None,
            )
            .unwrap();
        assert_eq!(html["title"], "Doc");
    }

    #[test]
    fn test_basic_parser_rejects_binary() {
        let err = BasicDocumentParser
            .parse("https://x.test/a.pdf", "application/pdf", b"%PDF-1.7", "", None)
            .unwrap_err();
        assert!(matches!(err, StrategyError::Unsupported(_)));
    }
}
