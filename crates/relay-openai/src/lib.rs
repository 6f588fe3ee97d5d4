//! OpenAI adapter (Responses API).
//!
//! Implements the `relay-core` `ModelClient` port with a single
//! `POST {base_url}/responses` call per prompt.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use relay_core::{
    errors::Error,
    model::{
        client::ModelClient,
        types::{ContentBlock, Generation},
    },
    Result,
};

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    /// Build a client. Without `timeout`, the HTTP client's defaults apply.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let http = builder
            .build()
            .map_err(|e| Error::External(format!("openai client build error: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            http,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let resp = self
            .http
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": prompt }))
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "openai responses call failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))?;
        debug!(response = %v, "openai response");

        parse_response(&v)
    }
}

/// Extract the response id and the content segments of the first output item
/// that carries content.
///
/// Only a missing id is an error; any other shape problem yields fewer (or no)
/// blocks and is left to the caller's fallback handling.
pub fn parse_response(v: &Value) -> Result<Generation> {
    let response_id = v
        .get("id")
        .and_then(|id| id.as_str())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::External("openai response is missing an id".to_string()))?
        .to_string();

    let blocks = v
        .get("output")
        .and_then(|o| o.as_array())
        .and_then(|items| {
            items
                .iter()
                .find_map(|item| item.get("content").and_then(|c| c.as_array()))
        })
        .map(|content| {
            content
                .iter()
                .map(|b| {
                    ContentBlock::new(
                        b.get("type").and_then(|t| t.as_str()).unwrap_or(""),
                        b.get("text").and_then(|t| t.as_str()).unwrap_or(""),
                    )
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Generation {
        response_id,
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use relay_core::model::types::ContentKind;

    use super::*;

    #[test]
    fn parses_message_output() {
        let v = json!({
            "id": "resp_123",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "output_text", "text": "Hello!", "annotations": []},
                    {"type": "code", "text": "fn main() {}"}
                ]
            }]
        });

        let g = parse_response(&v).unwrap();
        assert_eq!(g.response_id, "resp_123");
        assert_eq!(g.blocks.len(), 2);
        assert_eq!(g.blocks[0].kind, ContentKind::Text);
        assert_eq!(g.blocks[1].kind, ContentKind::Code);
        assert_eq!(g.primary_text(), Some("Hello!"));
    }

    #[test]
    fn skips_output_items_without_content() {
        let v = json!({
            "id": "resp_1",
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [{"type": "output_text", "text": "hi"}]}
            ]
        });

        let g = parse_response(&v).unwrap();
        assert_eq!(g.primary_text(), Some("hi"));
    }

    #[test]
    fn tolerates_malformed_output() {
        let g = parse_response(&json!({"id": "resp_1"})).unwrap();
        assert!(g.blocks.is_empty());

        let g = parse_response(&json!({"id": "resp_1", "output": "nope"})).unwrap();
        assert!(g.blocks.is_empty());

        let g = parse_response(&json!({
            "id": "resp_1",
            "output": [{"content": [{"type": "output_text"}]}]
        }))
        .unwrap();
        assert_eq!(g.blocks.len(), 1);
        assert_eq!(g.primary_text(), None);
    }

    #[test]
    fn missing_id_is_an_error() {
        let err = parse_response(&json!({"output": []})).unwrap_err();
        assert!(err.to_string().contains("missing an id"));
    }
}
