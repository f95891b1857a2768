use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

use crate::error::AnalyzerError;

/// Analyzer
///
/// Contract for the LLM completion provider used to analyze journal entries. The production
/// client (`OpenAiAnalyzer`) and the test double (`MockAnalyzer`) are interchangeable behind
/// `AnalyzerState`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Sends a fully rendered prompt and returns the completion text.
    async fn analyze(&self, prompt: &str) -> Result<String, AnalyzerError>;
}

pub type AnalyzerState = Arc<dyn Analyzer>;

/// OpenAiAnalyzer
///
/// Talks to any OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiAnalyzer {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, AnalyzerError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(&self, prompt: &str) -> Result<String, AnalyzerError> {
        if self.api_key.is_empty() {
            return Err(AnalyzerError::Unavailable("LLM_API_KEY is not configured".into()));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AnalyzerError::Status(response.status().as_u16()));
        }

        let body = response.json::<ChatResponse>().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(AnalyzerError::EmptyCompletion)
    }
}

/// MockAnalyzer
///
/// Deterministic `Analyzer` for tests: echoes a fixed prefix plus the prompt length, or fails
/// on demand.
#[derive(Clone, Default)]
pub struct MockAnalyzer {
    pub should_fail: bool,
}

impl MockAnalyzer {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, prompt: &str) -> Result<String, AnalyzerError> {
        if self.should_fail {
            return Err(AnalyzerError::Status(503));
        }
        Ok(format!("mock analysis ({} chars): {}", prompt.len(), prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_analyzer_echoes_prompt() {
        let reply = MockAnalyzer::new().analyze("hello").await.unwrap();
        assert_eq!(reply, "mock analysis (5 chars): hello");
    }

    #[tokio::test]
    async fn test_mock_analyzer_failure() {
        let result = MockAnalyzer::new_failing().analyze("hello").await;
        assert!(matches!(result, Err(AnalyzerError::Status(503))));
    }

    #[tokio::test]
    async fn test_openai_analyzer_requires_key() {
        let analyzer =
            OpenAiAnalyzer::new("http://localhost:1", "", "gpt-4o-mini", Duration::from_secs(1))
                .unwrap();
        let result = analyzer.analyze("hello").await;
        assert!(matches!(result, Err(AnalyzerError::Unavailable(_))));
    }
}
