//! Anthropic Messages API with the server-side web search tool.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use scholarscout_shared::{Result, ScholarScoutError};
use scholarscout_validation::CandidateValidator;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::prompt::{SYSTEM_PROMPT, user_prompt};
use crate::{Endpoint, SearchProvider, collect_text};

const NAME: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const MAX_SEARCHES: u32 = 5;

pub struct AnthropicProvider {
    endpoint: Endpoint,
    validator: CandidateValidator,
}

impl AnthropicProvider {
    pub fn new(endpoint: Endpoint, validator: CandidateValidator) -> Self {
        Self {
            endpoint,
            validator,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: [Message<'a>; 1],
    tools: [WebSearchTool; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WebSearchTool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
    max_uses: u32,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// Text arrives split across several blocks interleaved with
/// `server_tool_use` and `web_search_tool_result` blocks.
#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl SearchProvider for AnthropicProvider {
    fn name(&self) -> &str {
        NAME
    }

    fn is_configured(&self) -> bool {
        self.endpoint.has_key()
    }

    fn validator(&self) -> &CandidateValidator {
        &self.validator
    }

    #[instrument(skip_all, fields(provider = NAME, model = %self.endpoint.model()))]
    async fn fetch_raw(&self, query: &str) -> Result<String> {
        let key = self.endpoint.key(NAME)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(key)
                .map_err(|e| ScholarScoutError::config(format!("invalid API key: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));

        let user = user_prompt(query);
        let request = MessagesRequest {
            model: self.endpoint.model(),
            max_tokens: MAX_TOKENS,
            system: &SYSTEM_PROMPT,
            messages: [Message {
                role: "user",
                content: &user,
            }],
            tools: [WebSearchTool {
                kind: "web_search_20250305",
                name: "web_search",
                max_uses: MAX_SEARCHES,
            }],
        };

        let response: MessagesResponse = self
            .endpoint
            .post_json("/messages", headers, &request)
            .await?;

        // Blocks are fragments of one answer; join them without separators.
        let text: String = response
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        collect_text(NAME, std::iter::once(text.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::test_support::answer_text;

    fn provider(server: &MockServer) -> AnthropicProvider {
        let endpoint = Endpoint::new(
            Some("sk-ant-test".into()),
            "claude-sonnet-4-20250514",
            &server.uri(),
            Duration::from_secs(5),
        )
        .unwrap();
        AnthropicProvider::new(endpoint, CandidateValidator::default())
    }

    #[tokio::test]
    async fn search_joins_text_blocks() {
        let answer = answer_text();
        let (head, tail) = answer.split_at(answer.len() / 2);

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({
                "tools": [{ "type": "web_search_20250305", "name": "web_search" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "server_tool_use", "id": "srvtoolu_1", "name": "web_search", "input": {} },
                    { "type": "web_search_tool_result", "tool_use_id": "srvtoolu_1", "content": [] },
                    { "type": "text", "text": head },
                    { "type": "text", "text": tail, "citations": [] }
                ],
                "stop_reason": "end_turn"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let report = provider(&server).search("US graduate fellowships").await;
        assert_eq!(report.extracted, 2);
        assert_eq!(report.accepted.len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_yields_empty_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "type": "error",
                "error": { "type": "authentication_error", "message": "invalid x-api-key" }
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        let err = p.fetch_raw("q").await.unwrap_err();
        assert!(matches!(err, ScholarScoutError::Provider(_)));
        assert!(p.search("q").await.accepted.is_empty());
    }
}
