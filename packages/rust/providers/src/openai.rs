//! OpenAI Responses API with the hosted web search tool.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use scholarscout_shared::{Result, ScholarScoutError};
use scholarscout_validation::CandidateValidator;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::prompt::{SYSTEM_PROMPT, user_prompt};
use crate::{Endpoint, SearchProvider, collect_text};

const NAME: &str = "openai";

pub struct OpenAiProvider {
    endpoint: Endpoint,
    validator: CandidateValidator,
}

impl OpenAiProvider {
    pub fn new(endpoint: Endpoint, validator: CandidateValidator) -> Self {
        Self {
            endpoint,
            validator,
        }
    }
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    instructions: &'a str,
    input: &'a str,
    tools: [Tool; 1],
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

/// `output` mixes tool-call records with message items; only messages carry
/// `output_text` content.
#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl SearchProvider for OpenAiProvider {
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
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| ScholarScoutError::config(format!("invalid API key: {e}")))?,
        );

        let user = user_prompt(query);
        let request = ResponsesRequest {
            model: self.endpoint.model(),
            instructions: &SYSTEM_PROMPT,
            input: &user,
            tools: [Tool {
                kind: "web_search_preview",
            }],
        };

        let response: ResponsesResponse = self
            .endpoint
            .post_json("/responses", headers, &request)
            .await?;

        collect_text(
            NAME,
            response
                .output
                .iter()
                .flat_map(|item| item.content.iter())
                .filter(|c| c.kind == "output_text")
                .filter_map(|c| c.text.as_deref()),
        )
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

    fn provider(server: &MockServer) -> OpenAiProvider {
        let endpoint = Endpoint::new(
            Some("sk-test".into()),
            "gpt-4.1-mini",
            &server.uri(),
            Duration::from_secs(5),
        )
        .unwrap();
        OpenAiProvider::new(endpoint, CandidateValidator::default())
    }

    #[tokio::test]
    async fn search_reads_output_text_after_tool_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/responses"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "tools": [{ "type": "web_search_preview" }] })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [
                    { "type": "web_search_call", "id": "ws_1", "status": "completed" },
                    {
                        "type": "message",
                        "role": "assistant",
                        "content": [
                            { "type": "output_text", "text": answer_text(), "annotations": [] }
                        ]
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let report = provider(&server).search("Fully funded master USA").await;
        assert_eq!(report.extracted, 2);
        assert_eq!(report.accepted.len(), 1);
        assert_eq!(report.accepted[0].title, "Knight-Hennessy Scholars Program");
    }

    #[tokio::test]
    async fn refusal_only_output_is_a_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [
                    { "type": "message", "content": [ { "type": "refusal", "refusal": "no" } ] }
                ]
            })))
            .mount(&server)
            .await;

        let p = provider(&server);
        assert!(p.fetch_raw("q").await.is_err());
        assert_eq!(p.search("q").await.extracted, 0);
    }
}
