//! Perplexity chat completions (search is built into the sonar models).

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use scholarscout_shared::{Result, ScholarScoutError};
use scholarscout_validation::CandidateValidator;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::prompt::{SYSTEM_PROMPT, user_prompt};
use crate::{Endpoint, SearchProvider, collect_text};

const NAME: &str = "perplexity";

pub struct PerplexityProvider {
    endpoint: Endpoint,
    validator: CandidateValidator,
}

impl PerplexityProvider {
    pub fn new(endpoint: Endpoint, validator: CandidateValidator) -> Self {
        Self {
            endpoint,
            validator,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SearchProvider for PerplexityProvider {
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
        let request = ChatRequest {
            model: self.endpoint.model(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.1,
        };

        let response: ChatResponse = self
            .endpoint
            .post_json("/chat/completions", headers, &request)
            .await?;

        collect_text(
            NAME,
            response
                .choices
                .iter()
                .take(1)
                .filter_map(|c| c.message.content.as_deref()),
        )
    }
}
