//! LLM web-search providers.
//!
//! Every upstream source implements [`SearchProvider`]. A variant only knows
//! how to call its API and pull the answer text out of the response envelope
//! ([`SearchProvider::fetch_raw`]); the provided [`SearchProvider::search`]
//! hands that text to the shared [`CandidateValidator`] and turns any failure
//! into an empty report so one bad query never sinks a batch.

mod anthropic;
mod openai;
mod perplexity;
mod prompt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::header::HeaderMap;
use scholarscout_shared::{
    AppConfig, ProviderEndpointConfig, ProviderKind, Result, ScholarScoutError, resolve_api_key,
};
use scholarscout_validation::{CandidateValidator, ValidationReport};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use perplexity::PerplexityProvider;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("ScholarScout/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An upstream that answers a search query with free text.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable provider name, used in logs and record provenance.
    fn name(&self) -> &str;

    /// Whether the provider has what it needs (an API key) to make calls.
    fn is_configured(&self) -> bool;

    /// Validator applied to this provider's output.
    fn validator(&self) -> &CandidateValidator;

    /// Call the upstream and return the answer text.
    async fn fetch_raw(&self, query: &str) -> Result<String>;

    /// Run one query and validate the answer. Never fails: transport and
    /// envelope errors become an empty report plus a warning.
    async fn search(&self, query: &str) -> ValidationReport {
        match self.fetch_raw(query).await {
            Ok(text) => {
                debug!(provider = self.name(), query, bytes = text.len(), "provider answered");
                self.validator()
                    .validate_response(&text, Utc::now().date_naive())
            }
            Err(e) => {
                warn!(provider = self.name(), query, error = %e, "search failed, continuing with empty result");
                ValidationReport::empty()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoint (shared HTTP plumbing)
// ---------------------------------------------------------------------------

/// Connection details shared by every provider variant.
#[derive(Debug, Clone)]
pub struct Endpoint {
    api_key: Option<String>,
    model: String,
    base_url: String,
    http: Client,
}

impl Endpoint {
    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &ProviderEndpointConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            resolve_api_key(config),
            &config.model,
            &config.base_url,
            timeout,
        )
    }

    /// Build with an explicit key (or none).
    pub fn new(
        api_key: Option<String>,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_client(timeout)?,
        })
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn key(&self, provider: &str) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ScholarScoutError::config(format!("{provider} has no API key configured"))
        })
    }

    /// POST `body` as JSON to `{base_url}{path}` and decode the JSON reply.
    async fn post_json<B, T>(&self, path: &str, headers: HeaderMap, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .http
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| ScholarScoutError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let snippet: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(ScholarScoutError::Provider(format!(
                "{url}: HTTP {status}: {snippet}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ScholarScoutError::parse(format!("{url}: unexpected response body: {e}")))
    }
}

/// Build a reqwest client with appropriate settings.
fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| ScholarScoutError::Network(format!("failed to build HTTP client: {e}")))
}

/// Join text fragments, failing when the envelope carried none.
fn collect_text<'a>(provider: &str, parts: impl Iterator<Item = &'a str>) -> Result<String> {
    let text = parts.collect::<Vec<_>>().join("\n");
    if text.trim().is_empty() {
        return Err(ScholarScoutError::parse(format!(
            "{provider} response contained no text"
        )));
    }
    Ok(text)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Build the provider variant for `kind` from config.
pub fn build_provider(kind: ProviderKind, config: &AppConfig) -> Result<Arc<dyn SearchProvider>> {
    let timeout = Duration::from_secs(config.search.request_timeout_secs);
    let endpoint = Endpoint::from_config(config.endpoint(kind), timeout)?;
    let validator = CandidateValidator::new(&config.validation);

    Ok(match kind {
        ProviderKind::Perplexity => Arc::new(PerplexityProvider::new(endpoint, validator)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(endpoint, validator)),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(endpoint, validator)),
    })
}

/// Pick the provider for this process.
///
/// Tries the preferred provider, then (if `allow_fallback`) the others in
/// declaration order. Fails with a configuration error when none has a key,
/// so a misconfigured deployment stops at startup.
pub fn select_provider(config: &AppConfig) -> Result<Arc<dyn SearchProvider>> {
    let preferred = config.search.provider;
    let mut order = vec![preferred];
    if config.search.allow_fallback {
        order.extend(ProviderKind::ALL.iter().copied().filter(|k| *k != preferred));
    }

    for kind in order {
        let provider = build_provider(kind, config)?;
        if provider.is_configured() {
            if kind != preferred {
                warn!(%preferred, fallback = %kind, "preferred provider has no API key, falling back");
            }
            info!(provider = %kind, "search provider selected");
            return Ok(provider);
        }
        debug!(provider = %kind, env = %config.endpoint(kind).api_key_env, "provider not configured");
    }

    let vars: Vec<&str> = ProviderKind::ALL
        .iter()
        .map(|k| config.endpoint(*k).api_key_env.as_str())
        .collect();
    Err(ScholarScoutError::config(format!(
        "no search provider is configured. Set one of: {}",
        vars.join(", ")
    )))
}

/// Configuration status of every provider, for reporting.
pub fn provider_status(config: &AppConfig) -> Vec<(ProviderKind, bool)> {
    ProviderKind::ALL
        .iter()
        .map(|kind| (*kind, resolve_api_key(config.endpoint(*kind)).is_some()))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Days, Utc};
    use serde_json::json;

    /// A provider answer with one valid candidate and one blocklisted one.
    pub fn answer_text() -> String {
        let deadline = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(90))
            .unwrap();
        let items = json!([
            {
                "title": "Knight-Hennessy Scholars Program",
                "organization": "Stanford University",
                "country": "United States",
                "level": "Master",
                "field": "Any",
                "category": "Fully Funded",
                "deadline": deadline.to_string(),
                "description": "Full funding for graduate study at Stanford, including tuition, stipend and travel, with a leadership development programme.",
                "link": "https://knight-hennessy.stanford.edu/admission",
                "amount": "Full cost of attendance",
                "currency": "USD"
            },
            {
                "title": "Study Abroad Mega Scholarship",
                "organization": "Fastweb",
                "country": "United States",
                "level": "Any",
                "field": "Any",
                "category": "Merit-Based",
                "deadline": deadline.to_string(),
                "description": "Aggregated listing from a scholarship search engine that should never be stored as a direct link.",
                "link": "https://www.fastweb.com/college-scholarships",
                "amount": null,
                "currency": null
            }
        ]);
        format!(
            "I searched official sources.\n```json\n{}\n```",
            serde_json::to_string_pretty(&items).unwrap()
        )
    }
}
