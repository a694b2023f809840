//! Application configuration for ScholarScout.
//!
//! User config lives at `~/.scholarscout/scholarscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScholarScoutError};
use crate::types::ProviderKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "scholarscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".scholarscout";

// ---------------------------------------------------------------------------
// Config structs (matching scholarscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database location.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Provider selection and pacing.
    #[serde(default)]
    pub search: SearchConfig,

    /// Perplexity Sonar settings.
    #[serde(default = "ProviderEndpointConfig::perplexity")]
    pub perplexity: ProviderEndpointConfig,

    /// OpenAI Responses API settings.
    #[serde(default = "ProviderEndpointConfig::openai")]
    pub openai: ProviderEndpointConfig,

    /// Anthropic Messages API settings.
    #[serde(default = "ProviderEndpointConfig::anthropic")]
    pub anthropic: ProviderEndpointConfig,

    /// Link verification limits.
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Candidate validation policy.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Query batch overrides.
    #[serde(default)]
    pub queries: QueriesConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            search: SearchConfig::default(),
            perplexity: ProviderEndpointConfig::perplexity(),
            openai: ProviderEndpointConfig::openai(),
            anthropic: ProviderEndpointConfig::anthropic(),
            verification: VerificationConfig::default(),
            validation: ValidationConfig::default(),
            queries: QueriesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Endpoint settings for a given provider.
    pub fn endpoint(&self, kind: ProviderKind) -> &ProviderEndpointConfig {
        match kind {
            ProviderKind::Perplexity => &self.perplexity,
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Anthropic => &self.anthropic,
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file. A leading `~/` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Resolve `db_path`, expanding a leading `~/`.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    ScholarScoutError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.db_path)),
        }
    }
}

fn default_db_path() -> String {
    "~/.scholarscout/scholarscout.db".into()
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Preferred provider.
    #[serde(default)]
    pub provider: ProviderKind,

    /// Fall back to another configured provider when the preferred one has no key.
    #[serde(default = "default_true")]
    pub allow_fallback: bool,

    /// Pause between consecutive queries in one batch.
    #[serde(default = "default_inter_query_delay")]
    pub inter_query_delay_ms: u64,

    /// Timeout for a single provider request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            allow_fallback: true,
            inter_query_delay_ms: default_inter_query_delay(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_inter_query_delay() -> u64 {
    2_000
}
fn default_request_timeout() -> u64 {
    90
}

/// `[perplexity]`, `[openai]` and `[anthropic]` sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpointConfig {
    /// Name of the env var holding the API key (never store the key itself).
    pub api_key_env: String,

    /// Model identifier sent upstream.
    pub model: String,

    /// API base URL (override for proxies and tests).
    pub base_url: String,
}

impl ProviderEndpointConfig {
    pub fn perplexity() -> Self {
        Self {
            api_key_env: "PERPLEXITY_API_KEY".into(),
            model: "sonar-pro".into(),
            base_url: "https://api.perplexity.ai".into(),
        }
    }

    pub fn openai() -> Self {
        Self {
            api_key_env: "OPENAI_API_KEY".into(),
            model: "gpt-4.1-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
        }
    }

    pub fn anthropic() -> Self {
        Self {
            api_key_env: "ANTHROPIC_API_KEY".into(),
            model: "claude-sonnet-4-20250514".into(),
            base_url: "https://api.anthropic.com/v1".into(),
        }
    }
}

/// `[verification]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Maximum link checks in flight at once.
    #[serde(default = "default_verify_concurrency")]
    pub concurrency: usize,

    /// Per-request timeout for a link check.
    #[serde(default = "default_verify_timeout")]
    pub timeout_secs: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_verify_concurrency(),
            timeout_secs: default_verify_timeout(),
        }
    }
}

fn default_verify_concurrency() -> usize {
    5
}
fn default_verify_timeout() -> u64 {
    8
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Deadlines further out than this many months are rejected.
    #[serde(default = "default_max_deadline_months")]
    pub max_deadline_months: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_deadline_months: default_max_deadline_months(),
        }
    }
}

fn default_max_deadline_months() -> u32 {
    36
}

/// `[queries]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueriesConfig {
    /// Query batches rotated round-robin across runs. Empty means built-in batches.
    #[serde(default)]
    pub batches: Vec<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.scholarscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ScholarScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.scholarscout/scholarscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ScholarScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ScholarScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ScholarScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ScholarScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ScholarScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the API key named by `endpoint.api_key_env`. Empty values count as missing.
pub fn resolve_api_key(endpoint: &ProviderEndpointConfig) -> Option<String> {
    std::env::var(&endpoint.api_key_env)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("db_path"));
        assert!(toml_str.contains("PERPLEXITY_API_KEY"));
        assert!(toml_str.contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn default_config_has_provider_endpoints() {
        let config = AppConfig::default();
        assert_eq!(config.openai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.perplexity.api_key_env, "PERPLEXITY_API_KEY");
        assert_eq!(config.anthropic.api_key_env, "ANTHROPIC_API_KEY");
        for kind in ProviderKind::ALL {
            let endpoint = config.endpoint(*kind);
            assert!(!endpoint.base_url.is_empty(), "{kind} has no base_url");
            assert!(!endpoint.model.is_empty(), "{kind} has no model");
        }
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.verification.concurrency, 5);
        assert_eq!(parsed.verification.timeout_secs, 8);
        assert_eq!(parsed.search.inter_query_delay_ms, 2_000);
        assert_eq!(parsed.openai.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[search]
provider = "anthropic"

[queries]
batches = [["phd scholarships germany {year}"], ["masters scholarships canada"]]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.search.provider, ProviderKind::Anthropic);
        assert!(config.search.allow_fallback);
        assert_eq!(config.queries.batches.len(), 2);
        assert_eq!(config.perplexity.model, "sonar-pro");
        assert_eq!(config.validation.max_deadline_months, 36);
        assert_eq!(
            config.endpoint(ProviderKind::Anthropic).base_url,
            "https://api.anthropic.com/v1"
        );
    }

    #[test]
    fn db_path_without_tilde_is_used_verbatim() {
        let storage = StorageConfig {
            db_path: "/tmp/scholarships.db".into(),
        };
        assert_eq!(
            storage.resolved_db_path().unwrap(),
            PathBuf::from("/tmp/scholarships.db")
        );
    }

    #[test]
    fn missing_api_key_resolves_to_none() {
        // Use a unique env var name to avoid interfering with other tests
        let mut endpoint = ProviderEndpointConfig::perplexity();
        endpoint.api_key_env = "SS_TEST_NONEXISTENT_KEY_12345".into();
        assert!(resolve_api_key(&endpoint).is_none());
    }
}
