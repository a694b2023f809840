//! Shared types, error model, and configuration for ScholarScout.
//!
//! This crate is the foundation depended on by all other ScholarScout crates.
//! It provides:
//! - [`ScholarScoutError`]: the unified error type
//! - Domain types ([`ValidatedCandidate`], [`VerifiedCandidate`], [`ScholarshipRecord`], [`FetchRun`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ProviderEndpointConfig, QueriesConfig, SearchConfig, StorageConfig,
    ValidationConfig, VerificationConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_api_key,
};
pub use error::{Result, ScholarScoutError};
pub use types::{
    Candidate, Currency, FetchRun, ProviderKind, RunStatus, ScholarshipCategory,
    ScholarshipRecord, StudyLevel, ValidatedCandidate, VerifiedCandidate, identity_key,
};
