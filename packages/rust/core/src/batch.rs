//! Runs one batch of search queries and verifies what survives validation.

use std::time::Duration;

use scholarscout_providers::SearchProvider;
use scholarscout_shared::{AppConfig, Result, ScholarScoutError, VerifiedCandidate};
use scholarscout_verifier::{HttpProbe, LinkProbe, LinkVerifier};
use tracing::{debug, info, instrument};

use crate::progress::ProgressReporter;

/// Outcome of one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Elements extracted from provider output, across all queries.
    pub found: usize,
    /// Candidates that passed validation.
    pub validated: usize,
    /// Candidates dropped by validation.
    pub rejected: usize,
    /// Queries whose output could not be read as a JSON array.
    pub unparseable: usize,
    /// Candidates whose link answered, in discovery order.
    pub verified: Vec<VerifiedCandidate>,
    /// Candidates dropped because their link did not answer.
    pub dead_links: usize,
}

/// Sequential search, then one verification pass.
pub struct BatchOrchestrator<P = HttpProbe> {
    verifier: LinkVerifier<P>,
    inter_query_delay: Duration,
}

impl BatchOrchestrator<HttpProbe> {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(
            LinkVerifier::new(&config.verification)?,
            Duration::from_millis(config.search.inter_query_delay_ms),
        ))
    }
}

impl<P: LinkProbe> BatchOrchestrator<P> {
    pub fn new(verifier: LinkVerifier<P>, inter_query_delay: Duration) -> Self {
        Self {
            verifier,
            inter_query_delay,
        }
    }

    /// Run `queries` in order against `provider`.
    ///
    /// Fails only when the provider is not configured; individual query
    /// failures already come back as empty reports.
    #[instrument(skip_all, fields(provider = provider.name(), queries = queries.len()))]
    pub async fn run_batch(
        &self,
        queries: &[String],
        provider: &dyn SearchProvider,
        progress: &dyn ProgressReporter,
    ) -> Result<BatchResult> {
        if !provider.is_configured() {
            return Err(ScholarScoutError::config(format!(
                "search provider {} is not configured",
                provider.name()
            )));
        }

        let mut result = BatchResult::default();
        let mut accepted = Vec::new();

        progress.phase("Searching");
        for (i, query) in queries.iter().enumerate() {
            if i > 0 && !self.inter_query_delay.is_zero() {
                tokio::time::sleep(self.inter_query_delay).await;
            }
            progress.query_started(query, i + 1, queries.len());

            let report = provider.search(query).await;
            debug!(
                query = %query,
                extracted = report.extracted,
                accepted = report.accepted.len(),
                rejected = report.rejected.len(),
                "query finished"
            );
            for rejection in &report.rejected {
                debug!(
                    index = rejection.index,
                    title = rejection.title.as_deref().unwrap_or("?"),
                    reason = %rejection.reason,
                    "candidate rejected"
                );
            }

            result.found += report.extracted;
            result.rejected += report.rejected.len();
            if report.parse_error.is_some() {
                result.unparseable += 1;
            }
            accepted.extend(report.accepted);
        }
        result.validated = accepted.len();

        progress.phase("Verifying links");
        let outcome = self.verifier.verify(accepted).await;
        result.dead_links = outcome.dead.len();
        result.verified = outcome.verified;

        info!(
            found = result.found,
            validated = result.validated,
            rejected = result.rejected,
            verified = result.verified.len(),
            dead_links = result.dead_links,
            "batch complete"
        );
        Ok(result)
    }
}
