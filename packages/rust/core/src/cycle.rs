//! One fetch cycle: pick a batch, search, verify, merge, record the run.
//!
//! Each cycle produces exactly one run-log entry that moves from `running`
//! to `completed` or `failed`. Failures are recorded, never raised.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use scholarscout_providers::SearchProvider;
use scholarscout_shared::{AppConfig, Result, RunStatus};
use scholarscout_storage::{RecordStore, RunLog};
use scholarscout_verifier::{HttpProbe, LinkProbe};
use tracing::{error, info, instrument, warn};

use crate::batch::{BatchOrchestrator, BatchResult};
use crate::dedup::{self, MergeResult};
use crate::progress::{ProgressReporter, SilentProgress};
use crate::queries::QueryRotation;

/// Summary of one cycle. `status` is always terminal.
#[derive(Debug, Clone)]
pub struct FetchCycleReport {
    /// `None` when the run record could not be created.
    pub run_id: Option<String>,
    pub status: RunStatus,
    pub queries: Vec<String>,
    pub found: u32,
    pub validated: u32,
    pub verified: u32,
    pub dead_links: u32,
    pub added: u32,
    pub updated: u32,
    pub duplicates: u32,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl FetchCycleReport {
    fn failed(run_id: Option<String>, queries: Vec<String>, error: String, start: Instant) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            queries,
            found: 0,
            validated: 0,
            verified: 0,
            dead_links: 0,
            added: 0,
            updated: 0,
            duplicates: 0,
            error: Some(error),
            elapsed: start.elapsed(),
        }
    }
}

/// Drives fetch cycles against one provider and one store.
pub struct FetchCycleController<S, P = HttpProbe> {
    provider: Arc<dyn SearchProvider>,
    store: Arc<S>,
    orchestrator: BatchOrchestrator<P>,
    rotation: QueryRotation,
    progress: Arc<dyn ProgressReporter>,
}

impl<S: RecordStore + RunLog> FetchCycleController<S, HttpProbe> {
    /// Controller wired from config with HTTP link checks.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn SearchProvider>,
        store: Arc<S>,
    ) -> Result<Self> {
        Ok(Self::new(
            provider,
            store,
            BatchOrchestrator::from_config(config)?,
            QueryRotation::from_config(&config.queries),
        ))
    }
}

impl<S: RecordStore + RunLog, P: LinkProbe> FetchCycleController<S, P> {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        store: Arc<S>,
        orchestrator: BatchOrchestrator<P>,
        rotation: QueryRotation,
    ) -> Self {
        Self {
            provider,
            store,
            orchestrator,
            rotation,
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Run one cycle to a terminal state.
    #[instrument(skip_all, fields(provider = self.provider.name()))]
    pub async fn run_fetch_cycle(&self) -> FetchCycleReport {
        let start = Instant::now();
        let report = self.run_inner(start).await;
        self.progress.done(&report);
        report
    }

    async fn run_inner(&self, start: Instant) -> FetchCycleReport {
        self.progress.phase("Preparing run");
        let counter = match self.store.advance_run_counter().await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "could not advance run counter");
                return FetchCycleReport::failed(None, Vec::new(), e.to_string(), start);
            }
        };

        let queries = self.rotation.batch_for(counter, Utc::now().date_naive());
        let run_id = match self.store.create_run(&queries).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "could not create fetch run record");
                return FetchCycleReport::failed(None, queries, e.to_string(), start);
            }
        };
        info!(%run_id, counter, queries = queries.len(), "fetch cycle started");

        match self.execute(&run_id, &queries).await {
            Ok((batch, merged)) => {
                let found = to_u32(batch.found);
                let added = to_u32(merged.added);
                if let Err(e) = self.store.complete_run(&run_id, found, added).await {
                    error!(%run_id, error = %e, "could not record completed run");
                    self.record_failure(&run_id, &e.to_string()).await;
                    return FetchCycleReport::failed(Some(run_id), queries, e.to_string(), start);
                }

                let report = FetchCycleReport {
                    run_id: Some(run_id),
                    status: RunStatus::Completed,
                    queries,
                    found,
                    validated: to_u32(batch.validated),
                    verified: to_u32(batch.verified.len()),
                    dead_links: to_u32(batch.dead_links),
                    added,
                    updated: to_u32(merged.updated),
                    duplicates: to_u32(merged.duplicates),
                    error: None,
                    elapsed: start.elapsed(),
                };
                info!(
                    found = report.found,
                    added = report.added,
                    updated = report.updated,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "fetch cycle completed"
                );
                report
            }
            Err(e) => {
                error!(%run_id, error = %e, "fetch cycle failed");
                self.record_failure(&run_id, &e.to_string()).await;
                FetchCycleReport::failed(Some(run_id), queries, e.to_string(), start)
            }
        }
    }

    async fn execute(&self, run_id: &str, queries: &[String]) -> Result<(BatchResult, MergeResult)> {
        let batch = self
            .orchestrator
            .run_batch(queries, self.provider.as_ref(), self.progress.as_ref())
            .await?;

        self.progress.phase("Saving scholarships");
        let source = format!("{}:{run_id}", self.provider.name());
        let merged = dedup::merge(&batch.verified, self.store.as_ref(), &source).await?;
        Ok((batch, merged))
    }

    async fn record_failure(&self, run_id: &str, message: &str) {
        if let Err(e) = self.store.fail_run(run_id, message).await {
            warn!(%run_id, error = %e, "could not mark run as failed");
        }
    }
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
