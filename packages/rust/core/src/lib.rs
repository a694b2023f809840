//! Fetch pipeline orchestration for ScholarScout.
//!
//! This crate ties providers, link verification and storage together into
//! the fetch cycle: rotate a query batch, search, verify, merge, log the run.

pub mod batch;
pub mod cycle;
pub mod dedup;
pub mod progress;
pub mod queries;

pub use batch::{BatchOrchestrator, BatchResult};
pub use cycle::{FetchCycleController, FetchCycleReport};
pub use dedup::{MergeResult, merge};
pub use progress::{ProgressReporter, SilentProgress};
pub use queries::QueryRotation;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{Days, Utc};
    use scholarscout_providers::SearchProvider;
    use scholarscout_shared::{Result, ScholarScoutError};
    use scholarscout_validation::CandidateValidator;
    use scholarscout_verifier::{LinkProbe, LinkStatus};
    use serde_json::json;

    /// Provider that replays canned answers in order, then returns `[]`.
    pub struct StubProvider {
        answers: Mutex<Vec<String>>,
        configured: bool,
        validator: CandidateValidator,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubProvider {
        pub fn new(mut answers: Vec<String>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                configured: true,
                validator: CandidateValidator::default(),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        pub fn unconfigured() -> Self {
            Self {
                configured: false,
                ..Self::new(Vec::new())
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn validator(&self) -> &CandidateValidator {
            &self.validator
        }

        async fn fetch_raw(&self, _query: &str) -> Result<String> {
            if !self.configured {
                return Err(ScholarScoutError::config("stub has no key"));
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let next = self.answers.lock().unwrap().pop();
            Ok(next.unwrap_or_else(|| "[]".into()))
        }
    }

    /// Probe that reports every link alive.
    pub struct AliveProbe;

    #[async_trait]
    impl LinkProbe for AliveProbe {
        async fn probe(&self, _url: &str) -> LinkStatus {
            LinkStatus::Alive(200)
        }
    }

    /// Fenced JSON answer with one valid candidate per `(title, link)`.
    pub fn answer(items: &[(&str, &str)]) -> String {
        let deadline = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(60))
            .unwrap()
            .to_string();
        let items: Vec<_> = items
            .iter()
            .map(|(title, link)| {
                json!({
                    "title": title,
                    "organization": "Graduate Admissions Office",
                    "country": "United Kingdom",
                    "level": "Master",
                    "field": "Any",
                    "category": "Fully Funded",
                    "deadline": deadline,
                    "description": "Covers full tuition, a living stipend and return flights for the full programme.",
                    "link": link
                })
            })
            .collect();
        format!("Here is what I found:\n```json\n{}\n```", json!(items))
    }
}
